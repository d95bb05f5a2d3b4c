//! Durable mirror of the price cache
//!
//! Provides a `PersistentStore` that reads and writes the whole price store
//! as a single JSON file. Writes go to a temporary file in the same
//! directory which is then renamed over the target, so a failed write never
//! leaves a half-written cache behind.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use tempfile::NamedTempFile;

use super::PriceStore;
use crate::error::{PriceError, Result};

/// File name used inside the platform cache directory
const CACHE_FILE_NAME: &str = "prices.json";

/// Loads and saves the price store at a fixed path
#[derive(Debug, Clone)]
pub struct PersistentStore {
    /// Location of the cache file
    path: PathBuf,
}

impl PersistentStore {
    /// Creates a store backed by the given file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Creates a store in the XDG-compliant cache directory
    ///
    /// Uses `~/.cache/marketboard/prices.json` on Linux, or the equivalent
    /// path on other platforms. Returns `None` if no home directory exists.
    pub fn in_cache_dir() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "marketboard")?;
        Some(Self::new(project_dirs.cache_dir().join(CACHE_FILE_NAME)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory the cache file lives in
    fn parent_dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    /// Reads the full store from disk
    ///
    /// # Returns
    /// * `Ok(PriceStore)` with the file contents, or an empty store if the file doesn't exist
    /// * `Err(PriceError::CorruptCache)` if the file cannot be parsed
    /// * `Err(PriceError::Io)` if reading fails for any other reason
    pub fn load(&self) -> Result<PriceStore> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!("No price cache at {}, starting empty", self.path.display());
                return Ok(PriceStore::new());
            }
            Err(e) => return Err(e.into()),
        };

        let store: PriceStore =
            serde_json::from_str(&content).map_err(|source| PriceError::CorruptCache {
                path: self.path.clone(),
                source,
            })?;

        tracing::info!(
            "Loaded {} cached prices from {}",
            store.values().map(|items| items.len()).sum::<usize>(),
            self.path.display()
        );
        Ok(store)
    }

    /// Writes the full store to disk
    ///
    /// Does nothing when the store holds no records. The parent directory is
    /// created if missing.
    pub fn save(&self, store: &PriceStore) -> Result<()> {
        if store.values().all(|items| items.is_empty()) {
            return Ok(());
        }

        let dir = self.parent_dir();
        fs::create_dir_all(dir)?;

        let json = serde_json::to_string_pretty(store)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(json.as_bytes())?;
        file.as_file().sync_all()?;
        file.persist(&self.path).map_err(|e| e.error)?;

        tracing::info!("Saved price cache to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::PriceRecord;
    use crate::item::ItemId;
    use chrono::NaiveDate;
    use serde_json::{json, Map};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn create_test_store() -> (PersistentStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = PersistentStore::new(temp_dir.path().join("values.json"));
        (store, temp_dir)
    }

    fn sample_store() -> PriceStore {
        let fetch_time = NaiveDate::from_ymd_opt(2024, 7, 15)
            .unwrap()
            .and_hms_opt(12, 30, 5)
            .unwrap();
        let mut fields = Map::new();
        fields.insert("price".to_string(), json!(95.0));
        fields.insert("quantity".to_string(), json!(2));

        let mut items = BTreeMap::new();
        items.insert(ItemId::new("5057"), PriceRecord::new(fields, fetch_time));

        let mut store = PriceStore::new();
        store.insert("Chaos".to_string(), items);
        store
    }

    #[test]
    fn test_load_missing_file_returns_empty_store() {
        let (store, _temp_dir) = create_test_store();

        let loaded = store.load().expect("Missing file should load as empty");

        assert!(loaded.is_empty());
    }

    #[test]
    fn test_save_empty_store_is_noop() {
        let (store, _temp_dir) = create_test_store();

        store.save(&PriceStore::new()).expect("Save should succeed");

        assert!(!store.path().exists(), "No file should be written");
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_save_store_with_only_empty_servers_is_noop() {
        let (store, _temp_dir) = create_test_store();
        let mut empty = PriceStore::new();
        empty.insert("Chaos".to_string(), BTreeMap::new());

        store.save(&empty).expect("Save should succeed");

        assert!(!store.path().exists());
    }

    #[test]
    fn test_save_then_load_returns_identical_records() {
        let (store, _temp_dir) = create_test_store();
        let original = sample_store();

        store.save(&original).expect("Save should succeed");
        let loaded = store.load().expect("Load should succeed");

        assert_eq!(loaded, original);
    }

    #[test]
    fn test_saved_file_uses_plain_fetch_time_format() {
        let (store, _temp_dir) = create_test_store();

        store.save(&sample_store()).expect("Save should succeed");

        let content = fs::read_to_string(store.path()).unwrap();
        assert!(content.contains("\"Chaos\""));
        assert!(content.contains("\"5057\""));
        assert!(content.contains("\"fetch_time\": \"2024-07-15T12:30:05\""));
    }

    #[test]
    fn test_load_corrupt_file_is_an_error() {
        let (store, _temp_dir) = create_test_store();
        fs::write(store.path(), "{ not json").unwrap();

        let result = store.load();

        assert!(matches!(result, Err(PriceError::CorruptCache { .. })));
    }

    #[test]
    fn test_load_canonicalizes_item_ids_and_tolerates_missing_fetch_time() {
        let (store, _temp_dir) = create_test_store();
        fs::write(
            store.path(),
            r#"{"Chaos": {"05057": {"price": 10}, "5333": {"price": 3, "fetch_time": "2024-01-02T03:04:05"}}}"#,
        )
        .unwrap();

        let loaded = store.load().expect("Load should succeed");
        let items = &loaded["Chaos"];

        let legacy = &items[&ItemId::new("5057")];
        assert!(legacy.fetch_time.is_none());
        assert_eq!(legacy.price("price"), Some(10.0));
        assert!(items[&ItemId::new("5333")].fetch_time.is_some());
    }

    #[test]
    fn test_save_creates_directory_if_missing() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let nested_path = temp_dir.path().join("nested").join("cache");
        let store = PersistentStore::new(nested_path.join("values.json"));

        store.save(&sample_store()).expect("Save should succeed");

        assert!(nested_path.join("values.json").exists());
    }

    #[test]
    fn test_save_overwrites_and_leaves_no_temp_files() {
        let (store, temp_dir) = create_test_store();
        store.save(&sample_store()).expect("First save should succeed");

        let mut updated = sample_store();
        updated.insert("Light".to_string(), sample_store()["Chaos"].clone());
        store.save(&updated).expect("Second save should succeed");

        assert_eq!(store.load().unwrap(), updated);
        let files = fs::read_dir(temp_dir.path()).unwrap().count();
        assert_eq!(files, 1, "Only the cache file should remain");
    }

    #[test]
    fn test_in_cache_dir_creates_xdg_compliant_path() {
        if let Some(store) = PersistentStore::in_cache_dir() {
            let path_str = store.path().to_string_lossy();
            assert!(
                path_str.contains("marketboard"),
                "Cache path should contain project name"
            );
        }
        // Test passes if in_cache_dir() returns None (e.g., no home directory in CI)
    }
}
