//! In-memory price cache
//!
//! Holds every record keyed by server and item, decides staleness against a
//! TTL, and counts records stored since the last save so the owner can
//! flush periodically.

use std::collections::BTreeMap;

use chrono::{Duration, Local, NaiveDateTime, SubsecRound};
use serde::{Deserialize, Serialize};

use super::PersistentStore;
use crate::error::Result;
use crate::format::RecordFields;
use crate::item::ItemId;

/// Timestamp format used for `fetch_time` in the cache file
pub const FETCH_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Server name -> item id -> record
pub type PriceStore = BTreeMap<String, BTreeMap<ItemId, PriceRecord>>;

/// Current local time truncated to whole seconds
pub fn now_local() -> NaiveDateTime {
    Local::now().naive_local().trunc_subsecs(0)
}

/// Converts a TTL given in (fractional) days into a duration
///
/// Returns `None` for negative, non-finite or out-of-range values.
pub fn ttl_from_days(days: f64) -> Option<Duration> {
    if !days.is_finite() || days < 0.0 {
        return None;
    }
    let millis = (days * 86_400_000.0).round();
    if millis >= i64::MAX as f64 {
        return None;
    }
    Duration::try_milliseconds(millis as i64)
}

/// One cached price record
///
/// `fields` is whatever the formatter produced. `fetch_time` is absent only
/// for records written without a timestamp; those always count as stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    #[serde(flatten)]
    pub fields: RecordFields,
    #[serde(
        default,
        with = "fetch_time_format",
        skip_serializing_if = "Option::is_none"
    )]
    pub fetch_time: Option<NaiveDateTime>,
}

impl PriceRecord {
    pub fn new(mut fields: RecordFields, fetch_time: NaiveDateTime) -> Self {
        fields.remove("fetch_time");
        Self {
            fields,
            fetch_time: Some(fetch_time),
        }
    }

    /// Numeric value of `field`, if present
    pub fn price(&self, field: &str) -> Option<f64> {
        self.fields.get(field).and_then(|value| value.as_f64())
    }

    /// Whether the record is older than `ttl` at `now`
    pub fn is_stale(&self, now: NaiveDateTime, ttl: Duration) -> bool {
        match self.fetch_time {
            Some(fetch_time) => now - fetch_time > ttl,
            None => true,
        }
    }
}

mod fetch_time_format {
    use chrono::NaiveDateTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    use super::FETCH_TIME_FORMAT;

    pub fn serialize<S: Serializer>(
        value: &Option<NaiveDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(time) => serializer.serialize_str(&time.format(FETCH_TIME_FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveDateTime>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|raw| NaiveDateTime::parse_from_str(&raw, FETCH_TIME_FORMAT).map_err(de::Error::custom))
            .transpose()
    }
}

/// What the cache holds for a lookup
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// Nothing cached
    Missing,
    /// Cached and younger than the TTL
    Fresh(PriceRecord),
    /// Cached but older than the TTL
    Stale(PriceRecord),
}

/// In-memory price store backed by a `PersistentStore`
#[derive(Debug)]
pub struct PriceCache {
    store: PriceStore,
    persistence: PersistentStore,
    ttl: Duration,
    /// Records stored since the last save
    pending: usize,
}

impl PriceCache {
    /// Loads the store from disk
    ///
    /// A corrupt cache file is returned as an error, never replaced.
    pub fn open(persistence: PersistentStore, ttl: Duration) -> Result<Self> {
        let store = persistence.load()?;
        Ok(Self {
            store,
            persistence,
            ttl,
            pending: 0,
        })
    }

    pub fn get(&self, server: &str, item: &ItemId) -> Option<&PriceRecord> {
        self.store.get(server)?.get(item)
    }

    /// Inserts or replaces a record and counts it towards the next flush
    pub fn put(&mut self, server: &str, item: ItemId, record: PriceRecord) {
        self.store
            .entry(server.to_string())
            .or_default()
            .insert(item, record);
        self.pending += 1;
    }

    /// Classifies the cached record for `item` at `now`
    pub fn lookup(&self, server: &str, item: &ItemId, now: NaiveDateTime) -> Lookup {
        match self.get(server, item) {
            None => Lookup::Missing,
            Some(record) if record.is_stale(now, self.ttl) => Lookup::Stale(record.clone()),
            Some(record) => Lookup::Fresh(record.clone()),
        }
    }

    /// Records stored since the last save
    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn store(&self) -> &PriceStore {
        &self.store
    }

    pub fn len(&self) -> usize {
        self.store.values().map(|items| items.len()).sum()
    }

    /// Store that mirrors this cache on disk
    pub fn persistence(&self) -> &PersistentStore {
        &self.persistence
    }

    /// Copy of every record plus the pending count it covers
    ///
    /// The copy can be written out without holding on to the cache; pass
    /// the count to `mark_saved` once the write succeeded.
    pub fn snapshot(&self) -> (PriceStore, usize) {
        (self.store.clone(), self.pending)
    }

    /// Discounts `saved` records from the pending count
    ///
    /// Records stored while a snapshot was being written stay pending.
    pub fn mark_saved(&mut self, saved: usize) {
        self.pending = self.pending.saturating_sub(saved);
    }
}
