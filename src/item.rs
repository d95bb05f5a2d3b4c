//! Canonical item identifiers
//!
//! Item ids arrive as numbers or strings (`5057`, `"5057"`, `" 05057 "`).
//! Every boundary converts them into an [`ItemId`] so the cache is keyed
//! by a single string form.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Item identifier in canonical string form
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Canonicalizes a raw id: trims whitespace and rewrites numeric ids
    /// in plain decimal form without leading zeros.
    pub fn new(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.parse::<u64>() {
            Ok(n) => Self(n.to_string()),
            Err(_) => Self(trimmed.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ItemId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// Ids read back from disk or from batch responses go through `new` as well.
impl<'de> Deserialize<'de> for ItemId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(|raw| Self::new(&raw))
    }
}

impl From<&str> for ItemId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for ItemId {
    fn from(raw: String) -> Self {
        Self::new(&raw)
    }
}

impl From<&String> for ItemId {
    fn from(raw: &String) -> Self {
        Self::new(raw)
    }
}

impl From<u32> for ItemId {
    fn from(id: u32) -> Self {
        Self(id.to_string())
    }
}

impl From<u64> for ItemId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&ItemId> for ItemId {
    fn from(id: &ItemId) -> Self {
        id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_and_string_ids_agree() {
        assert_eq!(ItemId::from(5057u32), ItemId::from("5057"));
        assert_eq!(ItemId::from(5057u64), ItemId::from("5057".to_string()));
    }

    #[test]
    fn test_leading_zeros_and_whitespace_are_dropped() {
        assert_eq!(ItemId::new(" 05057 ").as_str(), "5057");
        assert_eq!(ItemId::new("0").as_str(), "0");
    }

    #[test]
    fn test_non_numeric_ids_are_only_trimmed() {
        assert_eq!(ItemId::new("  Iron Ore ").as_str(), "Iron Ore");
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let json = serde_json::to_string(&ItemId::new("007")).unwrap();
        assert_eq!(json, "\"7\"");
    }

    #[test]
    fn test_deserialize_canonicalizes() {
        let id: ItemId = serde_json::from_str("\"0042\"").unwrap();
        assert_eq!(id.as_str(), "42");
    }
}
