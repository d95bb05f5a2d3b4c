//! Price cache
//!
//! This module keeps fetched prices in memory, keyed by server and item,
//! and mirrors them to a single JSON file on disk. Records carry the local
//! time they were fetched at; records older than the TTL are stale, and the
//! client decides whether stale records are refetched or served as-is.

mod prices;
mod store;

pub use prices::{
    now_local, ttl_from_days, Lookup, PriceCache, PriceRecord, PriceStore, FETCH_TIME_FORMAT,
};
pub use store::PersistentStore;
