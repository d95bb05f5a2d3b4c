//! Marketboard price client library
//!
//! Fetches market board prices from a remote price service, caches them on
//! disk with a time-to-live, and bounds the outbound request rate.

pub mod cache;
pub mod cli;
pub mod client;
pub mod error;
pub mod format;
pub mod item;
pub mod throttle;

pub use client::{ClientConfig, PriceClient};
pub use error::{PriceError, Result};
pub use item::ItemId;
