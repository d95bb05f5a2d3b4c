//! Error types for the price client
//!
//! An absent price is not an error: lookups return `Ok(None)` when an item
//! has no active listings. Everything here is surfaced to the caller as-is.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while fetching, caching or persisting prices
#[derive(Debug, Error)]
pub enum PriceError {
    /// The price service has no record of the item (HTTP 404)
    #[error("No such item '{item}' on server '{server}'")]
    NotFound { server: String, item: String },

    /// The response body was not valid JSON
    #[error("Failed to decode response body: {source}")]
    DecodeFailure {
        /// Raw body as received, kept for diagnosis
        body: String,
        #[source]
        source: serde_json::Error,
    },

    /// Missing or mistyped field in an otherwise valid response
    #[error("Missing expected field in response: {0}")]
    MissingField(String),

    /// The service answered with a non-success status other than 404
    #[error("Unexpected HTTP status {status}")]
    UnexpectedStatus { status: u16, body: String },

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The request did not complete before its deadline
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The cache file exists but cannot be parsed
    #[error("Corrupt price cache at {}: {source}", .path.display())]
    CorruptCache {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A client setting is outside its usable range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The formatter rejected a payload
    #[error("Failed to format listing: {0}")]
    Format(String),

    /// Reading or writing the cache file failed
    #[error("Cache I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl PriceError {
    /// Raw response body attached to the error, if any
    pub fn body(&self) -> Option<&str> {
        match self {
            PriceError::DecodeFailure { body, .. } | PriceError::UnexpectedStatus { body, .. } => {
                Some(body)
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PriceError>;
