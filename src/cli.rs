//! Command-line interface parsing for the marketboard CLI
//!
//! This module handles parsing of CLI arguments using clap and turns them
//! into the `ClientConfig` the price client is built from.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;

use crate::cache::PersistentStore;
use crate::client::{ClientConfig, DEFAULT_BASE_URL};
use crate::throttle::DEFAULT_WINDOW;

/// Fallback cache file when no platform cache directory exists
const FALLBACK_CACHE_FILE: &str = "values.json";

/// Error types for CLI argument validation
#[derive(Debug, Error)]
pub enum CliError {
    /// TTL must be a non-negative number of days
    #[error("Invalid TTL: '{0}'. Expected a non-negative number of days")]
    InvalidTtl(f64),

    /// At least one request per window must be allowed
    #[error("Invalid rate: requests per window must be at least 1")]
    InvalidRate,

    /// Flushing needs a positive item count
    #[error("Invalid flush threshold: must be at least 1")]
    InvalidFlushThreshold,

    /// Requests need a non-zero deadline
    #[error("Invalid timeout: must be at least 1 second")]
    InvalidTimeout,
}

/// Marketboard - look up market board prices with a local cache
#[derive(Parser, Debug)]
#[command(name = "marketboard")]
#[command(about = "Market board price lookups with a local TTL cache")]
#[command(version)]
pub struct Cli {
    /// Item ids to look up
    #[arg(required = true, value_name = "ITEM_ID")]
    pub items: Vec<String>,

    /// Server (world or data center) to query
    #[arg(long, short, default_value = "Chaos")]
    pub server: String,

    /// Root URL of the price service
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Cache file (defaults to the platform cache directory)
    #[arg(long, value_name = "PATH")]
    pub cache: Option<PathBuf>,

    /// Days before a cached price is considered stale
    #[arg(long, default_value_t = 0.5)]
    pub ttl_days: f64,

    /// Serve stale cached prices instead of refetching them
    #[arg(long)]
    pub no_update: bool,

    /// Single-item requests allowed per 100ms window
    #[arg(long, default_value_t = 1)]
    pub rate: u32,

    /// Count --rate per second instead of per 100ms window
    #[arg(long)]
    pub per_second: bool,

    /// Save the cache after this many stored prices
    #[arg(long, default_value_t = 20)]
    pub flush_every: usize,

    /// Per-request deadline in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Fetch all uncached items in a single request
    #[arg(long)]
    pub batch: bool,

    /// Only consider high-quality listings
    #[arg(long)]
    pub hq: bool,

    /// Log debug output
    #[arg(long, short, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(long, short)]
    pub quiet: bool,
}

impl Cli {
    /// Builds the client configuration from parsed arguments
    ///
    /// # Returns
    /// * `Ok(ClientConfig)` with every flag applied
    /// * `Err(CliError)` if a value is out of range
    pub fn client_config(&self) -> Result<ClientConfig, CliError> {
        if !(self.ttl_days >= 0.0 && self.ttl_days.is_finite()) {
            return Err(CliError::InvalidTtl(self.ttl_days));
        }
        if self.rate == 0 {
            return Err(CliError::InvalidRate);
        }
        if self.flush_every == 0 {
            return Err(CliError::InvalidFlushThreshold);
        }
        if self.timeout_secs == 0 {
            return Err(CliError::InvalidTimeout);
        }

        let window = if self.per_second {
            Duration::from_secs(1)
        } else {
            DEFAULT_WINDOW
        };

        Ok(ClientConfig::default()
            .with_server(self.server.clone())
            .with_base_url(self.base_url.clone())
            .with_cache_path(self.cache_path())
            .with_ttl_days(self.ttl_days)
            .with_update(!self.no_update)
            .with_rate(self.rate, window)
            .with_flush_threshold(self.flush_every)
            .with_request_timeout(Duration::from_secs(self.timeout_secs)))
    }

    /// Cache file to use: `--cache`, else the platform cache directory
    pub fn cache_path(&self) -> PathBuf {
        self.cache
            .clone()
            .or_else(|| PersistentStore::in_cache_dir().map(|store| store.path().to_path_buf()))
            .unwrap_or_else(|| PathBuf::from(FALLBACK_CACHE_FILE))
    }

    /// Maximum log level selected by --verbose / --quiet
    pub fn log_level(&self) -> tracing::Level {
        if self.verbose {
            tracing::Level::DEBUG
        } else if self.quiet {
            tracing::Level::WARN
        } else {
            tracing::Level::INFO
        }
    }
}
