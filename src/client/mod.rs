//! Rate-limited, caching price client
//!
//! `PriceClient` answers price lookups from the cache when it can and from
//! the price service when it must. Single-item fetches go through the rate
//! limiter; batch fetches issue one request for all ids and are not counted
//! by the limiter. Every stored record counts towards a periodic flush of
//! the cache file.

mod transport;

pub use transport::{HttpTransport, RawResponse, Transport};

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;

use crate::cache::{now_local, ttl_from_days, Lookup, PersistentStore, PriceCache, PriceRecord};
use crate::error::{PriceError, Result};
use crate::format::{Formatter, LowestListing};
use crate::item::ItemId;
use crate::throttle::{RateLimiter, DEFAULT_BACKOFF, DEFAULT_WINDOW};

/// Base URL of the public Universalis API
pub const DEFAULT_BASE_URL: &str = "https://universalis.app/api";

/// Configuration for a `PriceClient`
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server (world or data center) used by `price`
    pub server: String,
    /// Service root; requests go to `{base_url}/{server}/{items}`
    pub base_url: String,
    /// Age in days after which a cached record is stale
    pub ttl_days: f64,
    /// Whether stale records are refetched (`true`) or served as-is
    pub update: bool,
    /// Stored records between automatic saves
    pub flush_threshold: usize,
    /// Single-item requests allowed per rate window
    pub requests_per_window: u32,
    /// Length of a rate window
    pub rate_window: Duration,
    /// Wait between attempts once a rate window is exhausted
    pub backoff: Duration,
    /// Deadline for each HTTP request
    pub request_timeout: Duration,
    /// Location of the cache file
    pub cache_path: PathBuf,
    /// Record field holding the price returned by lookups
    pub price_field: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: "Chaos".to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            ttl_days: 0.5,
            update: true,
            flush_threshold: 20,
            requests_per_window: 1,
            rate_window: DEFAULT_WINDOW,
            backoff: DEFAULT_BACKOFF,
            request_timeout: Duration::from_secs(30),
            cache_path: PathBuf::from("values.json"),
            price_field: "price".to_string(),
        }
    }
}

impl ClientConfig {
    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = server.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_ttl_days(mut self, ttl_days: f64) -> Self {
        self.ttl_days = ttl_days;
        self
    }

    pub fn with_update(mut self, update: bool) -> Self {
        self.update = update;
        self
    }

    pub fn with_flush_threshold(mut self, flush_threshold: usize) -> Self {
        self.flush_threshold = flush_threshold;
        self
    }

    /// Allow `requests` single-item fetches per `window`
    pub fn with_rate(mut self, requests: u32, window: Duration) -> Self {
        self.requests_per_window = requests;
        self.rate_window = window;
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn with_cache_path(mut self, cache_path: impl Into<PathBuf>) -> Self {
        self.cache_path = cache_path.into();
        self
    }

    pub fn with_price_field(mut self, price_field: impl Into<String>) -> Self {
        self.price_field = price_field.into();
        self
    }
}

/// Client for fetching and caching item prices
///
/// One client is meant to be shared (e.g. behind an `Arc`) by every
/// concurrent lookup in the process. Lookups of the same stale item may
/// both fetch; the last write wins.
pub struct PriceClient {
    config: ClientConfig,
    formatter: Box<dyn Formatter>,
    transport: Box<dyn Transport>,
    limiter: RateLimiter,
    cache: Mutex<PriceCache>,
    /// Serializes cache file writes so snapshots land in order
    save_lock: Mutex<()>,
}

impl PriceClient {
    /// Create a client over the given formatter and transport
    ///
    /// Loads the cache file named in `config`; a corrupt file or an
    /// unusable `ttl_days` is an error.
    pub fn new(
        config: ClientConfig,
        formatter: impl Formatter + 'static,
        transport: impl Transport + 'static,
    ) -> Result<Self> {
        let ttl = ttl_from_days(config.ttl_days).ok_or_else(|| {
            PriceError::InvalidConfig(format!(
                "ttl_days must be a finite, non-negative number of days, got {}",
                config.ttl_days
            ))
        })?;
        let persistence = PersistentStore::new(config.cache_path.clone());
        let cache = PriceCache::open(persistence, ttl)?;
        let limiter =
            RateLimiter::with_window(config.requests_per_window, config.rate_window, config.backoff);

        Ok(Self {
            config,
            formatter: Box::new(formatter),
            transport: Box::new(transport),
            limiter,
            cache: Mutex::new(cache),
            save_lock: Mutex::new(()),
        })
    }

    /// Create a client talking HTTP and recording the lowest listing
    pub fn connect(config: ClientConfig) -> Result<Self> {
        Self::new(config, LowestListing::new(), HttpTransport::new())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Price of `item` on the configured server
    pub async fn price(&self, item: impl Into<ItemId>) -> Result<Option<f64>> {
        let server = self.config.server.clone();
        self.get_price(item, &server).await
    }

    /// Price of `item` on `server`
    ///
    /// # Returns
    /// * `Ok(Some(price))` from the cache or a fresh fetch
    /// * `Ok(None)` if the item has no active listings (or no value in the price field)
    /// * `Err(PriceError::NotFound)` if the service doesn't know the item
    pub async fn get_price(&self, item: impl Into<ItemId>, server: &str) -> Result<Option<f64>> {
        let item = item.into();
        let lookup = self.cache.lock().await.lookup(server, &item, now_local());
        if let Some(record) = self.serve_cached(lookup, server, &item) {
            return Ok(record.price(&self.config.price_field));
        }

        let Some(payload) = self.fetch_single(server, &item).await? else {
            return Ok(None);
        };

        let record = PriceRecord::new(self.formatter.format(&payload)?, now_local());
        let price = record.price(&self.config.price_field);
        self.store(server, item, record).await?;
        Ok(price)
    }

    /// Prices for several items on `server`, fetching every uncached or
    /// refetchable item in one batch request
    ///
    /// Items absent from the response or without listings map to `None`.
    pub async fn get_prices<I, T>(
        &self,
        items: I,
        server: &str,
    ) -> Result<BTreeMap<ItemId, Option<f64>>>
    where
        I: IntoIterator<Item = T>,
        T: Into<ItemId>,
    {
        let mut prices = BTreeMap::new();
        let mut to_fetch: Vec<ItemId> = Vec::new();

        {
            let cache = self.cache.lock().await;
            let now = now_local();
            for item in items {
                let item = item.into();
                if prices.contains_key(&item) || to_fetch.contains(&item) {
                    continue;
                }
                match self.serve_cached(cache.lookup(server, &item, now), server, &item) {
                    Some(record) => {
                        prices.insert(item, record.price(&self.config.price_field));
                    }
                    None => to_fetch.push(item),
                }
            }
        }

        if to_fetch.is_empty() {
            return Ok(prices);
        }

        let mut payloads = self.fetch_multiple(server, &to_fetch).await?;
        for item in to_fetch {
            let price = match payloads.remove(&item) {
                Some(payload) if has_listings(&payload)? => {
                    let record = PriceRecord::new(self.formatter.format(&payload)?, now_local());
                    let price = record.price(&self.config.price_field);
                    self.store(server, item.clone(), record).await?;
                    price
                }
                _ => None,
            };
            prices.insert(item, price);
        }

        Ok(prices)
    }

    /// Cached record for `item` on `server`, regardless of age
    pub async fn cached(&self, item: impl Into<ItemId>, server: &str) -> Option<PriceRecord> {
        self.cache.lock().await.get(server, &item.into()).cloned()
    }

    /// Fetches one item's payload, waiting on the rate limiter first
    ///
    /// Returns `Ok(None)` when the item has no active listings.
    pub async fn fetch_single(&self, server: &str, item: &ItemId) -> Result<Option<Value>> {
        self.limiter.acquire().await;

        tracing::info!("Fetching {} from {}", item, server);
        let response = self.request(&self.item_url(server, item.as_str())).await?;
        let payload = decode(response, server, item.as_str())?;

        if !has_listings(&payload)? {
            tracing::info!("No active listings for {} on {}", item, server);
            return Ok(None);
        }
        Ok(Some(payload))
    }

    /// Fetches several items in one request, keyed by item id
    ///
    /// Not counted by the rate limiter.
    pub async fn fetch_multiple(
        &self,
        server: &str,
        items: &[ItemId],
    ) -> Result<BTreeMap<ItemId, Value>> {
        if items.is_empty() {
            return Ok(BTreeMap::new());
        }

        let joined = items
            .iter()
            .map(ItemId::as_str)
            .collect::<Vec<_>>()
            .join(",");

        tracing::info!("Fetching {} items from {}", items.len(), server);
        let response = self.request(&self.item_url(server, &joined)).await?;
        let mut payload = decode(response, server, &joined)?;

        match payload.get_mut("items").map(Value::take) {
            Some(Value::Object(entries)) => Ok(entries
                .into_iter()
                .map(|(id, entry)| (ItemId::new(&id), entry))
                .collect()),
            _ => Err(PriceError::MissingField("items".to_string())),
        }
    }

    /// Saves the cache file now
    ///
    /// The file is written from a snapshot on the blocking pool, so lookups
    /// keep using the cache while the write is in progress.
    pub async fn flush(&self) -> Result<()> {
        let _saving = self.save_lock.lock().await;
        let (persistence, snapshot, saved) = {
            let cache = self.cache.lock().await;
            let (snapshot, saved) = cache.snapshot();
            (cache.persistence().clone(), snapshot, saved)
        };

        tokio::task::spawn_blocking(move || persistence.save(&snapshot))
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))??;

        self.cache.lock().await.mark_saved(saved);
        Ok(())
    }

    /// Flushes the cache and shuts the client down
    pub async fn close(self) -> Result<()> {
        self.flush().await
    }

    /// Returns the cached record if it should be served instead of fetched
    fn serve_cached(&self, lookup: Lookup, server: &str, item: &ItemId) -> Option<PriceRecord> {
        match lookup {
            Lookup::Missing => None,
            Lookup::Fresh(record) => {
                tracing::debug!("Cache hit for {} on {}", item, server);
                Some(record)
            }
            Lookup::Stale(_) if self.config.update => None,
            Lookup::Stale(record) => {
                tracing::warn!("Serving stale price for {} on {}", item, server);
                Some(record)
            }
        }
    }

    async fn store(&self, server: &str, item: ItemId, record: PriceRecord) -> Result<()> {
        let due = {
            let mut cache = self.cache.lock().await;
            cache.put(server, item, record);
            cache.pending() >= self.config.flush_threshold
        };
        if due {
            self.flush().await?;
        }
        Ok(())
    }

    async fn request(&self, url: &str) -> Result<RawResponse> {
        let deadline = self.config.request_timeout;
        match tokio::time::timeout(deadline, self.transport.get(url)).await {
            Ok(result) => result,
            Err(_) => Err(PriceError::Timeout(deadline)),
        }
    }

    fn item_url(&self, server: &str, items: &str) -> String {
        format!("{}/{}/{}", self.config.base_url.trim_end_matches('/'), server, items)
    }
}

/// Checks the status and parses the body as JSON
fn decode(response: RawResponse, server: &str, item: &str) -> Result<Value> {
    if response.status == 404 {
        return Err(PriceError::NotFound {
            server: server.to_string(),
            item: item.to_string(),
        });
    }
    if !response.is_success() {
        return Err(PriceError::UnexpectedStatus {
            status: response.status,
            body: response.body,
        });
    }

    match serde_json::from_str(&response.body) {
        Ok(payload) => Ok(payload),
        Err(source) => {
            tracing::warn!("Undecodable response for {}: {}", item, response.body);
            Err(PriceError::DecodeFailure {
                body: response.body,
                source,
            })
        }
    }
}

fn has_listings(payload: &Value) -> Result<bool> {
    payload
        .get("listings")
        .and_then(Value::as_array)
        .map(|listings| !listings.is_empty())
        .ok_or_else(|| PriceError::MissingField("listings".to_string()))
}
