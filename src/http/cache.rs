//! TTL Cache for Idempotent Upstream Calls
//!
//! Memoizes oracle responses for a bounded window. Entries expire lazily: a
//! read past expiry is a miss and evicts the entry, nothing sweeps proactively.
//! Keys carry the function name and the full argument tuple (`cache_key`).
//!
//! Check-then-fetch-then-store is not atomic per key. Two tasks racing on the
//! same cold key may both fetch; the second write wins.

use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Per-data-class lifetimes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheTtls {
    /// Pool prices change fast; short TTL keeps arbitrage windows fresh
    pub pool_price: Duration,
    pub gas: Duration,
    /// Global reference prices (CoinGecko)
    pub global_reference: Duration,
    /// Token decimals and chain lists barely change
    pub token_metadata: Duration,
    pub default: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            pool_price: Duration::from_secs(5),
            gas: Duration::from_secs(30),
            global_reference: Duration::from_secs(60),
            token_metadata: Duration::from_secs(3600),
            default: Duration::from_secs(10),
        }
    }
}

/// Hit/miss counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

/// Build a cache key from a function name and its arguments.
/// Arguments are joined with a separator that cannot occur in chain slugs or addresses.
pub fn cache_key(function: &str, args: &[&str]) -> String {
    format!("{}({})", function, args.join("|"))
}

pub struct TtlCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns the value if present and not expired. Expired entries are evicted.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if now < entry.expires_at => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.remove_if(key, |_, e| Instant::now() >= e.expires_at);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Serve from cache, or run `fetch` and store a successful result.
    /// Errors are never cached.
    pub async fn get_or_fetch<F, Fut, E>(&self, key: &str, ttl: Duration, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let value = fetch().await?;
        self.set(key, value.clone(), ttl);
        Ok(value)
    }

    /// Number of stored entries, including expired ones not yet read.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
