//! DexScreener Client
//!
//! Endpoints used:
//! - `/latest/dex/pairs/{chain}/{pool}`: one pool (both tokens, priceUsd of the
//!   base token, priceNative, reserves, USD liquidity, dexId)
//! - `/tokens/v1/{chain}/{a,b}`: every pool listing those tokens; the price of
//!   each address is taken from its highest-liquidity pool
//! - `/latest/dex/search?q=USDT/USDC`: free-text pair search used for discovery
//!
//! Upstream limit is 300 req/min. Responses are cached with the pool-price TTL.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{lenient_f64, PairSearch, PoolPriceSource};
use crate::errors::FetchError;
use crate::http::{cache_key, HttpRequest, ResilientFetcher, TtlCache};

pub const DEXSCREENER_API: &str = "https://api.dexscreener.com";

const DEFAULT_SEARCH_TTL: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PairsResponse {
    #[serde(default)]
    pairs: Option<Vec<RawPair>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPair {
    #[serde(default)]
    chain_id: Option<String>,
    #[serde(default)]
    pair_address: Option<String>,
    #[serde(default)]
    dex_id: Option<String>,
    #[serde(default)]
    base_token: Option<RawToken>,
    #[serde(default)]
    quote_token: Option<RawToken>,
    #[serde(default, deserialize_with = "lenient_f64")]
    price_usd: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    price_native: Option<f64>,
    #[serde(default)]
    liquidity: Option<RawLiquidity>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawToken {
    #[serde(default)]
    address: String,
    #[serde(default)]
    symbol: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RawLiquidity {
    #[serde(default, deserialize_with = "lenient_f64")]
    usd: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    base: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    quote: Option<f64>,
}

// ---------------------------------------------------------------------------
// Normalized snapshot
// ---------------------------------------------------------------------------

/// One side of a pool
#[derive(Debug, Clone, PartialEq)]
pub struct TokenSide {
    pub address: String,
    /// Uppercased ticker
    pub symbol: String,
    /// Token units held by the pool
    pub reserve: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PoolSnapshot {
    pub chain: String,
    pub pool: String,
    pub venue: Option<String>,
    pub base: TokenSide,
    pub quote: TokenSide,
    /// USD price of the base token as quoted by this pool
    pub base_price_usd: Option<f64>,
    /// Base token price in quote-token units
    pub price_native: Option<f64>,
    pub liquidity_usd: Option<f64>,
}

impl PoolSnapshot {
    /// USD price of the quote token implied by this pool's quote.
    pub fn quote_price_usd(&self) -> Option<f64> {
        match (self.base_price_usd, self.price_native) {
            (Some(usd), Some(native)) if usd > 0.0 && native > 0.0 => Some(usd / native),
            _ => None,
        }
    }

    fn from_raw(chain: &str, pool: &str, raw: RawPair) -> Result<Self, FetchError> {
        let (base, quote) = match (raw.base_token, raw.quote_token) {
            (Some(b), Some(q)) => (b, q),
            _ => {
                return Err(FetchError::NoData(format!(
                    "pool {}/{} missing token metadata",
                    chain, pool
                )))
            }
        };
        let liquidity = raw.liquidity;
        Ok(Self {
            chain: chain.to_string(),
            pool: pool.to_string(),
            venue: raw.dex_id,
            base: TokenSide {
                address: base.address,
                symbol: base.symbol.trim().to_uppercase(),
                reserve: liquidity.as_ref().and_then(|l| l.base),
            },
            quote: TokenSide {
                address: quote.address,
                symbol: quote.symbol.trim().to_uppercase(),
                reserve: liquidity.as_ref().and_then(|l| l.quote),
            },
            base_price_usd: raw.price_usd,
            price_native: raw.price_native,
            liquidity_usd: liquidity.and_then(|l| l.usd),
        })
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct DexScreenerClient {
    fetcher: Arc<ResilientFetcher>,
    base_url: String,
    ttl: Duration,
    search_ttl: Duration,
    pools: TtlCache<PoolSnapshot>,
    prices: TtlCache<HashMap<String, f64>>,
    searches: TtlCache<Vec<PoolSnapshot>>,
}

impl DexScreenerClient {
    pub fn new(fetcher: Arc<ResilientFetcher>, ttl: Duration) -> Self {
        Self {
            fetcher,
            base_url: DEXSCREENER_API.to_string(),
            ttl,
            search_ttl: DEFAULT_SEARCH_TTL,
            pools: TtlCache::new(),
            prices: TtlCache::new(),
            searches: TtlCache::new(),
        }
    }

    pub fn with_search_ttl(mut self, ttl: Duration) -> Self {
        self.search_ttl = ttl;
        self
    }

    pub fn fetcher(&self) -> &Arc<ResilientFetcher> {
        &self.fetcher
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn fetch_snapshot(&self, chain: &str, pool: &str) -> Result<PoolSnapshot, FetchError> {
        let url = format!("{}/latest/dex/pairs/{}/{}", self.base_url, chain, pool);
        let response: PairsResponse = self.fetcher.fetch_json(&HttpRequest::get(url)).await?;
        let first = response
            .pairs
            .and_then(|pairs| pairs.into_iter().next())
            .ok_or_else(|| FetchError::NoData(format!("no pairs for {}/{}", chain, pool)))?;
        PoolSnapshot::from_raw(chain, pool, first)
    }

    async fn fetch_search(&self, query: &str) -> Result<Vec<PoolSnapshot>, FetchError> {
        let url = format!("{}/latest/dex/search", self.base_url);
        let request = HttpRequest::get(url).query("q", query);
        let response: PairsResponse = self.fetcher.fetch_json(&request).await?;

        // Listings without a chain or address cannot be monitored later
        let snapshots = response
            .pairs
            .unwrap_or_default()
            .into_iter()
            .filter_map(|raw| {
                let chain = raw.chain_id.clone()?.to_lowercase();
                let pool = raw.pair_address.clone().filter(|p| !p.is_empty())?;
                PoolSnapshot::from_raw(&chain, &pool, raw).ok()
            })
            .collect();
        Ok(snapshots)
    }

    async fn fetch_token_prices(
        &self,
        chain: &str,
        addresses: &[String],
    ) -> Result<HashMap<String, f64>, FetchError> {
        let url = format!("{}/tokens/v1/{}/{}", self.base_url, chain, addresses.join(","));
        let listings: Vec<RawPair> = self.fetcher.fetch_json(&HttpRequest::get(url)).await?;

        let wanted: Vec<String> = addresses.iter().map(|a| a.to_lowercase()).collect();
        let mut best: HashMap<String, (f64, f64)> = HashMap::new();

        for listing in listings {
            let price = match listing.price_usd {
                Some(p) if p > 0.0 => p,
                _ => continue,
            };
            let liquidity = listing.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0);
            for side in [&listing.base_token, &listing.quote_token].into_iter().flatten() {
                let addr = side.address.to_lowercase();
                if !wanted.contains(&addr) {
                    continue;
                }
                // priceUsd always prices the listing's base token
                let is_base = listing
                    .base_token
                    .as_ref()
                    .map(|b| b.address.eq_ignore_ascii_case(&addr))
                    .unwrap_or(false);
                let side_price = if is_base {
                    Some(price)
                } else {
                    listing
                        .price_native
                        .filter(|n| *n > 0.0)
                        .map(|native| price / native)
                };
                let side_price = match side_price {
                    Some(p) => p,
                    None => continue,
                };
                let better = best.get(&addr).map(|(liq, _)| liquidity > *liq).unwrap_or(true);
                if better {
                    best.insert(addr, (liquidity, side_price));
                }
            }
        }

        let prices: HashMap<String, f64> =
            best.into_iter().map(|(addr, (_, price))| (addr, price)).collect();
        if prices.is_empty() {
            return Err(FetchError::NoData(format!(
                "no token prices on {} for {}",
                chain,
                addresses.join(",")
            )));
        }
        Ok(prices)
    }
}

#[async_trait]
impl PoolPriceSource for DexScreenerClient {
    async fn pool_snapshot(&self, chain: &str, pool: &str) -> Result<PoolSnapshot, FetchError> {
        let key = cache_key("pool_snapshot", &[chain, &pool.to_lowercase()]);
        self.pools
            .get_or_fetch(&key, self.ttl, || self.fetch_snapshot(chain, pool))
            .await
    }

    async fn token_prices(
        &self,
        chain: &str,
        addresses: &[String],
    ) -> Result<HashMap<String, f64>, FetchError> {
        if addresses.is_empty() {
            return Ok(HashMap::new());
        }
        let lowered: Vec<String> = addresses.iter().map(|a| a.to_lowercase()).collect();
        let mut args: Vec<&str> = vec![chain];
        args.extend(lowered.iter().map(String::as_str));
        let key = cache_key("token_prices", &args);

        let prices = self
            .prices
            .get_or_fetch(&key, self.ttl, || self.fetch_token_prices(chain, addresses))
            .await?;
        debug!("DexScreener token prices on {}: {:?}", chain, prices);
        Ok(prices)
    }
}

#[async_trait]
impl PairSearch for DexScreenerClient {
    async fn search_pairs(&self, query: &str) -> Result<Vec<PoolSnapshot>, FetchError> {
        let query = query.trim().to_uppercase();
        let key = cache_key("search_pairs", &[&query]);
        let found = self
            .searches
            .get_or_fetch(&key, self.search_ttl, || self.fetch_search(&query))
            .await?;
        debug!("DexScreener search {:?}: {} pairs", query, found.len());
        Ok(found)
    }
}

/// Accepts a DexScreener URL (`https://dexscreener.com/base/0x..`), a `chain/pool`
/// path, or a bare pool address (paired with `default_chain`).
/// Returns `(chain, pool)`, or `None` for empty input.
pub fn parse_pool_input(raw: &str, default_chain: &str) -> Option<(String, String)> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if raw.starts_with("http://") || raw.starts_with("https://") {
        if let Ok(url) = reqwest::Url::parse(raw) {
            let parts: Vec<&str> = url.path().split('/').filter(|p| !p.is_empty()).collect();
            match parts.as_slice() {
                [chain, pool, ..] => return Some((chain.to_lowercase(), pool.to_string())),
                [pool] => return Some((default_chain.to_string(), pool.to_string())),
                [] => return None,
            }
        }
    }

    let parts: Vec<&str> = raw.split('/').filter(|p| !p.is_empty()).collect();
    if let [chain, pool, ..] = parts.as_slice() {
        return Some((chain.to_lowercase(), pool.to_string()));
    }

    Some((default_chain.to_string(), raw.to_string()))
}
