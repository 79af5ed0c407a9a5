//! Price Oracles
//!
//! Clients for the upstream data sources:
//! - DexScreener: per-pool snapshots, best-liquidity token prices and pair search
//! - CoinGecko: global reference prices for cross-checking depegs
//! - LI.FI: cross-chain quotes, token metadata and gas prices
//!
//! Each client sits behind a trait so the collector and refinement chain can
//! be driven by fakes in tests.

pub mod coingecko;
pub mod dexscreener;
pub mod lifi;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;

use crate::errors::FetchError;

pub use coingecko::{coingecko_id, CoinGeckoClient, ReferencePriceSource};
pub use dexscreener::{parse_pool_input, DexScreenerClient, PoolSnapshot, TokenSide};
pub use lifi::{CrossChainQuote, ItemizedCost, LifiClient, QuoteRequest, QuoteSource};

/// Source of pool-level prices (DexScreener in production).
#[async_trait]
pub trait PoolPriceSource: Send + Sync {
    /// Latest snapshot of one pool: both token sides, quoted price, reserves, liquidity.
    async fn pool_snapshot(&self, chain: &str, pool: &str) -> Result<PoolSnapshot, FetchError>;

    /// Best-liquidity USD price per token address (keys lowercase).
    async fn token_prices(
        &self,
        chain: &str,
        addresses: &[String],
    ) -> Result<HashMap<String, f64>, FetchError>;
}

/// Free-text pair search (DexScreener `/latest/dex/search` in production).
#[async_trait]
pub trait PairSearch: Send + Sync {
    /// Every listed pool matching `query` (e.g. `USDT/USDC`), across chains.
    async fn search_pairs(&self, query: &str) -> Result<Vec<PoolSnapshot>, FetchError>;
}

/// Accepts a JSON number or a numeric string (DexScreener/LI.FI send prices as strings).
pub(crate) fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite()))
}
