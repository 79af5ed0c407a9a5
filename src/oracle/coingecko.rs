//! CoinGecko Global Reference Prices
//!
//! Independent USD prices for well-known stablecoins, used to cross-check a
//! local pool depeg against the wider market. Cached with the global-reference
//! TTL (60s) since the free API is tightly rate limited.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::errors::FetchError;
use crate::http::{cache_key, HttpRequest, ResilientFetcher, TtlCache};

pub const COINGECKO_API: &str = "https://api.coingecko.com";

/// Stable symbol → CoinGecko coin id
pub const STABLE_SYMBOL_TO_COINGECKO_ID: &[(&str, &str)] = &[
    ("USDT", "tether"),
    ("USDC", "usd-coin"),
    ("BUSD", "binance-usd"),
    ("TUSD", "true-usd"),
    ("USDP", "pax-dollar"),
    ("GUSD", "gemini-dollar"),
    ("PYUSD", "paypal-usd"),
    ("FDUSD", "first-digital-usd"),
    ("DAI", "dai"),
    ("FRAX", "frax"),
    ("LUSD", "liquity-usd"),
    ("GHO", "gho"),
    ("CRVUSD", "crvusd"),
    ("MIM", "magic-internet-money"),
    ("SUSD", "nusd"),
    ("DOLA", "dola-usd"),
    ("MAI", "mimatic"),
    ("USD0", "usd0"),
    ("USDD", "usdd"),
    ("USDE", "ethena-usde"),
];

pub fn coingecko_id(symbol: &str) -> Option<&'static str> {
    let symbol = symbol.trim().to_uppercase();
    STABLE_SYMBOL_TO_COINGECKO_ID
        .iter()
        .find(|(s, _)| *s == symbol)
        .map(|(_, id)| *id)
}

/// Independent reference prices keyed by uppercase symbol.
/// Unknown symbols and upstream failures simply yield no entry.
#[async_trait]
pub trait ReferencePriceSource: Send + Sync {
    async fn reference_prices(&self, symbols: &[String]) -> HashMap<String, f64>;
}

#[derive(Debug, Clone, Deserialize)]
struct SimplePrice {
    #[serde(default)]
    usd: Option<f64>,
}

pub struct CoinGeckoClient {
    fetcher: Arc<ResilientFetcher>,
    base_url: String,
    ttl: Duration,
    cache: TtlCache<HashMap<String, f64>>,
}

impl CoinGeckoClient {
    pub fn new(fetcher: Arc<ResilientFetcher>, ttl: Duration) -> Self {
        Self {
            fetcher,
            base_url: COINGECKO_API.to_string(),
            ttl,
            cache: TtlCache::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn fetch_prices(
        &self,
        symbol_ids: &[(String, &'static str)],
    ) -> Result<HashMap<String, f64>, FetchError> {
        let mut ids: Vec<&str> = symbol_ids.iter().map(|(_, id)| *id).collect();
        ids.dedup();

        let request = HttpRequest::get(format!("{}/api/v3/simple/price", self.base_url))
            .query("ids", ids.join(","))
            .query("vs_currencies", "usd");
        let body: HashMap<String, SimplePrice> = self.fetcher.fetch_json(&request).await?;

        Ok(symbol_ids
            .iter()
            .filter_map(|(symbol, id)| {
                body.get(*id)
                    .and_then(|p| p.usd)
                    .filter(|p| *p > 0.0)
                    .map(|p| (symbol.clone(), p))
            })
            .collect())
    }
}

#[async_trait]
impl ReferencePriceSource for CoinGeckoClient {
    async fn reference_prices(&self, symbols: &[String]) -> HashMap<String, f64> {
        let mut symbol_ids: Vec<(String, &'static str)> = symbols
            .iter()
            .map(|s| s.trim().to_uppercase())
            .filter_map(|s| coingecko_id(&s).map(|id| (s, id)))
            .collect();
        symbol_ids.sort();
        symbol_ids.dedup();
        if symbol_ids.is_empty() {
            return HashMap::new();
        }

        let args: Vec<&str> = symbol_ids.iter().map(|(s, _)| s.as_str()).collect();
        let key = cache_key("coingecko_prices", &args);
        match self
            .cache
            .get_or_fetch(&key, self.ttl, || self.fetch_prices(&symbol_ids))
            .await
        {
            Ok(prices) => prices,
            Err(e) => {
                warn!("CoinGecko reference prices unavailable: {}", e);
                HashMap::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::fetcher::testing::{fetcher, ok, status, ScriptedTransport};

    fn client(transport: Arc<ScriptedTransport>) -> CoinGeckoClient {
        CoinGeckoClient::new(fetcher(transport), Duration::from_secs(60))
            .with_base_url("http://cg.test")
    }

    #[test]
    fn test_coingecko_id_lookup() {
        assert_eq!(coingecko_id("usdt"), Some("tether"));
        assert_eq!(coingecko_id("USDe"), Some("ethena-usde"));
        assert_eq!(coingecko_id("WETH"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reference_prices_mapped_back_to_symbols() {
        let transport = ScriptedTransport::new(vec![ok(
            r#"{"tether": {"usd": 0.9991}, "usd-coin": {"usd": 1.0002}}"#,
        )]);
        let cg = client(transport.clone());

        let prices = cg
            .reference_prices(&["usdc".into(), "USDT".into(), "WETH".into()])
            .await;
        assert_eq!(prices.len(), 2);
        assert_eq!(prices["USDT"], 0.9991);
        assert_eq!(prices["USDC"], 1.0002);

        let req = &transport.requests()[0];
        assert_eq!(req.url, "http://cg.test/api/v3/simple/price");
        assert!(req.query.contains(&("ids".to_string(), "usd-coin,tether".to_string())));

        // Second lookup served from cache
        cg.reference_prices(&["USDT".into(), "USDC".into()]).await;
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_symbols_skip_request() {
        let transport = ScriptedTransport::new(vec![]);
        let cg = client(transport.clone());
        assert!(cg.reference_prices(&["WBTC".into()]).await.is_empty());
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_yields_empty_map() {
        let transport = ScriptedTransport::new(vec![status(403, "forbidden")]);
        let cg = client(transport);
        assert!(cg.reference_prices(&["DAI".into()]).await.is_empty());
    }
}
