//! Concurrent Status Collector
//!
//! Turns the configured pool list into per-side `PriceRecord`s:
//!
//! 1. Pool snapshot (both tokens, quoted price, reserves, liquidity)
//! 2. Main side: symbol == configured asset, else the first known stable
//!    (base before quote), else the quote token
//! 3. Exchange rate = counter reserve / main reserve
//! 4. USD price per side: best-liquidity token listing → pool quote →
//!    other side through the exchange rate
//! 5. Deviation/alert vs. anchor, optional legitimacy rating
//!
//! Small batches run sequentially. Larger ones fan out on a `JoinSet` bounded
//! by a semaphore. A failing or panicking pair only loses its own records.

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::chains::is_stable_symbol;
use crate::errors::FetchError;
use crate::filters::{PairProfile, TokenLegitimacyChecker};
use crate::oracle::{PoolPriceSource, PoolSnapshot, TokenSide};
use crate::types::{deviation_pct, PairConfig, PriceRecord, PriceSource, RiskLevel};

fn default_sequential_cutoff() -> usize { 5 }
fn default_max_workers() -> usize { 5 }

/// `[collector]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectorSettings {
    /// Batches up to this size run sequentially
    #[serde(default = "default_sequential_cutoff")]
    pub sequential_cutoff: usize,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            sequential_cutoff: default_sequential_cutoff(),
            max_workers: default_max_workers(),
        }
    }
}

impl CollectorSettings {
    /// min(max_workers, max(1, n / 2))
    pub fn worker_count(&self, configs: usize) -> usize {
        self.max_workers.max(1).min((configs / 2).max(1))
    }
}

#[derive(Clone)]
pub struct StatusCollector {
    source: Arc<dyn PoolPriceSource>,
    settings: CollectorSettings,
    legitimacy: Option<Arc<TokenLegitimacyChecker>>,
}

/// Which pool token a resolved side refers to
#[derive(Debug, Clone, Copy, PartialEq)]
enum Slot {
    Base,
    Quote,
}

impl StatusCollector {
    pub fn new(source: Arc<dyn PoolPriceSource>, settings: CollectorSettings) -> Self {
        Self {
            source,
            settings,
            legitimacy: None,
        }
    }

    pub fn with_legitimacy(mut self, checker: Arc<TokenLegitimacyChecker>) -> Self {
        self.legitimacy = Some(checker);
        self
    }

    pub fn settings(&self) -> &CollectorSettings {
        &self.settings
    }

    /// Collect records for every config. `global_threshold` overrides per-pair thresholds.
    pub async fn collect(&self, configs: &[PairConfig], global_threshold: Option<f64>) -> Vec<PriceRecord> {
        if configs.is_empty() {
            warn!("No pairs configured, nothing to collect");
            return Vec::new();
        }

        let started = Instant::now();
        let records = if configs.len() <= self.settings.sequential_cutoff {
            self.collect_sequential(configs, global_threshold).await
        } else {
            self.collect_pooled(configs, global_threshold).await
        };

        info!(
            "Collected {} records from {} pairs in {:.2}s",
            records.len(),
            configs.len(),
            started.elapsed().as_secs_f64()
        );
        records
    }

    async fn collect_sequential(&self, configs: &[PairConfig], global_threshold: Option<f64>) -> Vec<PriceRecord> {
        let mut records = Vec::new();
        for cfg in configs {
            let outcome = AssertUnwindSafe(self.collect_pair(cfg, global_threshold))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(batch)) => records.extend(batch),
                Ok(Err(e)) => warn!("Pair {}/{} failed: {}", cfg.chain, cfg.pool, e),
                Err(_) => error!("Pair {}/{} panicked during collection", cfg.chain, cfg.pool),
            }
        }
        records
    }

    async fn collect_pooled(&self, configs: &[PairConfig], global_threshold: Option<f64>) -> Vec<PriceRecord> {
        let workers = self.settings.worker_count(configs.len());
        debug!("Collecting {} pairs on {} workers", configs.len(), workers);

        let permits = Arc::new(Semaphore::new(workers));
        let mut tasks = JoinSet::new();
        for cfg in configs.iter().cloned() {
            let this = self.clone();
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                // Semaphore is never closed
                let _permit = permits.acquire_owned().await.ok();
                let result = this.collect_pair(&cfg, global_threshold).await;
                (cfg, result)
            });
        }

        // Completion order
        let mut records = Vec::new();
        let mut completed = 0usize;
        while let Some(joined) = tasks.join_next().await {
            completed += 1;
            match joined {
                Ok((_, Ok(batch))) => records.extend(batch),
                Ok((cfg, Err(e))) => warn!("Pair {}/{} failed: {}", cfg.chain, cfg.pool, e),
                Err(e) => error!("Collector task failed: {}", e),
            }
            debug!("Progress: {}/{}", completed, configs.len());
        }
        records
    }

    /// Records for one pool: up to one per side.
    pub async fn collect_pair(
        &self,
        cfg: &PairConfig,
        global_threshold: Option<f64>,
    ) -> Result<Vec<PriceRecord>, FetchError> {
        let snap = self.source.pool_snapshot(&cfg.chain, &cfg.pool).await?;
        let (main_slot, counter_slot) = resolve_sides(&snap, &cfg.asset_name);
        let main = side(&snap, main_slot);
        let counter = side(&snap, counter_slot);

        let rate = match (main.reserve, counter.reserve) {
            (Some(m), Some(c)) if m > 0.0 && c > 0.0 => Some(c / m),
            _ => None,
        };

        let addresses: Vec<String> = [main, counter]
            .iter()
            .filter(|s| !s.address.is_empty())
            .map(|s| s.address.clone())
            .collect();
        let listed = match self.source.token_prices(&cfg.chain, &addresses).await {
            Ok(prices) => prices,
            Err(e) => {
                debug!("Token prices unavailable on {}: {}", cfg.chain, e);
                HashMap::new()
            }
        };

        let main_direct = direct_price(&snap, main_slot, &listed);
        let counter_direct = direct_price(&snap, counter_slot, &listed);

        // Fill a missing side through the pool rate
        let main_price = main_direct.or_else(|| {
            let (counter_usd, _) = counter_direct?;
            Some((counter_usd * rate?, PriceSource::PoolRate))
        });
        let counter_price = counter_direct.or_else(|| {
            let (main_usd, _) = main_direct?;
            Some((main_usd / rate?, PriceSource::PoolRate))
        });

        let threshold = global_threshold.unwrap_or(cfg.deviation_threshold);
        let sides = [
            (main, counter, main_price, rate),
            (counter, main, counter_price, rate.map(|r| 1.0 / r)),
        ];

        let mut records = Vec::with_capacity(2);
        for (this, other, price, side_rate) in sides {
            let (price_usd, price_source) = match price {
                Some((p, src)) if p > 0.0 && p.is_finite() => (p, src),
                _ => continue,
            };
            if this.symbol.is_empty() {
                continue;
            }

            let deviation = deviation_pct(price_usd, cfg.anchor_price);
            let risk = self.rate_risk(&snap, price_usd, cfg.anchor_price);
            records.push(PriceRecord {
                asset_name: this.symbol.clone(),
                chain: cfg.chain.clone(),
                price_usd,
                deviation_pct: deviation,
                threshold,
                is_alert: deviation.abs() >= threshold,
                token_address: this.address.clone(),
                counter_asset_name: Some(other.symbol.clone()).filter(|s| !s.is_empty()),
                pool_exchange_rate: side_rate,
                liquidity_usd: snap.liquidity_usd,
                venue: snap.venue.clone(),
                price_source,
                risk,
            });
        }

        if records.is_empty() {
            return Err(FetchError::NoData(format!(
                "no usable price for either side of {}/{}",
                cfg.chain, cfg.pool
            )));
        }
        Ok(records)
    }

    fn rate_risk(&self, snap: &PoolSnapshot, price_usd: f64, anchor_price: f64) -> RiskLevel {
        let checker = match &self.legitimacy {
            Some(checker) => checker,
            None => return RiskLevel::Safe,
        };
        let profile = PairProfile {
            chain: &snap.chain,
            tokens: [
                (snap.base.symbol.as_str(), snap.base.address.as_str()),
                (snap.quote.symbol.as_str(), snap.quote.address.as_str()),
            ],
            venue: snap.venue.as_deref(),
            liquidity_usd: snap.liquidity_usd,
            price_usd: Some(price_usd),
            anchor_price,
        };
        checker.check(&profile).risk
    }
}

fn side(snap: &PoolSnapshot, slot: Slot) -> &TokenSide {
    match slot {
        Slot::Base => &snap.base,
        Slot::Quote => &snap.quote,
    }
}

/// (main, counter)
fn resolve_sides(snap: &PoolSnapshot, asset_name: &str) -> (Slot, Slot) {
    let wanted = asset_name.trim().to_uppercase();
    let main = if !wanted.is_empty() && snap.base.symbol == wanted {
        Slot::Base
    } else if !wanted.is_empty() && snap.quote.symbol == wanted {
        Slot::Quote
    } else if is_stable_symbol(&snap.base.symbol) {
        Slot::Base
    } else {
        // Known-stable quote, or neither: quote side
        Slot::Quote
    };
    match main {
        Slot::Base => (Slot::Base, Slot::Quote),
        Slot::Quote => (Slot::Quote, Slot::Base),
    }
}

/// Listing price, else the pool's own quote for that side.
fn direct_price(
    snap: &PoolSnapshot,
    slot: Slot,
    listed: &HashMap<String, f64>,
) -> Option<(f64, PriceSource)> {
    let address = side(snap, slot).address.to_lowercase();
    if let Some(p) = listed.get(&address).copied().filter(|p| *p > 0.0) {
        return Some((p, PriceSource::TokenEndpoint));
    }
    let quoted = match slot {
        Slot::Base => snap.base_price_usd,
        Slot::Quote => snap.quote_price_usd(),
    };
    quoted.filter(|p| *p > 0.0).map(|p| (p, PriceSource::PoolQuote))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const USDT: &str = "0x55d398326f99059ff775485246999027b3197955";
    const USDC: &str = "0x8ac76a51cc950d9822d68b83fe1ad97b32cd580d";

    #[derive(Default)]
    struct FakePools {
        pools: HashMap<String, PoolSnapshot>,
        listed: HashMap<String, f64>,
        token_endpoint_down: bool,
        panic_on: Option<String>,
        delay: Option<Duration>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl PoolPriceSource for FakePools {
        async fn pool_snapshot(&self, chain: &str, pool: &str) -> Result<PoolSnapshot, FetchError> {
            if self.panic_on.as_deref() == Some(pool) {
                panic!("fake pool exploded");
            }
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.pools
                .get(pool)
                .cloned()
                .ok_or_else(|| FetchError::NoData(format!("no pairs for {}/{}", chain, pool)))
        }

        async fn token_prices(&self, _chain: &str, addresses: &[String]) -> Result<HashMap<String, f64>, FetchError> {
            if self.token_endpoint_down {
                return Err(FetchError::Timeout("down".into()));
            }
            Ok(addresses
                .iter()
                .filter_map(|a| self.listed.get(&a.to_lowercase()).map(|p| (a.to_lowercase(), *p)))
                .collect())
        }
    }

    fn snapshot(pool: &str, base: (&str, &str, f64), quote: (&str, &str, f64), price_usd: Option<f64>, native: Option<f64>) -> PoolSnapshot {
        PoolSnapshot {
            chain: "bsc".into(),
            pool: pool.into(),
            venue: Some("pancakeswap".into()),
            base: TokenSide {
                symbol: base.0.into(),
                address: base.1.into(),
                reserve: Some(base.2),
            },
            quote: TokenSide {
                symbol: quote.0.into(),
                address: quote.1.into(),
                reserve: Some(quote.2),
            },
            base_price_usd: price_usd,
            price_native: native,
            liquidity_usd: Some(2_000_000.0),
        }
    }

    fn usdt_usdc(pool: &str) -> PoolSnapshot {
        snapshot(pool, ("USDT", USDT, 1_000_000.0), ("USDC", USDC, 1_002_000.0), Some(0.998), Some(0.996))
    }

    fn collector(fake: FakePools) -> StatusCollector {
        StatusCollector::new(Arc::new(fake), CollectorSettings::default())
    }

    fn by_asset(records: &[PriceRecord], asset: &str) -> PriceRecord {
        records.iter().find(|r| r.asset_name == asset).cloned().unwrap()
    }

    #[test]
    fn test_worker_count() {
        let s = CollectorSettings::default();
        assert_eq!(s.worker_count(1), 1);
        assert_eq!(s.worker_count(6), 3);
        assert_eq!(s.worker_count(40), 5);
    }

    #[tokio::test]
    async fn test_both_sides_with_fallbacks() {
        let mut fake = FakePools::default();
        fake.pools.insert("p1".into(), usdt_usdc("p1"));
        fake.listed.insert(USDT.into(), 0.9991);

        let records = collector(fake).collect(&[PairConfig::new("USDT", "bsc", "p1")], None).await;
        assert_eq!(records.len(), 2);

        let usdt = by_asset(&records, "USDT");
        assert_eq!(usdt.price_usd, 0.9991);
        assert_eq!(usdt.price_source, PriceSource::TokenEndpoint);
        assert_eq!(usdt.counter_asset_name.as_deref(), Some("USDC"));
        assert!((usdt.pool_exchange_rate.unwrap() - 1.002).abs() < 1e-9);

        // Quote side from pool quote: priceUsd / priceNative
        let usdc = by_asset(&records, "USDC");
        assert_eq!(usdc.price_source, PriceSource::PoolQuote);
        assert!((usdc.price_usd - 0.998 / 0.996).abs() < 1e-9);
        assert!((usdc.pool_exchange_rate.unwrap() - 1.0 / 1.002).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_counter_price_derived_from_rate() {
        let mut fake = FakePools::default();
        // No priceNative, endpoint down: USDC only reachable via reserves
        fake.pools.insert("p1".into(), snapshot("p1", ("USDT", USDT, 1000.0), ("USDC", USDC, 1010.0), Some(1.01), None));
        fake.token_endpoint_down = true;

        let records = collector(fake).collect(&[PairConfig::new("USDT", "bsc", "p1")], None).await;
        let usdc = by_asset(&records, "USDC");
        assert_eq!(usdc.price_source, PriceSource::PoolRate);
        assert!((usdc.price_usd - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_main_side_selection() {
        let mut fake = FakePools::default();
        fake.pools.insert("p1".into(), snapshot("p1", ("WBNB", "0xbb", 10.0), ("USDT", USDT, 6000.0), Some(600.0), Some(600.0)));
        let c = collector(fake);

        // Configured asset on the quote side is main: rate = WBNB reserve / USDT reserve
        let records = c.collect(&[PairConfig::new("USDT", "bsc", "p1")], None).await;
        let usdt = by_asset(&records, "USDT");
        assert_eq!(usdt.counter_asset_name.as_deref(), Some("WBNB"));
        assert!((usdt.pool_exchange_rate.unwrap() - 10.0 / 6000.0).abs() < 1e-12);

        let snap = usdt_usdc("x");
        assert_eq!(resolve_sides(&snap, "DAI"), (Slot::Base, Slot::Quote));
        assert_eq!(resolve_sides(&snap, "usdc"), (Slot::Quote, Slot::Base));
        let odd = snapshot("y", ("FOO", "0x1", 1.0), ("BAR", "0x2", 1.0), None, None);
        assert_eq!(resolve_sides(&odd, "BAZ"), (Slot::Quote, Slot::Base));
    }

    #[tokio::test]
    async fn test_deviation_and_threshold_override() {
        let mut fake = FakePools::default();
        fake.pools.insert("p1".into(), usdt_usdc("p1"));
        fake.listed.insert(USDT.into(), 0.994);
        fake.listed.insert(USDC.into(), 1.001);
        let c = collector(fake);

        let cfg = PairConfig::new("USDT", "bsc", "p1");
        let records = c.collect(&[cfg.clone()], None).await;
        for r in &records {
            assert!((r.deviation_pct - (r.price_usd - 1.0) / 1.0 * 100.0).abs() < 1e-9);
        }
        assert!(by_asset(&records, "USDT").is_alert);
        assert!(!by_asset(&records, "USDC").is_alert);

        let records = c.collect(&[cfg], Some(1.0)).await;
        assert!(records.iter().all(|r| !r.is_alert && r.threshold == 1.0));
    }

    #[tokio::test]
    async fn test_sequential_and_pooled_agree() {
        let configs: Vec<PairConfig> = (0..8).map(|i| PairConfig::new("USDT", "bsc", &format!("p{}", i))).collect();
        let build = |cutoff: usize| {
            let mut fake = FakePools::default();
            for cfg in &configs {
                fake.pools.insert(cfg.pool.clone(), usdt_usdc(&cfg.pool));
            }
            fake.listed.insert(USDT.into(), 0.999);
            StatusCollector::new(
                Arc::new(fake),
                CollectorSettings {
                    sequential_cutoff: cutoff,
                    max_workers: 5,
                },
            )
        };

        let key = |r: &PriceRecord| format!("{}:{}:{:.6}", r.asset_name, r.token_address, r.price_usd);
        let mut sequential: Vec<String> = build(100).collect(&configs, None).await.iter().map(key).collect();
        let mut pooled: Vec<String> = build(5).collect(&configs, None).await.iter().map(key).collect();
        sequential.sort();
        pooled.sort();
        assert_eq!(sequential.len(), 16);
        assert_eq!(sequential, pooled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_bounded_by_workers() {
        let mut fake = FakePools::default();
        for i in 0..12 {
            let pool = format!("p{}", i);
            fake.pools.insert(pool.clone(), usdt_usdc(&pool));
        }
        fake.delay = Some(Duration::from_millis(200));
        let fake = Arc::new(fake);
        let c = StatusCollector::new(fake.clone(), CollectorSettings::default());

        let configs: Vec<PairConfig> = (0..12).map(|i| PairConfig::new("USDT", "bsc", &format!("p{}", i))).collect();
        let records = c.collect(&configs, None).await;
        assert_eq!(records.len(), 24);
        assert_eq!(fake.max_in_flight.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_failures_isolated() {
        let mut fake = FakePools::default();
        for i in 0..7 {
            let pool = format!("p{}", i);
            fake.pools.insert(pool.clone(), usdt_usdc(&pool));
        }
        fake.pools.remove("p2");
        fake.panic_on = Some("p4".into());
        let c = collector(fake);

        // Pooled path
        let configs: Vec<PairConfig> = (0..7).map(|i| PairConfig::new("USDT", "bsc", &format!("p{}", i))).collect();
        assert_eq!(c.collect(&configs, None).await.len(), 10);

        // Sequential path
        assert_eq!(c.collect(&configs[2..5], None).await.len(), 2);
    }

    #[tokio::test]
    async fn test_legitimacy_annotates_records() {
        let mut fake = FakePools::default();
        fake.pools.insert(
            "p1".into(),
            snapshot("p1", ("USDT", "0x000000000000000000000000000000000000dead", 1000.0), ("USDC", USDC, 1000.0), Some(1.0), Some(1.0)),
        );
        let c = collector(fake).with_legitimacy(Arc::new(TokenLegitimacyChecker::default()));

        let records = c.collect(&[PairConfig::new("USDT", "bsc", "p1")], None).await;
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.risk == RiskLevel::Danger));
    }
}
