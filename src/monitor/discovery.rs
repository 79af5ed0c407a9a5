//! Pair Discovery
//!
//! Finds stable/stable pools worth monitoring by searching DexScreener for
//! each stable symbol against the major stables. Per symbol:
//!   1. One search per query (`SYM/USDT`, `USDT/SYM`, ...); a failed query is skipped
//!   2. Keep pools on allowed chains where both sides are stables and one side is SYM
//!   3. Drop pools below the liquidity floor, or rated danger by the legitimacy checker
//!   4. Highest liquidity first, at most `max_results_per_chain` per chain
//!
//! Results across symbols are deduplicated by (chain, pool).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

use crate::chains::{is_stable_symbol, CHAIN_IDS, STABLE_SYMBOLS};
use crate::filters::{LegitimacyReport, PairProfile, TokenLegitimacyChecker};
use crate::http::TokenBucket;
use crate::oracle::{PairSearch, PoolSnapshot};
use crate::types::{PairConfig, RiskLevel};

/// Counter symbols searched as `SYM/<counter>`
const COUNTER_SYMBOLS: &[&str] = &["USDT", "USDC", "DAI", "BUSD", "USDD", "TUSD", "USDP"];
/// Majors also searched as `<major>/SYM`, since DexScreener matches base/quote order
const LEADING_SYMBOLS: &[&str] = &["USDT", "USDC", "DAI"];

fn default_min_liquidity_usd() -> f64 { 10_000.0 }
fn default_max_results_per_chain() -> usize { 5 }

/// `[discovery]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoverySettings {
    /// Merge discovered pools into the monitored set at startup and on reload
    #[serde(default)]
    pub enabled: bool,
    /// Empty searches every known stable
    #[serde(default)]
    pub symbols: Vec<String>,
    /// Empty allows every chain in the registry
    #[serde(default)]
    pub chains: Vec<String>,
    #[serde(default = "default_min_liquidity_usd")]
    pub min_liquidity_usd: f64,
    #[serde(default = "default_max_results_per_chain")]
    pub max_results_per_chain: usize,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            symbols: Vec::new(),
            chains: Vec::new(),
            min_liquidity_usd: default_min_liquidity_usd(),
            max_results_per_chain: default_max_results_per_chain(),
        }
    }
}

impl DiscoverySettings {
    pub fn symbols(&self) -> Vec<String> {
        if self.symbols.is_empty() {
            STABLE_SYMBOLS.iter().map(|s| s.to_string()).collect()
        } else {
            self.symbols.iter().map(|s| s.trim().to_uppercase()).collect()
        }
    }

    pub fn chains(&self) -> Vec<String> {
        if self.chains.is_empty() {
            CHAIN_IDS.iter().map(|(slug, _)| slug.to_string()).collect()
        } else {
            self.chains.iter().map(|c| c.trim().to_lowercase()).collect()
        }
    }
}

/// Distinct search queries for one symbol, in a stable order.
pub fn search_queries(symbol: &str) -> Vec<String> {
    let symbol = symbol.trim().to_uppercase();
    let trailing = COUNTER_SYMBOLS.iter().map(|c| format!("{}/{}", symbol, c));
    let leading = LEADING_SYMBOLS.iter().map(|c| format!("{}/{}", c, symbol));
    let queries: BTreeSet<String> = trailing
        .chain(leading)
        .filter(|q| q.split('/').collect::<HashSet<_>>().len() == 2)
        .collect();
    queries.into_iter().collect()
}

/// A pool found by discovery
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredPair {
    /// The searched stable; becomes the monitored side
    pub symbol: String,
    pub snapshot: PoolSnapshot,
    pub legitimacy: Option<LegitimacyReport>,
}

impl DiscoveredPair {
    pub fn liquidity_usd(&self) -> f64 {
        self.snapshot.liquidity_usd.unwrap_or(0.0)
    }

    pub fn key(&self) -> (String, String) {
        pool_key(&self.snapshot.chain, &self.snapshot.pool)
    }

    pub fn to_pair_config(&self) -> PairConfig {
        PairConfig::new(&self.symbol, &self.snapshot.chain, &self.snapshot.pool)
    }
}

fn pool_key(chain: &str, pool: &str) -> (String, String) {
    (chain.trim().to_lowercase(), pool.trim().to_lowercase())
}

/// Counters for one discovery run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveryStats {
    pub total_symbols: usize,
    /// Before cross-symbol deduplication
    pub total_pairs_found: usize,
    pub unique_pairs: usize,
    /// Failed search queries
    pub errors: usize,
    pub requests_made: u64,
    pub rate_limited_count: u64,
}

pub struct PairDiscovery {
    source: Arc<dyn PairSearch>,
    checker: Option<Arc<TokenLegitimacyChecker>>,
    limiter: Option<Arc<TokenBucket>>,
    settings: DiscoverySettings,
}

impl PairDiscovery {
    pub fn new(source: Arc<dyn PairSearch>, settings: DiscoverySettings) -> Self {
        Self {
            source,
            checker: None,
            limiter: None,
            settings,
        }
    }

    pub fn with_legitimacy(mut self, checker: Arc<TokenLegitimacyChecker>) -> Self {
        self.checker = Some(checker);
        self
    }

    /// Limiter whose counters are reported in `DiscoveryStats`
    pub fn with_limiter(mut self, limiter: Arc<TokenBucket>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn settings(&self) -> &DiscoverySettings {
        &self.settings
    }

    /// Search every configured symbol.
    pub async fn discover(&self) -> (Vec<DiscoveredPair>, DiscoveryStats) {
        let symbols = self.settings.symbols();
        let chains = self.settings.chains();
        let (requests_before, throttled_before) = self.limiter_counts();

        info!(
            "🔎 Discovering pairs for {} stables on {} chains (min liquidity ${:.0})",
            symbols.len(),
            chains.len(),
            self.settings.min_liquidity_usd
        );

        let mut all = Vec::new();
        let mut errors = 0;
        for (i, symbol) in symbols.iter().enumerate() {
            let (found, failed) = self.search_symbol(symbol, &chains).await;
            info!("Discovery {}/{}: {} → {} pairs", i + 1, symbols.len(), symbol, found.len());
            errors += failed;
            all.extend(found);
        }

        let total_pairs_found = all.len();
        let mut seen = HashSet::new();
        all.retain(|pair| seen.insert(pair.key()));

        let (requests_after, throttled_after) = self.limiter_counts();
        let stats = DiscoveryStats {
            total_symbols: symbols.len(),
            total_pairs_found,
            unique_pairs: all.len(),
            errors,
            requests_made: requests_after.saturating_sub(requests_before),
            rate_limited_count: throttled_after.saturating_sub(throttled_before),
        };
        info!(
            "Discovery done: {} unique pairs ({} found), {} failed queries, {} throttled",
            stats.unique_pairs, stats.total_pairs_found, stats.errors, stats.rate_limited_count
        );
        (all, stats)
    }

    /// Pools for one symbol, plus the number of failed queries.
    pub async fn search_symbol(&self, symbol: &str, chains: &[String]) -> (Vec<DiscoveredPair>, usize) {
        let symbol = symbol.trim().to_uppercase();
        let mut results: Vec<DiscoveredPair> = Vec::new();
        let mut seen = HashSet::new();
        let mut failed = 0;

        for query in search_queries(&symbol) {
            let snapshots = match self.source.search_pairs(&query).await {
                Ok(snapshots) => snapshots,
                Err(e) => {
                    warn!("Discovery search {} failed: {}", query, e);
                    failed += 1;
                    continue;
                }
            };

            for snap in snapshots {
                if !self.accepts(&symbol, &snap, chains) || seen.contains(&pool_key(&snap.chain, &snap.pool)) {
                    continue;
                }
                let legitimacy = self.judge(&symbol, &snap);
                if let Some(report) = legitimacy.as_ref().filter(|r| r.risk == RiskLevel::Danger) {
                    warn!(
                        "Discovery: dropping suspected fake {}/{} on {}: {}",
                        snap.base.symbol,
                        snap.quote.symbol,
                        snap.chain,
                        report.warnings.join("; ")
                    );
                    continue;
                }
                seen.insert(pool_key(&snap.chain, &snap.pool));
                results.push(DiscoveredPair {
                    symbol: symbol.clone(),
                    snapshot: snap,
                    legitimacy,
                });
            }
        }

        results.sort_by(|a, b| {
            b.liquidity_usd()
                .partial_cmp(&a.liquidity_usd())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let cap = self.settings.max_results_per_chain.max(1);
        let mut per_chain: HashMap<String, usize> = HashMap::new();
        results.retain(|pair| {
            let count = per_chain.entry(pair.snapshot.chain.clone()).or_default();
            *count += 1;
            *count <= cap
        });
        (results, failed)
    }

    fn accepts(&self, symbol: &str, snap: &PoolSnapshot, chains: &[String]) -> bool {
        let (base, quote) = (&snap.base.symbol, &snap.quote.symbol);
        chains.iter().any(|c| *c == snap.chain)
            && is_stable_symbol(base)
            && is_stable_symbol(quote)
            && (base == symbol || quote == symbol)
            && snap.liquidity_usd.unwrap_or(0.0) >= self.settings.min_liquidity_usd
            && !snap.pool.is_empty()
    }

    fn judge(&self, symbol: &str, snap: &PoolSnapshot) -> Option<LegitimacyReport> {
        let checker = self.checker.as_ref()?;
        let price_usd = if snap.base.symbol == symbol {
            snap.base_price_usd
        } else {
            snap.quote_price_usd()
        };
        Some(checker.check(&PairProfile {
            chain: &snap.chain,
            tokens: [
                (snap.base.symbol.as_str(), snap.base.address.as_str()),
                (snap.quote.symbol.as_str(), snap.quote.address.as_str()),
            ],
            venue: snap.venue.as_deref(),
            liquidity_usd: snap.liquidity_usd,
            price_usd,
            anchor_price: 1.0,
        }))
    }

    fn limiter_counts(&self) -> (u64, u64) {
        self.limiter
            .as_ref()
            .map(|l| (l.total_requests(), l.rate_limited_count()))
            .unwrap_or((0, 0))
    }
}

/// Append discovered pools that are not configured yet. Returns the added entries.
pub fn merge_pairs(pairs: &mut Vec<PairConfig>, found: &[DiscoveredPair]) -> Vec<PairConfig> {
    let mut known: HashSet<(String, String)> =
        pairs.iter().map(|p| pool_key(&p.chain, &p.pool)).collect();
    let added: Vec<PairConfig> = found
        .iter()
        .filter(|pair| known.insert(pair.key()))
        .map(DiscoveredPair::to_pair_config)
        .collect();
    pairs.extend(added.iter().cloned());
    added
}
