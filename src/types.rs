//! Core data structures shared by the collector, scanner and notifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::arbitrage::cost::CostDetail;

fn default_anchor_price() -> f64 { 1.0 }
fn default_deviation_threshold() -> f64 { 0.5 }

/// One monitored pool: which asset to watch, where, and against what anchor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairConfig {
    #[serde(alias = "name")]
    pub asset_name: String,
    /// DexScreener chain slug (bsc, base, ethereum, ...)
    pub chain: String,
    #[serde(alias = "pair_address")]
    pub pool: String,
    #[serde(default = "default_anchor_price")]
    pub anchor_price: f64,
    /// Percent
    #[serde(default = "default_deviation_threshold", alias = "threshold")]
    pub deviation_threshold: f64,
}

impl PairConfig {
    pub fn new(asset_name: &str, chain: &str, pool: &str) -> Self {
        Self {
            asset_name: asset_name.to_string(),
            chain: chain.to_string(),
            pool: pool.to_string(),
            anchor_price: default_anchor_price(),
            deviation_threshold: default_deviation_threshold(),
        }
    }
}

/// Which fallback produced a record's USD price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PriceSource {
    /// Best-liquidity listing from the multi-token endpoint
    TokenEndpoint,
    /// The pool's own quoted price for that side
    PoolQuote,
    /// Derived from the other side through the pool exchange rate
    PoolRate,
}

impl fmt::Display for PriceSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PriceSource::TokenEndpoint => write!(f, "token-endpoint"),
            PriceSource::PoolQuote => write!(f, "pool-quote"),
            PriceSource::PoolRate => write!(f, "pool-rate"),
        }
    }
}

/// Token legitimacy verdict, ordered by severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Safe,
    Warning,
    Danger,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RiskLevel::Safe => write!(f, "safe"),
            RiskLevel::Warning => write!(f, "warning"),
            RiskLevel::Danger => write!(f, "danger"),
        }
    }
}

/// Per-cycle price observation for one side of one pool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceRecord {
    pub asset_name: String,
    pub chain: String,
    pub price_usd: f64,
    /// (price - anchor) / anchor * 100
    pub deviation_pct: f64,
    pub threshold: f64,
    pub is_alert: bool,
    pub token_address: String,
    /// Symbol on the other side of the pool
    pub counter_asset_name: Option<String>,
    /// One unit of this side ≈ rate units of the counter side
    pub pool_exchange_rate: Option<f64>,
    pub liquidity_usd: Option<f64>,
    pub venue: Option<String>,
    pub price_source: PriceSource,
    pub risk: RiskLevel,
}

impl PriceRecord {
    /// `(asset, chain)` identity used by the depeg edge trigger
    pub fn key(&self) -> (String, String) {
        (self.asset_name.clone(), self.chain.clone())
    }
}

/// Percentage deviation of `price` from `anchor`. Zero for a non-positive anchor.
pub fn deviation_pct(price: f64, anchor: f64) -> f64 {
    if anchor <= 0.0 {
        return 0.0;
    }
    (price - anchor) / anchor * 100.0
}

/// A cross-chain price gap worth reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArbitrageOpportunity {
    pub asset_name: String,
    pub cheap_chain: String,
    pub cheap_price: f64,
    pub rich_chain: String,
    pub rich_price: f64,
    pub cost: CostDetail,
}

impl ArbitrageOpportunity {
    /// Debounce identity across cycles: `asset:cheap->rich`
    pub fn alert_key(&self) -> String {
        format!("{}:{}->{}", self.asset_name, self.cheap_chain, self.rich_chain)
    }
}

impl fmt::Display for ArbitrageOpportunity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {}@{:.4} -> {}@{:.4} | spread {:.2}% | net ${:.2} ({:.2}%)",
            self.asset_name,
            self.cheap_chain,
            self.cheap_price,
            self.rich_chain,
            self.rich_price,
            self.cost.spread_pct,
            self.cost.net_profit,
            self.cost.net_margin
        )
    }
}
