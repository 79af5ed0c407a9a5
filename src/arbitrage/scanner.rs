//! Arbitrage Scanner
//!
//! Groups price records by asset and looks for a cross-chain gap:
//! buy where the asset is cheapest, bridge, sell where it is richest.
//!
//! Per asset:
//!   1. Drop non-positive prices and danger-rated records
//!   2. Need records on at least two distinct chains
//!   3. Candidate = (min price record, max price record)
//!   4. Spread floor, then liquidity floor (unknown liquidity passes)
//!   5. Base cost model, then quote refinement when a refiner is attached
//!   6. Net profit and net margin floors
//!
//! Results are sorted by net profit, highest first.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

use super::cost::{estimate_cost, CostParams};
use super::refine::QuoteRefiner;
use crate::types::{ArbitrageOpportunity, PriceRecord, RiskLevel};

fn default_min_spread_pct() -> f64 { 1.0 }
fn default_min_profit_usd() -> f64 { 50.0 }
fn default_min_margin_pct() -> f64 { 2.0 }
fn default_min_liquidity_usd() -> f64 { 50_000.0 }

/// Acceptance floors (`[floors]` in the config file)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitFloors {
    #[serde(default = "default_min_spread_pct")]
    pub min_spread_pct: f64,
    #[serde(default = "default_min_profit_usd")]
    pub min_profit_usd: f64,
    #[serde(default = "default_min_margin_pct")]
    pub min_margin_pct: f64,
    #[serde(default = "default_min_liquidity_usd")]
    pub min_liquidity_usd: f64,
}

impl Default for ProfitFloors {
    fn default() -> Self {
        Self {
            min_spread_pct: default_min_spread_pct(),
            min_profit_usd: default_min_profit_usd(),
            min_margin_pct: default_min_margin_pct(),
            min_liquidity_usd: default_min_liquidity_usd(),
        }
    }
}

/// Cross-chain opportunity scanner
#[derive(Default)]
pub struct ArbitrageScanner {
    refiner: Option<QuoteRefiner>,
}

impl ArbitrageScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_refiner(mut self, refiner: QuoteRefiner) -> Self {
        self.refiner = Some(refiner);
        self
    }

    pub fn has_refiner(&self) -> bool {
        self.refiner.is_some()
    }

    pub async fn scan(
        &self,
        records: &[PriceRecord],
        trade_size_usd: f64,
        params: &CostParams,
        floors: &ProfitFloors,
    ) -> Vec<ArbitrageOpportunity> {
        let mut groups: BTreeMap<&str, Vec<&PriceRecord>> = BTreeMap::new();
        for record in records {
            if record.price_usd <= 0.0 || record.risk == RiskLevel::Danger {
                continue;
            }
            groups.entry(record.asset_name.as_str()).or_default().push(record);
        }

        let mut opportunities = Vec::new();
        for (asset, group) in groups {
            if let Some(opp) = self.check_asset(asset, &group, trade_size_usd, params, floors).await {
                opportunities.push(opp);
            }
        }

        // Sort by net profit descending
        opportunities.sort_by(|a, b| {
            b.cost
                .net_profit
                .partial_cmp(&a.cost.net_profit)
                .unwrap_or(Ordering::Equal)
        });

        opportunities
    }

    async fn check_asset(
        &self,
        asset: &str,
        group: &[&PriceRecord],
        trade_size_usd: f64,
        params: &CostParams,
        floors: &ProfitFloors,
    ) -> Option<ArbitrageOpportunity> {
        let chains: HashSet<&str> = group.iter().map(|r| r.chain.as_str()).collect();
        if chains.len() < 2 {
            debug!("{} seen on {} chain(s), skipping", asset, chains.len());
            return None;
        }

        let cheap = *group
            .iter()
            .min_by(|a, b| a.price_usd.partial_cmp(&b.price_usd).unwrap_or(Ordering::Equal))?;
        let rich = *group
            .iter()
            .max_by(|a, b| a.price_usd.partial_cmp(&b.price_usd).unwrap_or(Ordering::Equal))?;
        if rich.price_usd <= cheap.price_usd {
            return None;
        }

        let spread_pct = (rich.price_usd - cheap.price_usd) / cheap.price_usd * 100.0;
        if spread_pct < floors.min_spread_pct {
            debug!(
                "{} spread {:.3}% below floor {:.3}%",
                asset, spread_pct, floors.min_spread_pct
            );
            return None;
        }

        for side in [cheap, rich] {
            if let Some(liq) = side.liquidity_usd {
                if liq < floors.min_liquidity_usd {
                    debug!(
                        "Skipping {} - liquidity ${:.0} on {} below ${:.0}",
                        asset, liq, side.chain, floors.min_liquidity_usd
                    );
                    return None;
                }
            }
        }

        let mut cost = estimate_cost(trade_size_usd, cheap.price_usd, rich.price_usd, params);
        if let Some(refiner) = &self.refiner {
            cost = refiner.refine(cheap, rich, cost).await;
        }

        if cost.net_profit < floors.min_profit_usd || cost.net_margin < floors.min_margin_pct {
            debug!(
                "{} {}→{} rejected: net ${:.2} ({:.2}%)",
                asset, cheap.chain, rich.chain, cost.net_profit, cost.net_margin
            );
            return None;
        }

        info!(
            "🎯 OPPORTUNITY: {} | Buy {} @ {:.4} | Sell {} @ {:.4} | Spread {:.2}% | Net ${:.2} ({:.2}%)",
            asset,
            cheap.chain,
            cheap.price_usd,
            rich.chain,
            rich.price_usd,
            cost.spread_pct,
            cost.net_profit,
            cost.net_margin
        );

        Some(ArbitrageOpportunity {
            asset_name: asset.to_string(),
            cheap_chain: cheap.chain.clone(),
            cheap_price: cheap.price_usd,
            rich_chain: rich.chain.clone(),
            rich_price: rich.price_usd,
            cost,
        })
    }
}
