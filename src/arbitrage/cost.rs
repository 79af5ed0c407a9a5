//! Base Cost Model
//!
//! Heuristic round-trip cost of buying on the cheap chain, bridging, and
//! selling on the rich chain:
//!
//!   spread      = (rich - cheap) / cheap
//!   theoretical = trade_size × spread
//!   total       = gas_src + gas_dst + bridge + trade_size × slippage
//!   net         = theoretical - total
//!
//! Every component remembers where its number came from so a refined detail
//! (see `refine`) can show which parts a live quote replaced.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::refine::SkipReason;

fn default_trade_size_usd() -> f64 { 5000.0 }
fn default_gas_usd() -> f64 { 1.0 }
fn default_bridge_fee_usd() -> f64 { 5.0 }
fn default_slippage_pct() -> f64 { 0.5 }

/// Where a cost component's number came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CostSource {
    /// Configured heuristic
    #[default]
    Estimate,
    /// Itemized in an aggregator quote
    Quote,
    /// Derived from current gas prices
    GasOracle,
}

impl fmt::Display for CostSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CostSource::Estimate => write!(f, "estimate"),
            CostSource::Quote => write!(f, "quote"),
            CostSource::GasOracle => write!(f, "gas-oracle"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CostComponent {
    pub usd: f64,
    pub source: CostSource,
}

impl CostComponent {
    pub fn estimate(usd: f64) -> Self {
        Self { usd, source: CostSource::Estimate }
    }

    pub fn with_source(usd: f64, source: CostSource) -> Self {
        Self { usd, source }
    }

    pub fn is_overridden(&self) -> bool {
        self.source != CostSource::Estimate
    }
}

/// Heuristic cost assumptions (`[costs]` in the config file)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostParams {
    #[serde(default = "default_trade_size_usd")]
    pub trade_size_usd: f64,
    #[serde(default = "default_gas_usd")]
    pub src_gas_usd: f64,
    #[serde(default = "default_gas_usd")]
    pub dst_gas_usd: f64,
    #[serde(default = "default_bridge_fee_usd")]
    pub bridge_fee_usd: f64,
    /// Percent of trade size
    #[serde(default = "default_slippage_pct")]
    pub slippage_pct: f64,
}

impl Default for CostParams {
    fn default() -> Self {
        Self {
            trade_size_usd: default_trade_size_usd(),
            src_gas_usd: default_gas_usd(),
            dst_gas_usd: default_gas_usd(),
            bridge_fee_usd: default_bridge_fee_usd(),
            slippage_pct: default_slippage_pct(),
        }
    }
}

/// Cost breakdown for one cheap→rich candidate
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CostDetail {
    pub trade_size_usd: f64,
    pub spread_pct: f64,
    pub theoretical_profit: f64,
    pub src_gas: CostComponent,
    pub dst_gas: CostComponent,
    pub bridge_fee: CostComponent,
    /// Non-bridge fees itemized by a quote; zero for a pure estimate
    pub other_fees: CostComponent,
    pub slippage_loss: CostComponent,
    pub slippage_pct: f64,
    pub total_cost: f64,
    pub net_profit: f64,
    pub net_margin: f64,
    /// Minimum trade size covering fixed costs at this spread
    pub break_even_size: Option<f64>,
    /// Destination tokens a live quote says we would receive
    pub received_amount: Option<f64>,
    pub refinement_source: Option<String>,
    pub skip_reason: Option<SkipReason>,
}

impl CostDetail {
    /// gas + bridge + other fees
    pub fn fixed_costs(&self) -> f64 {
        self.src_gas.usd + self.dst_gas.usd + self.bridge_fee.usd + self.other_fees.usd
    }

    pub fn is_refined(&self) -> bool {
        self.refinement_source.is_some()
    }

    /// Any component replaced by a more precise source
    pub fn has_overrides(&self) -> bool {
        [
            self.src_gas,
            self.dst_gas,
            self.bridge_fee,
            self.other_fees,
            self.slippage_loss,
        ]
        .iter()
        .any(CostComponent::is_overridden)
    }

    /// Re-derive total/net/margin from the components.
    pub fn recompute_from_components(&mut self) {
        self.total_cost = self.fixed_costs() + self.slippage_loss.usd;
        self.net_profit = self.theoretical_profit - self.total_cost;
        self.net_margin = margin(self.net_profit, self.trade_size_usd);
    }
}

pub(crate) fn margin(net_profit: f64, trade_size_usd: f64) -> f64 {
    if trade_size_usd > 0.0 {
        net_profit / trade_size_usd * 100.0
    } else {
        0.0
    }
}

/// Buy `trade_size_usd` worth on the cheap side, sell on the rich side.
pub fn estimate_cost(
    trade_size_usd: f64,
    cheap_price: f64,
    rich_price: f64,
    params: &CostParams,
) -> CostDetail {
    if cheap_price <= 0.0 || rich_price <= 0.0 {
        return CostDetail {
            trade_size_usd,
            ..Default::default()
        };
    }

    let spread_pct = (rich_price - cheap_price) / cheap_price * 100.0;
    let theoretical_profit = trade_size_usd * spread_pct / 100.0;
    let slippage_loss = trade_size_usd * params.slippage_pct / 100.0;
    let fixed = params.src_gas_usd + params.dst_gas_usd + params.bridge_fee_usd;

    // Only meaningful with a positive edge and something fixed to amortize
    let edge = spread_pct - params.slippage_pct;
    let break_even_size = (edge > 0.0 && fixed > 0.0).then(|| fixed * 100.0 / edge);

    let mut detail = CostDetail {
        trade_size_usd,
        spread_pct,
        theoretical_profit,
        src_gas: CostComponent::estimate(params.src_gas_usd),
        dst_gas: CostComponent::estimate(params.dst_gas_usd),
        bridge_fee: CostComponent::estimate(params.bridge_fee_usd),
        other_fees: CostComponent::estimate(0.0),
        slippage_loss: CostComponent::estimate(slippage_loss),
        slippage_pct: params.slippage_pct,
        break_even_size,
        ..Default::default()
    };
    detail.recompute_from_components();
    detail
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_reference_example() {
        let d = estimate_cost(5000.0, 0.95, 1.05, &CostParams::default());
        assert!(close(d.spread_pct, 10.526315789));
        assert!(close(d.theoretical_profit, 526.315789473));
        assert!(close(d.slippage_loss.usd, 25.0));
        assert!(close(d.total_cost, 32.0));
        assert!(close(d.net_profit, 494.315789473));
        assert!(close(d.net_margin, 9.886315789));
        assert!(!d.has_overrides());
    }

    #[test]
    fn test_net_is_theoretical_minus_total() {
        let params = CostParams {
            src_gas_usd: 30.0,
            dst_gas_usd: 30.0,
            bridge_fee_usd: 0.0,
            slippage_pct: 0.0,
            ..Default::default()
        };
        let d = estimate_cost(5000.0, 0.99, 1.01, &params);
        assert!(close(d.total_cost, 60.0));
        assert!(close(d.net_profit, d.theoretical_profit - d.total_cost));
    }

    #[test]
    fn test_break_even_size() {
        // edge = 2.0408% - 0.5%; fixed = 7
        let d = estimate_cost(5000.0, 0.98, 1.0, &CostParams::default());
        let expected = 7.0 * 100.0 / (d.spread_pct - 0.5);
        assert!(close(d.break_even_size.unwrap(), expected));

        // Spread below slippage: no break-even
        let d = estimate_cost(5000.0, 1.0, 1.001, &CostParams::default());
        assert_eq!(d.break_even_size, None);
    }

    #[test]
    fn test_no_break_even_without_fixed_costs() {
        let params = CostParams {
            src_gas_usd: 0.0,
            dst_gas_usd: 0.0,
            bridge_fee_usd: 0.0,
            ..CostParams::default()
        };
        let d = estimate_cost(5000.0, 0.98, 1.0, &params);
        assert!(d.spread_pct > params.slippage_pct);
        assert_eq!(d.break_even_size, None);
    }

    #[test]
    fn test_non_positive_price_yields_zero_detail() {
        let d = estimate_cost(5000.0, 0.0, 1.0, &CostParams::default());
        assert_eq!(d.spread_pct, 0.0);
        assert_eq!(d.total_cost, 0.0);
        assert_eq!(d.net_profit, 0.0);
        assert_eq!(d.break_even_size, None);
    }

    #[test]
    fn test_source_display() {
        assert_eq!(CostSource::GasOracle.to_string(), "gas-oracle");
        assert_eq!(CostSource::Quote.to_string(), "quote");
    }
}
