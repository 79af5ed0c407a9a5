//! Alert message text
//!
//! Plain text shared by every channel. The first line is a bracketed tag
//! that Discord turns into the embed title.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::arbitrage::CostComponent;
use crate::types::{ArbitrageOpportunity, PriceRecord};

pub const DEPEG_TAG: &str = "[Stablecoin Depeg Alert]";
pub const ARB_TAG: &str = "[Cross-Chain Arbitrage]";
pub const HEARTBEAT_TAG: &str = "[Depeg Monitor Heartbeat]";

/// Assets listed in a heartbeat before the rest is elided
const HEARTBEAT_MAX_ASSETS: usize = 20;

/// Global reference context for a depeg alert
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalReference {
    pub symbol: String,
    pub price_usd: f64,
}

impl GlobalReference {
    /// Deviation of the global price from a $1 peg
    pub fn deviation_pct(&self) -> f64 {
        (self.price_usd - 1.0) * 100.0
    }
}

pub fn depeg_alert(
    record: &PriceRecord,
    global: Option<&GlobalReference>,
    suspect: Option<&str>,
) -> String {
    let mut msg = format!(
        "{}\n{} ({})\nPrice: {:.6} USD\nDeviation: {:+.3}% (threshold ±{:.3}%)",
        DEPEG_TAG, record.asset_name, record.chain, record.price_usd, record.deviation_pct, record.threshold
    );
    if let Some(counter) = &record.counter_asset_name {
        let _ = write!(msg, "\nPriced via {} pool ({})", counter, record.price_source);
    }
    if let Some(global) = global {
        let _ = write!(
            msg,
            "\nGlobal reference: {} ≈ {:.6} USD (global deviation {:+.3}%)",
            global.symbol,
            global.price_usd,
            global.deviation_pct()
        );
    }
    if let Some(side) = suspect {
        let _ = write!(msg, "\nLikely depegged side: {}", side);
    }
    msg
}

fn component(c: &CostComponent) -> String {
    if c.is_overridden() {
        format!("${:.2} ({})", c.usd, c.source)
    } else {
        format!("${:.2}", c.usd)
    }
}

pub fn arbitrage_alert(opp: &ArbitrageOpportunity) -> String {
    let cd = &opp.cost;
    let mut msg = format!(
        "{}\n{}\nBuy on: {}  price: {:.6} USD\nSell on: {}  price: {:.6} USD\nSpread: {:+.3}%\n\
         Estimated at trade size ${:.0}:\nNet profit: ${:.2} (net margin {:+.3}%)\n\
         Costs: src gas {} / dst gas {} / bridge {} / slippage {}",
        ARB_TAG,
        opp.asset_name,
        opp.cheap_chain,
        opp.cheap_price,
        opp.rich_chain,
        opp.rich_price,
        cd.spread_pct,
        cd.trade_size_usd,
        cd.net_profit,
        cd.net_margin,
        component(&cd.src_gas),
        component(&cd.dst_gas),
        component(&cd.bridge_fee),
        component(&cd.slippage_loss),
    );
    if cd.other_fees.usd > 0.0 {
        let _ = write!(msg, " / other {}", component(&cd.other_fees));
    }
    if let Some(size) = cd.break_even_size.filter(|s| *s > 0.0) {
        let _ = write!(msg, "\nBreak-even size: ${:.2}", size);
    }
    if let (Some(source), Some(received)) = (&cd.refinement_source, cd.received_amount) {
        let _ = write!(msg, "\nRefined by {}: receive {:.4} {}", source, received, opp.asset_name);
    } else if let Some(reason) = &cd.skip_reason {
        let _ = write!(msg, "\nQuote not used: {}", reason);
    }
    msg
}

/// Inputs for the daily heartbeat
pub struct HeartbeatStats<'a> {
    pub local_time: String,
    pub records: &'a [PriceRecord],
    pub depeg_alerts_total: u64,
    pub arb_alerts_total: u64,
    pub channels: Vec<String>,
}

pub fn heartbeat(stats: &HeartbeatStats<'_>) -> String {
    let mut by_asset: BTreeMap<String, Vec<&PriceRecord>> = BTreeMap::new();
    for r in stats.records {
        by_asset.entry(r.asset_name.to_uppercase()).or_default().push(r);
    }
    let chain_count = stats
        .records
        .iter()
        .map(|r| r.chain.as_str())
        .collect::<std::collections::HashSet<_>>()
        .len();
    let alerting = stats.records.iter().filter(|r| r.is_alert).count();

    let mut msg = format!(
        "{}\n⏰ Time: {}\n📊 Monitoring:\n  - price records: {}\n  - chains: {}\n  - assets: {}\n\
         ⚠️ Depegged this cycle: {}\n📈 Depeg alerts sent: {}\n💰 Arbitrage alerts sent: {}\n",
        HEARTBEAT_TAG,
        stats.local_time,
        stats.records.len(),
        chain_count,
        by_asset.len(),
        alerting,
        stats.depeg_alerts_total,
        stats.arb_alerts_total,
    );
    if !stats.channels.is_empty() {
        let _ = writeln!(msg, "📤 Channels: {}", stats.channels.join(", "));
    }
    msg.push_str("\n📋 Watchlist:\n");

    if by_asset.is_empty() {
        msg.push_str("  (nothing monitored)");
        return msg;
    }

    let lines: Vec<String> = by_asset
        .iter()
        .map(|(asset, records)| {
            let mut records = records.clone();
            records.sort_by(|a, b| a.chain.cmp(&b.chain));
            let chains: Vec<String> = records
                .iter()
                .map(|r| {
                    format!(
                        "{}: ${:.4} ({:+.2}%){}",
                        r.chain,
                        r.price_usd,
                        r.deviation_pct,
                        if r.is_alert { "⚠️" } else { "✅" }
                    )
                })
                .collect();
            if chains.len() > 3 {
                format!("  • {}:\n    {}", asset, chains.join(", "))
            } else {
                format!("  • {}: {}", asset, chains.join(", "))
            }
        })
        .collect();

    if lines.len() > HEARTBEAT_MAX_ASSETS {
        msg.push_str(&lines[..HEARTBEAT_MAX_ASSETS].join("\n"));
        let _ = write!(msg, "\n  ... {} more omitted", lines.len() - HEARTBEAT_MAX_ASSETS);
    } else {
        msg.push_str(&lines.join("\n"));
    }
    msg
}
