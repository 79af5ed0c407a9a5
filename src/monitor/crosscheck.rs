//! Global reference cross-check
//!
//! A stable/stable pool only tells us the *ratio* between its two tokens. When
//! that ratio drifts, either side may be the one that lost its peg. Using the
//! global reference price of the main token plus the pool rate, we derive the
//! implied price of the counter token and compare both sides against their
//! global reference. The side that deviates clearly more is the suspect.

use std::collections::HashMap;

use crate::types::PriceRecord;

/// One side must deviate this many times more than the other to be named.
const DOMINANCE_RATIO: f64 = 1.2;

/// Deviation (%) of the record's price from the global reference of its asset.
pub fn global_deviation(record: &PriceRecord, cg_prices: &HashMap<String, f64>) -> Option<f64> {
    let reference = *cg_prices.get(&record.asset_name.to_uppercase())?;
    if reference <= 0.0 {
        return None;
    }
    Some((record.price_usd - reference) / reference * 100.0)
}

/// Name the token more likely to have depegged, if the evidence is clear.
///
/// Needs a counter asset, a positive pool rate and global prices for both
/// tokens. Returns `None` when the two deviations are too close to call.
pub fn suspect_side(record: &PriceRecord, cg_prices: &HashMap<String, f64>) -> Option<String> {
    let main = record.asset_name.to_uppercase();
    let counter = record.counter_asset_name.as_ref()?.to_uppercase();
    let rate = record.pool_exchange_rate.filter(|r| *r > 0.0)?;
    if main.is_empty() || counter.is_empty() || record.price_usd <= 0.0 {
        return None;
    }

    let cg_main = *cg_prices.get(&main).filter(|p| **p > 0.0)?;
    let cg_counter = *cg_prices.get(&counter).filter(|p| **p > 0.0)?;

    // 1 main ≈ rate counter, so counter ≈ cg_main / rate
    let implied_counter = cg_main / rate;

    let dev_main = ((record.price_usd - cg_main) / cg_main * 100.0).abs();
    let dev_counter = ((implied_counter - cg_counter) / cg_counter * 100.0).abs();

    if dev_main > dev_counter * DOMINANCE_RATIO {
        Some(main)
    } else if dev_counter > dev_main * DOMINANCE_RATIO {
        Some(counter)
    } else {
        None
    }
}
