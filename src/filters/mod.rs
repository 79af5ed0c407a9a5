//! Token filtering
//!
//! Legitimacy screening for pool sides before they reach the arbitrage scanner.
//! Tables default to built-ins; `[legitimacy] file` points at a JSON override.

pub mod legitimacy;

pub use legitimacy::{LegitimacyConfig, LegitimacyReport, PairProfile, TokenLegitimacyChecker};
