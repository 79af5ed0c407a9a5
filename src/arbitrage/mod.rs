//! Arbitrage Module
//!
//! Cross-chain opportunity scanning, cost modelling, quote refinement and
//! alert debouncing.

pub mod cooldown;
pub mod cost;
pub mod refine;
pub mod scanner;

pub use cooldown::AlertCooldown;
pub use cost::{estimate_cost, CostComponent, CostDetail, CostParams, CostSource};
pub use refine::{QuoteRefiner, SkipReason};
pub use scanner::{ArbitrageScanner, ProfitFloors};
