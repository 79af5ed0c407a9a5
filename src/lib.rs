//! Stablecoin Depeg Monitor Library
//!
//! Watches stablecoin pools across EVM chains, flags depegs against an anchor
//! price, and estimates whether a cross-chain price gap can be arbitraged
//! after gas, bridge fees and slippage.

pub mod arbitrage;
pub mod chains;
pub mod config;
pub mod errors;
pub mod filters;
pub mod http;
pub mod monitor;
pub mod notify;
pub mod oracle;
pub mod types;

// Re-export commonly used types
pub use arbitrage::{ArbitrageScanner, CostDetail, CostParams, ProfitFloors, QuoteRefiner};
pub use config::MonitorConfig;
pub use errors::{FetchError, QuoteError};
pub use monitor::{CycleReport, DiscoverySettings, Monitor, PairDiscovery, StatusCollector};
pub use types::{ArbitrageOpportunity, PairConfig, PriceRecord, RiskLevel};
