//! Depeg Monitor
//!
//! Price collection, pair discovery, alert state and the polling loop.

pub mod alerts;
pub mod collector;
pub mod crosscheck;
pub mod discovery;
pub mod runner;

pub use alerts::{DepegTracker, HeartbeatSchedule};
pub use collector::{CollectorSettings, StatusCollector};
pub use crosscheck::suspect_side;
pub use discovery::{merge_pairs, DiscoveredPair, DiscoverySettings, DiscoveryStats, PairDiscovery};
pub use runner::{CycleReport, Monitor};
