//! Token Legitimacy Checker
//!
//! Classifies a pool side as safe / warning / danger before it is allowed to
//! feed the arbitrage scanner. Copycat tokens reuse a real stablecoin's
//! symbol on a different contract, usually in a thin pool on an obscure DEX.
//!
//! Checks, in order:
//! 1. Liquidity below the floor (or unknown) → warning
//! 2. Price far from anchor → warning, or danger past the hard limit
//! 3. Known stable symbol on a non-official contract → danger
//! 4. Venue outside the chain's trusted DEX set → warning
//!
//! Built-in tables cover the major stables and chains; a JSON file may replace them.

use alloy::primitives::Address;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, info};

use crate::types::RiskLevel;

fn default_min_liquidity_usd() -> f64 { 50_000.0 }
fn default_max_price_deviation() -> f64 { 0.1 }
fn default_danger_price_deviation() -> f64 { 0.5 }

// ---------------------------------------------------------------------------
// JSON structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegitimacyConfig {
    #[serde(default = "default_min_liquidity_usd")]
    pub min_liquidity_usd: f64,
    /// Absolute distance from anchor that raises a warning
    #[serde(default = "default_max_price_deviation")]
    pub max_price_deviation: f64,
    /// Absolute distance from anchor treated as a fake
    #[serde(default = "default_danger_price_deviation")]
    pub danger_price_deviation: f64,
    /// symbol → chain → official contract
    #[serde(default = "default_official_addresses")]
    pub official_addresses: HashMap<String, HashMap<String, String>>,
    /// chain → DEX names
    #[serde(default = "default_trusted_dexes")]
    pub trusted_dexes: HashMap<String, Vec<String>>,
}

impl Default for LegitimacyConfig {
    fn default() -> Self {
        Self {
            min_liquidity_usd: default_min_liquidity_usd(),
            max_price_deviation: default_max_price_deviation(),
            danger_price_deviation: default_danger_price_deviation(),
            official_addresses: default_official_addresses(),
            trusted_dexes: default_trusted_dexes(),
        }
    }
}

const OFFICIAL_ADDRESSES: &[(&str, &str, &str)] = &[
    ("USDT", "ethereum", "0xdac17f958d2ee523a2206206994597c13d831ec7"),
    ("USDT", "bsc", "0x55d398326f99059ff775485246999027b3197955"),
    ("USDT", "polygon", "0xc2132d05d31c914a87c6611c10748aeb04b58e8f"),
    ("USDT", "arbitrum", "0xfd086bc7cd5c481dcc9c85ebe478a1c0b69fcbb9"),
    ("USDT", "optimism", "0x94b008aa00579c1307b0ef2c499ad98a8ce58e58"),
    ("USDT", "base", "0xfde4c96c8593536e31f229ea8f37b2ada2699bb2"),
    ("USDT", "avalanche", "0x9702230a8ea53601f5cd2dc00fdbc13d4df4a8c7"),
    ("USDC", "ethereum", "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"),
    ("USDC", "bsc", "0x8ac76a51cc950d9822d68b83fe1ad97b32cd580d"),
    ("USDC", "polygon", "0x3c499c542cef5e3811e1192ce70d8cc03d5c3359"),
    ("USDC", "arbitrum", "0xaf88d065e77c8cc2239327c5edb3a432268e5831"),
    ("USDC", "optimism", "0x0b2c639c533813f4aa9d7837caf62653d097ff85"),
    ("USDC", "base", "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913"),
    ("USDC", "avalanche", "0xb97ef9ef8734c71904d8002f8b6bc66dd9c48a6e"),
    ("DAI", "ethereum", "0x6b175474e89094c44da98b954eedeac495271d0f"),
    ("DAI", "polygon", "0x8f3cf7ad23cd3cadbd9735aff958023239c6a063"),
    ("DAI", "arbitrum", "0xda10009cbd5d07dd0cecc66161fc93d7c9000da1"),
    ("DAI", "optimism", "0xda10009cbd5d07dd0cecc66161fc93d7c9000da1"),
    ("DAI", "base", "0x50c5725949a6f0c72e6c4a641f24049a917db0cb"),
];

const TRUSTED_DEXES: &[(&str, &[&str])] = &[
    ("ethereum", &["Uniswap V2", "Uniswap V3", "SushiSwap", "Curve", "Balancer"]),
    ("bsc", &["PancakeSwap V2", "PancakeSwap V3", "Biswap", "ApeSwap", "THENA"]),
    ("polygon", &["Uniswap V3", "QuickSwap", "SushiSwap", "Curve", "Balancer"]),
    ("arbitrum", &["Uniswap V3", "SushiSwap", "Curve", "Camelot", "Balancer"]),
    ("optimism", &["Uniswap V3", "Velodrome", "Curve", "Balancer"]),
    ("base", &["Uniswap V3", "Aerodrome", "SushiSwap", "Curve", "BaseSwap"]),
    ("avalanche", &["Trader Joe", "Pangolin", "Curve", "SushiSwap"]),
];

fn default_official_addresses() -> HashMap<String, HashMap<String, String>> {
    let mut table: HashMap<String, HashMap<String, String>> = HashMap::new();
    for (symbol, chain, address) in OFFICIAL_ADDRESSES {
        table
            .entry(symbol.to_string())
            .or_default()
            .insert(chain.to_string(), address.to_string());
    }
    table
}

fn default_trusted_dexes() -> HashMap<String, Vec<String>> {
    TRUSTED_DEXES
        .iter()
        .map(|(chain, dexes)| (chain.to_string(), dexes.iter().map(|d| d.to_string()).collect()))
        .collect()
}

// ---------------------------------------------------------------------------
// Checker
// ---------------------------------------------------------------------------

/// What the checker needs to know about one pool side
#[derive(Debug, Clone, Copy)]
pub struct PairProfile<'a> {
    pub chain: &'a str,
    /// (symbol, address) for both pool tokens
    pub tokens: [(&'a str, &'a str); 2],
    pub venue: Option<&'a str>,
    pub liquidity_usd: Option<f64>,
    /// Price of the side being judged
    pub price_usd: Option<f64>,
    pub anchor_price: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegitimacyReport {
    pub risk: RiskLevel,
    pub warnings: Vec<String>,
    /// Informational only; never raise the risk level
    pub notes: Vec<String>,
}

impl LegitimacyReport {
    pub fn is_legitimate(&self) -> bool {
        self.risk != RiskLevel::Danger
    }

    fn raise(&mut self, risk: RiskLevel, warning: String) {
        self.risk = self.risk.max(risk);
        self.warnings.push(warning);
    }
}

pub struct TokenLegitimacyChecker {
    /// (SYMBOL, chain) → normalized official address
    official: HashMap<(String, String), String>,
    /// chain → normalized DEX names
    trusted: HashMap<String, Vec<String>>,
    min_liquidity_usd: f64,
    max_price_deviation: f64,
    danger_price_deviation: f64,
}

impl TokenLegitimacyChecker {
    /// Load tables from a JSON file.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read legitimacy file: {}", path))?;
        let config: LegitimacyConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse legitimacy JSON: {}", path))?;
        Ok(Self::from_config(config))
    }

    pub fn from_config(config: LegitimacyConfig) -> Self {
        let official: HashMap<(String, String), String> = config
            .official_addresses
            .iter()
            .flat_map(|(symbol, chains)| {
                chains.iter().map(move |(chain, address)| {
                    ((symbol.to_uppercase(), chain.to_lowercase()), normalize_addr(address))
                })
            })
            .collect();

        let trusted: HashMap<String, Vec<String>> = config
            .trusted_dexes
            .iter()
            .map(|(chain, dexes)| (chain.to_lowercase(), dexes.iter().map(|d| normalize_dex(d)).collect()))
            .collect();

        info!(
            "Legitimacy tables loaded: {} official addresses, {} chains with trusted DEXes, min liquidity ${:.0}",
            official.len(),
            trusted.len(),
            config.min_liquidity_usd,
        );

        Self {
            official,
            trusted,
            min_liquidity_usd: config.min_liquidity_usd,
            max_price_deviation: config.max_price_deviation,
            danger_price_deviation: config.danger_price_deviation,
        }
    }

    pub fn check(&self, profile: &PairProfile) -> LegitimacyReport {
        let chain = profile.chain.to_lowercase();
        let mut report = LegitimacyReport::default();

        // 1. Liquidity
        match profile.liquidity_usd {
            Some(liq) if liq < self.min_liquidity_usd => report.raise(
                RiskLevel::Warning,
                format!("low liquidity: ${:.0} < ${:.0}", liq, self.min_liquidity_usd),
            ),
            Some(_) => {}
            None => report.raise(RiskLevel::Warning, "liquidity unknown".to_string()),
        }

        // 2. Price sanity
        if let Some(price) = profile.price_usd {
            let distance = (price - profile.anchor_price).abs();
            if distance > self.danger_price_deviation {
                report.raise(
                    RiskLevel::Danger,
                    format!("price ${:.4} is {:.4} from anchor", price, distance),
                );
            } else if distance > self.max_price_deviation {
                report.raise(
                    RiskLevel::Warning,
                    format!("price ${:.4} is {:.4} from anchor", price, distance),
                );
            }
        }

        // 3. Official contracts
        for (symbol, address) in profile.tokens {
            let symbol = symbol.to_uppercase();
            match self.official.get(&(symbol.clone(), chain.clone())) {
                Some(official) if *official != normalize_addr(address) => report.raise(
                    RiskLevel::Danger,
                    format!("{} on {} is not the official contract ({} != {})", symbol, chain, address, official),
                ),
                Some(_) => {}
                None => report
                    .notes
                    .push(format!("{} on {} has no official address to verify against", symbol, chain)),
            }
        }

        // 4. Venue
        if let (Some(venue), Some(trusted)) = (profile.venue.filter(|v| !v.is_empty()), self.trusted.get(&chain)) {
            let venue_norm = normalize_dex(venue);
            let known = trusted
                .iter()
                .any(|t| t.starts_with(&venue_norm) || venue_norm.starts_with(t.as_str()));
            if !known {
                report.raise(RiskLevel::Warning, format!("untrusted DEX: {}", venue));
            }
        }

        if report.risk != RiskLevel::Safe {
            let [(base, _), (quote, _)] = profile.tokens;
            debug!(
                "Legitimacy: {}/{} on {} rated {}: {}",
                base,
                quote,
                chain,
                report.risk,
                report.warnings.join("; ")
            );
        }
        report
    }
}

impl Default for TokenLegitimacyChecker {
    fn default() -> Self {
        Self::from_config(LegitimacyConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// EVM addresses are compared as parsed; anything else lowercase.
fn normalize_addr(s: &str) -> String {
    let s = s.trim();
    match Address::from_str(s) {
        Ok(addr) => addr.to_string().to_lowercase(),
        Err(_) => s.to_lowercase(),
    }
}

/// "PancakeSwap V3" and dexId "pancakeswap" both reduce to alphanumerics.
fn normalize_dex(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BSC_USDT: &str = "0x55d398326f99059ff775485246999027b3197955";
    const BSC_USDC: &str = "0x8ac76a51cc950d9822d68b83fe1ad97b32cd580d";

    fn profile<'a>(tokens: [(&'a str, &'a str); 2], venue: &'a str, liq: Option<f64>, price: f64) -> PairProfile<'a> {
        PairProfile {
            chain: "bsc",
            tokens,
            venue: Some(venue),
            liquidity_usd: liq,
            price_usd: Some(price),
            anchor_price: 1.0,
        }
    }

    #[test]
    fn test_official_pair_is_safe() {
        let checker = TokenLegitimacyChecker::default();
        let report = checker.check(&profile(
            [("USDT", BSC_USDT), ("USDC", BSC_USDC)],
            "pancakeswap",
            Some(2_000_000.0),
            0.999,
        ));
        assert_eq!(report.risk, RiskLevel::Safe, "{:?}", report.warnings);
        assert!(report.is_legitimate());
    }

    #[test]
    fn test_checksummed_address_matches() {
        let checker = TokenLegitimacyChecker::default();
        let report = checker.check(&profile(
            [("USDT", "0x55d398326f99059fF775485246999027B3197955"), ("USDC", BSC_USDC)],
            "PancakeSwap V3",
            Some(2_000_000.0),
            1.0,
        ));
        assert_eq!(report.risk, RiskLevel::Safe);
    }

    #[test]
    fn test_address_mismatch_is_danger() {
        let checker = TokenLegitimacyChecker::default();
        let report = checker.check(&profile(
            [("USDT", "0x000000000000000000000000000000000000dead"), ("USDC", BSC_USDC)],
            "pancakeswap",
            Some(2_000_000.0),
            1.0,
        ));
        assert_eq!(report.risk, RiskLevel::Danger);
        assert!(!report.is_legitimate());
    }

    #[test]
    fn test_unverifiable_symbol_is_note_only() {
        let checker = TokenLegitimacyChecker::default();
        let report = checker.check(&profile(
            [("FDUSD", "0xc5f0f7b66764f6ec8c8dff7ba683102295e16409"), ("USDT", BSC_USDT)],
            "pancakeswap",
            Some(2_000_000.0),
            1.0,
        ));
        assert_eq!(report.risk, RiskLevel::Safe);
        assert_eq!(report.notes.len(), 1);
        assert!(report.notes[0].contains("FDUSD"));
    }

    #[test]
    fn test_warnings() {
        let checker = TokenLegitimacyChecker::default();

        let thin = checker.check(&profile([("USDT", BSC_USDT), ("USDC", BSC_USDC)], "pancakeswap", Some(10_000.0), 1.0));
        assert_eq!(thin.risk, RiskLevel::Warning);

        let unknown_liq = checker.check(&profile([("USDT", BSC_USDT), ("USDC", BSC_USDC)], "pancakeswap", None, 1.0));
        assert_eq!(unknown_liq.risk, RiskLevel::Warning);

        let odd_dex = checker.check(&profile([("USDT", BSC_USDT), ("USDC", BSC_USDC)], "shadyswap", Some(2_000_000.0), 1.0));
        assert_eq!(odd_dex.risk, RiskLevel::Warning);

        let off_peg = checker.check(&profile([("USDT", BSC_USDT), ("USDC", BSC_USDC)], "pancakeswap", Some(2_000_000.0), 0.85));
        assert_eq!(off_peg.risk, RiskLevel::Warning);
    }

    #[test]
    fn test_far_price_is_danger() {
        let checker = TokenLegitimacyChecker::default();
        let report = checker.check(&profile([("USDT", BSC_USDT), ("USDC", BSC_USDC)], "pancakeswap", Some(2_000_000.0), 0.3));
        assert_eq!(report.risk, RiskLevel::Danger);
    }

    #[test]
    fn test_json_override() {
        let json = r#"{
            "min_liquidity_usd": 1000,
            "official_addresses": {"USDT": {"bsc": "0x000000000000000000000000000000000000dead"}},
            "trusted_dexes": {"bsc": ["ShadySwap"]}
        }"#;
        let config: LegitimacyConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.max_price_deviation, 0.1);
        let checker = TokenLegitimacyChecker::from_config(config);

        let report = checker.check(&profile(
            [("USDT", "0x000000000000000000000000000000000000dEaD"), ("XYZ", "0x01")],
            "shadyswap",
            Some(5_000.0),
            1.0,
        ));
        assert_eq!(report.risk, RiskLevel::Safe, "{:?}", report.warnings);
    }
}
