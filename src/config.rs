//! TOML Configuration
//!
//! Reads the monitor configuration from a TOML file. Every field has a
//! default, so a file with only `[[pair]]` entries is valid. Secrets are
//! taken from the environment (a `.env` file is honoured) and override the
//! file: `LIFI_API_KEY`, `LIFI_FROM_ADDRESS`, `TELEGRAM_BOT_TOKEN`,
//! `TELEGRAM_CHAT_ID`, `DISCORD_WEBHOOK`.
//!
//! Reloaded on SIGHUP by the binary.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::arbitrage::{CostParams, ProfitFloors};
use crate::http::{CacheTtls, RetryPolicy};
use crate::monitor::{CollectorSettings, DiscoverySettings};
use crate::oracle::dexscreener::parse_pool_input;
use crate::oracle::lifi::LIFI_API;
use crate::types::PairConfig;

/// Top-level TOML configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub collector: CollectorSettings,
    #[serde(default)]
    pub costs: CostParams,
    #[serde(default)]
    pub floors: ProfitFloors,
    #[serde(default)]
    pub quote: QuoteConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub legitimacy: LegitimacySection,
    #[serde(default)]
    pub discovery: DiscoverySettings,
    #[serde(rename = "pair", default)]
    pub pairs: Vec<PairConfig>,
}

/// General settings
#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Overrides every pair's own threshold when > 0; 0 keeps per-pair thresholds
    #[serde(default = "default_global_threshold")]
    pub global_threshold_pct: Option<f64>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_poll_interval() -> u64 { 30 }
fn default_global_threshold() -> Option<f64> { Some(0.5) }
fn default_log_level() -> String { "info".to_string() }

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            global_threshold_pct: default_global_threshold(),
            log_level: default_log_level(),
        }
    }
}

/// Limiter and retry settings, applied to each upstream separately
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,
    #[serde(default = "default_burst")]
    pub burst: u32,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
    #[serde(default = "default_throttle_base_delay")]
    pub throttle_base_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: u64,
}

fn default_requests_per_second() -> f64 { 4.0 }
fn default_burst() -> u32 { 10 }
fn default_timeout() -> u64 { 10 }
fn default_max_retries() -> u32 { 3 }
fn default_base_delay() -> u64 { 1000 }
fn default_throttle_base_delay() -> u64 { 5000 }
fn default_max_delay() -> u64 { 60 }

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_requests_per_second(),
            burst: default_burst(),
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay(),
            throttle_base_delay_ms: default_throttle_base_delay(),
            max_delay_secs: default_max_delay(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            throttle_base_delay: Duration::from_millis(self.throttle_base_delay_ms),
            max_delay: Duration::from_secs(self.max_delay_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_pool_price_ttl")]
    pub pool_price_ttl_secs: u64,
    #[serde(default = "default_gas_ttl")]
    pub gas_ttl_secs: u64,
    #[serde(default = "default_global_ttl")]
    pub global_ttl_secs: u64,
    #[serde(default = "default_token_metadata_ttl")]
    pub token_metadata_ttl_secs: u64,
    #[serde(default = "default_default_ttl")]
    pub default_ttl_secs: u64,
}

fn default_pool_price_ttl() -> u64 { 5 }
fn default_gas_ttl() -> u64 { 30 }
fn default_global_ttl() -> u64 { 60 }
fn default_token_metadata_ttl() -> u64 { 3600 }
fn default_default_ttl() -> u64 { 10 }

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            pool_price_ttl_secs: default_pool_price_ttl(),
            gas_ttl_secs: default_gas_ttl(),
            global_ttl_secs: default_global_ttl(),
            token_metadata_ttl_secs: default_token_metadata_ttl(),
            default_ttl_secs: default_default_ttl(),
        }
    }
}

impl CacheConfig {
    pub fn ttls(&self) -> CacheTtls {
        CacheTtls {
            pool_price: Duration::from_secs(self.pool_price_ttl_secs),
            gas: Duration::from_secs(self.gas_ttl_secs),
            global_reference: Duration::from_secs(self.global_ttl_secs),
            token_metadata: Duration::from_secs(self.token_metadata_ttl_secs),
            default: Duration::from_secs(self.default_ttl_secs),
        }
    }
}

/// Cross-chain quote refinement (LI.FI)
#[derive(Debug, Clone, Deserialize)]
pub struct QuoteConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_quote_base_url")]
    pub base_url: String,
    /// Address quoted as the sender; refinement is skipped without one
    #[serde(default)]
    pub from_address: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    /// USD price of the native gas token used by the gas-price fallback
    #[serde(default = "default_native_token_usd")]
    pub native_token_usd: f64,
}

fn default_true() -> bool { true }
fn default_quote_base_url() -> String { LIFI_API.to_string() }
fn default_native_token_usd() -> f64 { 2500.0 }

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            base_url: default_quote_base_url(),
            from_address: None,
            api_key: None,
            native_token_usd: default_native_token_usd(),
        }
    }
}

/// Notification channels and alert pacing
#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub telegram_bot_token: Option<String>,
    #[serde(default)]
    pub telegram_chat_id: Option<String>,
    #[serde(default)]
    pub discord_webhook: Option<String>,
    /// Same cheap->rich key is re-sent at most once per window
    #[serde(default = "default_arb_cooldown")]
    pub arb_cooldown_secs: u64,
    #[serde(default = "default_heartbeat_hour")]
    pub heartbeat_hour: u32,
    #[serde(default = "default_utc_offset")]
    pub utc_offset_hours: i32,
    /// Per-channel cap on sends per UTC day
    #[serde(default)]
    pub daily_quota: Option<u32>,
    #[serde(default = "default_notify_timeout")]
    pub timeout_secs: u64,
}

fn default_arb_cooldown() -> u64 { 300 }
fn default_heartbeat_hour() -> u32 { 12 }
fn default_utc_offset() -> i32 { 8 }
fn default_notify_timeout() -> u64 { 5 }

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            telegram_bot_token: None,
            telegram_chat_id: None,
            discord_webhook: None,
            arb_cooldown_secs: default_arb_cooldown(),
            heartbeat_hour: default_heartbeat_hour(),
            utc_offset_hours: default_utc_offset(),
            daily_quota: None,
            timeout_secs: default_notify_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LegitimacySection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// JSON override for the official-address and trusted-DEX tables
    #[serde(default)]
    pub file: Option<String>,
}

impl Default for LegitimacySection {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            file: None,
        }
    }
}

impl MonitorConfig {
    /// Load configuration from a TOML file, then apply environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        dotenv::dotenv().ok();

        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let mut config = Self::parse(&content)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML without touching the environment.
    pub fn parse(content: &str) -> Result<Self> {
        let mut config: Self =
            toml::from_str(content).with_context(|| "Failed to parse TOML configuration")?;
        config.normalize_pairs();
        Ok(config)
    }

    /// Overlay secrets from `lookup` (the process environment in production).
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("LIFI_API_KEY") {
            self.quote.api_key = Some(v);
        }
        if let Some(v) = get("LIFI_FROM_ADDRESS") {
            self.quote.from_address = Some(v);
        }
        if let Some(v) = get("TELEGRAM_BOT_TOKEN") {
            self.notify.telegram_bot_token = Some(v);
        }
        if let Some(v) = get("TELEGRAM_CHAT_ID") {
            self.notify.telegram_chat_id = Some(v);
        }
        if let Some(v) = get("DISCORD_WEBHOOK") {
            self.notify.discord_webhook = Some(v);
        }
    }

    /// Accept DexScreener URLs and `chain/pool` paths in `pool`.
    fn normalize_pairs(&mut self) {
        for pair in &mut self.pairs {
            if let Some((chain, pool)) = parse_pool_input(&pair.pool, &pair.chain) {
                pair.chain = chain.trim().to_lowercase();
                pair.pool = pool;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.general.poll_interval_secs == 0 {
            bail!("general.poll_interval_secs must be > 0");
        }
        if let Some(t) = self.general.global_threshold_pct {
            if t.is_nan() || t < 0.0 {
                bail!("general.global_threshold_pct must be >= 0 (got {})", t);
            }
        }
        if !(self.http.requests_per_second > 0.0) || self.http.burst == 0 {
            bail!("http.requests_per_second and http.burst must be > 0");
        }
        if !(self.costs.trade_size_usd > 0.0) {
            bail!("costs.trade_size_usd must be > 0");
        }
        if self.costs.slippage_pct < 0.0 || self.costs.slippage_pct >= 100.0 {
            bail!("costs.slippage_pct must be within [0, 100)");
        }
        if self.notify.heartbeat_hour > 23 {
            bail!("notify.heartbeat_hour must be 0-23");
        }
        if !(-12..=14).contains(&self.notify.utc_offset_hours) {
            bail!("notify.utc_offset_hours must be between -12 and 14");
        }

        for (i, pair) in self.pairs.iter().enumerate() {
            if pair.asset_name.trim().is_empty() || pair.chain.trim().is_empty() || pair.pool.trim().is_empty() {
                bail!("pair #{} needs asset_name, chain and pool", i + 1);
            }
            if !(pair.anchor_price > 0.0) {
                bail!("pair #{} ({}): anchor_price must be > 0", i + 1, pair.asset_name);
            }
            if !(pair.deviation_threshold > 0.0) {
                bail!("pair #{} ({}): deviation_threshold must be > 0", i + 1, pair.asset_name);
            }
        }
        if self.discovery.enabled {
            if !(self.discovery.min_liquidity_usd >= 0.0) || self.discovery.max_results_per_chain == 0 {
                bail!("discovery.min_liquidity_usd must be >= 0 and discovery.max_results_per_chain > 0");
            }
        } else if self.pairs.is_empty() {
            warn!("No [[pair]] entries configured - nothing to monitor");
        }
        Ok(())
    }

    /// Threshold applied to every pair, if any
    pub fn global_threshold(&self) -> Option<f64> {
        self.general.global_threshold_pct.filter(|t| *t > 0.0)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.general.poll_interval_secs)
    }

    pub fn arb_cooldown(&self) -> Duration {
        Duration::from_secs(self.notify.arb_cooldown_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SAMPLE: &str = r#"
        [general]
        poll_interval_secs = 60
        log_level = "debug"

        [http]
        requests_per_second = 2.5
        max_retries = 5

        [costs]
        trade_size_usd = 10000
        bridge_fee_usd = 3.5

        [floors]
        min_profit_usd = 20

        [quote]
        from_address = "0x1111111111111111111111111111111111111111"

        [notify]
        arb_cooldown_secs = 600
        daily_quota = 5

        [[pair]]
        asset_name = "USDT"
        chain = "bsc"
        pool = "0xpool1"

        [[pair]]
        name = "USDe"
        chain = "base"
        pair_address = "https://dexscreener.com/ethereum/0xPool2"
        threshold = 0.3
    "#;

    #[test]
    fn test_parse_toml() {
        let config = MonitorConfig::parse(SAMPLE).unwrap();
        config.validate().unwrap();

        assert_eq!(config.poll_interval(), Duration::from_secs(60));
        assert_eq!(config.global_threshold(), Some(0.5));
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.http.burst, 10);
        assert_eq!(config.http.retry_policy().max_retries, 5);
        assert_eq!(config.costs.trade_size_usd, 10000.0);
        assert_eq!(config.costs.src_gas_usd, 1.0);
        assert_eq!(config.costs.bridge_fee_usd, 3.5);
        assert_eq!(config.floors.min_profit_usd, 20.0);
        assert_eq!(config.floors.min_margin_pct, 2.0);
        assert!(config.quote.enabled);
        assert_eq!(config.quote.base_url, LIFI_API);
        assert_eq!(config.arb_cooldown(), Duration::from_secs(600));
        assert_eq!(config.notify.heartbeat_hour, 12);
        assert_eq!(config.notify.daily_quota, Some(5));
        assert!(config.legitimacy.enabled);

        assert_eq!(config.pairs.len(), 2);
        assert_eq!(config.pairs[0].pool, "0xpool1");
        assert_eq!(config.pairs[0].anchor_price, 1.0);
        // URL wins over the declared chain
        assert_eq!(config.pairs[1].chain, "ethereum");
        assert_eq!(config.pairs[1].pool, "0xPool2");
        assert_eq!(config.pairs[1].deviation_threshold, 0.3);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = MonitorConfig::parse("").unwrap();
        config.validate().unwrap();
        assert_eq!(config.general.poll_interval_secs, 30);
        assert_eq!(config.collector.sequential_cutoff, 5);
        assert_eq!(config.collector.max_workers, 5);
        assert_eq!(config.cache.ttls(), CacheTtls::default());
        assert_eq!(config.http.retry_policy(), RetryPolicy::default());
        assert_eq!(config.floors, ProfitFloors::default());
        assert_eq!(config.notify.utc_offset_hours, 8);
        assert!(config.pairs.is_empty());

        let per_pair = MonitorConfig::parse("[general]\nglobal_threshold_pct = 0").unwrap();
        per_pair.validate().unwrap();
        assert_eq!(per_pair.global_threshold(), None);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = MonitorConfig::parse(SAMPLE).unwrap();
        let env: HashMap<&str, &str> = HashMap::from([
            ("LIFI_API_KEY", "key-123"),
            ("LIFI_FROM_ADDRESS", "  "),
            ("TELEGRAM_BOT_TOKEN", "42:abc"),
            ("TELEGRAM_CHAT_ID", "-100"),
        ]);
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.quote.api_key.as_deref(), Some("key-123"));
        // Blank values do not clobber the file
        assert_eq!(
            config.quote.from_address.as_deref(),
            Some("0x1111111111111111111111111111111111111111")
        );
        assert_eq!(config.notify.telegram_bot_token.as_deref(), Some("42:abc"));
        assert_eq!(config.notify.telegram_chat_id.as_deref(), Some("-100"));
        assert_eq!(config.notify.discord_webhook, None);
    }

    #[test]
    fn test_validation_errors() {
        let bad_pair = r#"
            [[pair]]
            asset_name = "USDT"
            chain = "bsc"
            pool = "0xpool"
            anchor_price = 0
        "#;
        let err = MonitorConfig::parse(bad_pair).unwrap().validate().unwrap_err();
        assert!(err.to_string().contains("anchor_price"));

        let bad_hour = "[notify]\nheartbeat_hour = 24";
        assert!(MonitorConfig::parse(bad_hour).unwrap().validate().is_err());

        let bad_interval = "[general]\npoll_interval_secs = 0";
        assert!(MonitorConfig::parse(bad_interval).unwrap().validate().is_err());

        assert!(MonitorConfig::parse("[general\n").is_err());

        let bad_discovery = "[discovery]\nenabled = true\nmax_results_per_chain = 0";
        assert!(MonitorConfig::parse(bad_discovery).unwrap().validate().is_err());
    }

    #[test]
    fn test_discovery_section() {
        let config = MonitorConfig::parse(
            r#"
            [discovery]
            enabled = true
            symbols = ["usdt", "USDC"]
            chains = ["BSC", "base"]
            min_liquidity_usd = 25000
        "#,
        )
        .unwrap();
        config.validate().unwrap();
        assert!(config.discovery.enabled);
        assert_eq!(config.discovery.symbols(), vec!["USDT", "USDC"]);
        assert_eq!(config.discovery.chains(), vec!["bsc", "base"]);
        assert_eq!(config.discovery.min_liquidity_usd, 25_000.0);
        assert_eq!(config.discovery.max_results_per_chain, 5);

        assert!(!MonitorConfig::parse("").unwrap().discovery.enabled);
    }

    #[test]
    fn test_load_missing_file() {
        let err = MonitorConfig::load("/nonexistent/pegarb.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
