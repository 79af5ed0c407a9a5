//! Monitor Loop
//!
//! One cycle:
//!   1. Collect price records for every configured pool
//!   2. Log each record (warn for depegs)
//!   3. Depeg alerts on normal → alert transitions, with a global cross-check
//!   4. Scan for cross-chain opportunities
//!   5. Log every opportunity, alert each cheap→rich key at most once per cooldown
//!   6. Daily heartbeat
//!
//! `run` repeats this on the poll interval. A reload request swaps in a
//! freshly loaded config; alert state (edge triggers, cooldowns, heartbeat
//! day) survives the swap. With discovery enabled, searched pools are merged
//! into the monitored set at startup and after every successful reload.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use super::alerts::{DepegTracker, HeartbeatSchedule};
use super::collector::StatusCollector;
use super::crosscheck;
use super::discovery::{merge_pairs, DiscoveryStats, PairDiscovery};
use crate::arbitrage::{AlertCooldown, ArbitrageScanner, QuoteRefiner};
use crate::config::MonitorConfig;
use crate::filters::TokenLegitimacyChecker;
use crate::http::{ReqwestTransport, ResilientFetcher, TokenBucket};
use crate::notify::format::{self, GlobalReference, HeartbeatStats};
use crate::notify::{DailyQuota, DiscordNotifier, Notifier, NotifierSet, TelegramNotifier};
use crate::oracle::{CoinGeckoClient, DexScreenerClient, LifiClient, ReferencePriceSource};
use crate::types::{ArbitrageOpportunity, PairConfig, PriceRecord};

/// Outcome of one cycle
#[derive(Debug, Default)]
pub struct CycleReport {
    pub records: Vec<PriceRecord>,
    pub opportunities: Vec<ArbitrageOpportunity>,
    pub depeg_alerts: usize,
    pub arb_alerts: usize,
    pub heartbeat_sent: bool,
}

impl CycleReport {
    pub fn alerting_records(&self) -> usize {
        self.records.iter().filter(|r| r.is_alert).count()
    }
}

/// Everything rebuilt from a config
struct Components {
    collector: StatusCollector,
    scanner: ArbitrageScanner,
    reference: Option<Arc<dyn ReferencePriceSource>>,
    notifiers: NotifierSet,
    discovery: Option<PairDiscovery>,
}

pub struct Monitor {
    config: MonitorConfig,
    collector: StatusCollector,
    scanner: ArbitrageScanner,
    reference: Option<Arc<dyn ReferencePriceSource>>,
    notifiers: NotifierSet,
    discovery: Option<PairDiscovery>,
    depeg: DepegTracker,
    cooldown: AlertCooldown,
    heartbeat: HeartbeatSchedule,
    arb_alerts_total: u64,
    cycles: u64,
}

impl Monitor {
    /// Wire production clients from `config`.
    pub fn from_config(config: MonitorConfig) -> Result<Self> {
        let parts = build_components(&config)?;
        let monitor = Self::with_parts(
            config,
            parts.collector,
            parts.scanner,
            parts.reference,
            parts.notifiers,
        );
        Ok(match parts.discovery {
            Some(discovery) => monitor.with_discovery(discovery),
            None => monitor,
        })
    }

    /// Assemble from explicit parts (fakes in tests).
    pub fn with_parts(
        config: MonitorConfig,
        collector: StatusCollector,
        scanner: ArbitrageScanner,
        reference: Option<Arc<dyn ReferencePriceSource>>,
        notifiers: NotifierSet,
    ) -> Self {
        let cooldown = AlertCooldown::new(config.arb_cooldown());
        let heartbeat = HeartbeatSchedule::new(config.notify.utc_offset_hours, config.notify.heartbeat_hour);
        Self {
            config,
            collector,
            scanner,
            reference,
            notifiers,
            discovery: None,
            depeg: DepegTracker::new(),
            cooldown,
            heartbeat,
            arb_alerts_total: 0,
            cycles: 0,
        }
    }

    pub fn with_discovery(mut self, discovery: PairDiscovery) -> Self {
        self.discovery = Some(discovery);
        self
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Run discovery (if configured) and monitor every pool not already listed.
    /// Returns the added pairs and the run's stats.
    pub async fn discover_pairs(&mut self) -> Option<(Vec<PairConfig>, DiscoveryStats)> {
        let discovery = self.discovery.as_ref()?;
        let (found, stats) = discovery.discover().await;
        let added = merge_pairs(&mut self.config.pairs, &found);
        for pair in &added {
            info!("  + {} on {} (pool {})", pair.asset_name, pair.chain, pair.pool);
        }
        info!(
            "Discovery added {} new pairs, now monitoring {}",
            added.len(),
            self.config.pairs.len()
        );
        Some((added, stats))
    }

    /// Swap in a new config. On error the current config stays active.
    pub fn replace_config(&mut self, config: MonitorConfig) -> Result<()> {
        let parts = build_components(&config)?;
        self.collector = parts.collector;
        self.scanner = parts.scanner;
        self.reference = parts.reference;
        self.notifiers = parts.notifiers;
        self.discovery = parts.discovery;
        self.cooldown.set_window(config.arb_cooldown());
        self.heartbeat = HeartbeatSchedule::new(config.notify.utc_offset_hours, config.notify.heartbeat_hour)
            .carry_over(&self.heartbeat);
        info!("Configuration applied: {} pairs", config.pairs.len());
        self.config = config;
        Ok(())
    }

    pub async fn run_cycle(&mut self) -> CycleReport {
        self.run_cycle_at(Utc::now()).await
    }

    /// One cycle with an explicit wall clock (heartbeat timing).
    pub async fn run_cycle_at(&mut self, now: DateTime<Utc>) -> CycleReport {
        self.cycles += 1;
        let mut report = CycleReport::default();

        info!("{}", "-".repeat(80));
        info!(
            "Cycle #{} at {}",
            self.cycles,
            self.heartbeat.local_time(now).format("%Y-%m-%d %H:%M:%S %:z")
        );

        // 1. Collect
        report.records = self
            .collector
            .collect(&self.config.pairs, self.config.global_threshold())
            .await;
        if report.records.is_empty() {
            warn!("No price data this cycle - check the pair config or network");
        }

        // 2-3. Log + depeg alerts
        for record in &report.records {
            log_record(record);
        }
        let fresh: Vec<&PriceRecord> = report.records.iter().filter(|r| self.depeg.observe(r)).collect();
        for record in fresh {
            let text = self.depeg_text(record).await;
            self.notifiers.broadcast(&text).await;
            report.depeg_alerts += 1;
        }

        // 4. Scan
        let costs = &self.config.costs;
        report.opportunities = self
            .scanner
            .scan(&report.records, costs.trade_size_usd, costs, &self.config.floors)
            .await;

        // 5. Log + debounced arbitrage alerts
        if report.opportunities.is_empty() {
            info!("No cross-chain opportunity above the floors");
        } else {
            info!("🎯 {} cross-chain opportunities:", report.opportunities.len());
        }
        for opp in &report.opportunities {
            info!("💰 {}", opp);
            if self.cooldown.try_claim(&opp.alert_key()) {
                self.notifiers.broadcast(&format::arbitrage_alert(opp)).await;
                report.arb_alerts += 1;
                self.arb_alerts_total += 1;
            }
        }
        self.cooldown.cleanup();

        // 6. Heartbeat
        if self.heartbeat.is_due(now) {
            info!("⏰ Daily heartbeat due, sending...");
            let stats = HeartbeatStats {
                local_time: self.heartbeat.local_time(now).format("%Y-%m-%d %H:%M:%S %:z").to_string(),
                records: &report.records,
                depeg_alerts_total: self.depeg.fired(),
                arb_alerts_total: self.arb_alerts_total,
                channels: self.notifiers.names().into_iter().map(String::from).collect(),
            };
            let delivered = self.notifiers.broadcast(&format::heartbeat(&stats)).await;
            if !delivered {
                warn!("Heartbeat was not delivered on any channel");
            }
            // One attempt per day either way
            self.heartbeat.mark_sent(now);
            report.heartbeat_sent = true;
        }

        report
    }

    async fn depeg_text(&self, record: &PriceRecord) -> String {
        let reference = match &self.reference {
            Some(reference) => reference,
            None => return format::depeg_alert(record, None, None),
        };

        let main = record.asset_name.to_uppercase();
        let mut symbols = vec![main.clone()];
        if let Some(counter) = &record.counter_asset_name {
            symbols.push(counter.to_uppercase());
        }
        let cg_prices = reference.reference_prices(&symbols).await;

        let global = cg_prices.get(&main).map(|price| GlobalReference {
            symbol: main.clone(),
            price_usd: *price,
        });
        if let Some(gap) = crosscheck::global_deviation(record, &cg_prices) {
            debug!("{} on {}: {:+.3}% vs global reference", record.asset_name, record.chain, gap);
        }
        let suspect = crosscheck::suspect_side(record, &cg_prices);
        format::depeg_alert(record, global.as_ref(), suspect.as_deref())
    }

    /// Loop until Ctrl-C. `reload` is polled between cycles; when set, the
    /// config at `config_path` is reloaded.
    pub async fn run(&mut self, reload: &AtomicBool, config_path: &Path) -> Result<()> {
        info!(
            "Monitoring {} pairs every {}s",
            self.config.pairs.len(),
            self.config.general.poll_interval_secs
        );
        self.discover_pairs().await;

        loop {
            if reload.swap(false, Ordering::SeqCst) && self.reload(config_path) {
                self.discover_pairs().await;
            }

            let started = Instant::now();
            let report = self.run_cycle().await;
            debug!(
                "Cycle done in {:.2}s: {} records, {} depegged, {} opportunities",
                started.elapsed().as_secs_f64(),
                report.records.len(),
                report.alerting_records(),
                report.opportunities.len()
            );

            let pause = self
                .config
                .poll_interval()
                .saturating_sub(started.elapsed())
                .max(Duration::from_secs(1));
            tokio::select! {
                _ = sleep(pause) => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl-C, stopping monitor");
                    return Ok(());
                }
            }
        }
    }

    /// Returns whether the new config was applied.
    fn reload(&mut self, config_path: &Path) -> bool {
        info!("Reloading configuration from {}", config_path.display());
        let result = MonitorConfig::load(config_path).and_then(|config| self.replace_config(config));
        match result {
            Ok(()) => true,
            Err(e) => {
                error!("Config reload failed, keeping previous config: {:#}", e);
                false
            }
        }
    }
}

fn log_record(record: &PriceRecord) {
    let line = format!(
        "{:15} | chain: {:10} | price: {:.6} USD | deviation: {:+.3}% | threshold: ±{:.3}% | {}",
        record.asset_name,
        record.chain,
        record.price_usd,
        record.deviation_pct,
        record.threshold,
        if record.is_alert { "⚠️ DEPEG" } else { "✅ OK" }
    );
    if record.is_alert {
        warn!("{}", line);
    } else {
        info!("{}", line);
    }
}

fn build_components(config: &MonitorConfig) -> Result<Components> {
    let transport = Arc::new(
        ReqwestTransport::new(config.http.timeout()).context("Failed to build HTTP client")?,
    );
    let ttls = config.cache.ttls();
    let fetcher_for = |name: &str| {
        Arc::new(ResilientFetcher::new(
            transport.clone(),
            Arc::new(TokenBucket::new(name, config.http.requests_per_second, config.http.burst)),
            config.http.retry_policy(),
        ))
    };

    // Legitimacy
    let legitimacy = if config.legitimacy.enabled {
        let checker = match &config.legitimacy.file {
            Some(path) => TokenLegitimacyChecker::load(path)?,
            None => TokenLegitimacyChecker::default(),
        };
        Some(Arc::new(checker))
    } else {
        info!("Legitimacy checks disabled");
        None
    };

    let dexscreener = Arc::new(
        DexScreenerClient::new(fetcher_for("dexscreener"), ttls.pool_price).with_search_ttl(ttls.default),
    );
    let mut collector = StatusCollector::new(dexscreener.clone(), config.collector.clone());
    if let Some(checker) = &legitimacy {
        collector = collector.with_legitimacy(checker.clone());
    }

    // Discovery shares the DexScreener client, so its limiter and cache too
    let discovery = config.discovery.enabled.then(|| {
        let limiter = dexscreener.fetcher().limiter().clone();
        let mut discovery = PairDiscovery::new(dexscreener.clone(), config.discovery.clone()).with_limiter(limiter);
        if let Some(checker) = &legitimacy {
            discovery = discovery.with_legitimacy(checker.clone());
        }
        discovery
    });

    let reference: Arc<dyn ReferencePriceSource> =
        Arc::new(CoinGeckoClient::new(fetcher_for("coingecko"), ttls.global_reference));

    let mut scanner = ArbitrageScanner::new();
    if config.quote.enabled {
        let lifi = LifiClient::new(fetcher_for("lifi"), ttls)
            .with_base_url(config.quote.base_url.clone())
            .with_api_key(config.quote.api_key.clone())
            .with_native_token_usd(config.quote.native_token_usd);
        if config.quote.from_address.is_none() {
            warn!("quote.from_address not set - opportunities will not be refined with live quotes");
        }
        scanner = scanner.with_refiner(QuoteRefiner::new(Arc::new(lifi), config.quote.from_address.clone()));
    }

    Ok(Components {
        collector,
        scanner,
        reference: Some(reference),
        notifiers: build_notifiers(config),
        discovery,
    })
}

fn build_notifiers(config: &MonitorConfig) -> NotifierSet {
    let notify = &config.notify;
    let timeout = Duration::from_secs(notify.timeout_secs);
    let mut set = NotifierSet::new();

    let telegram = TelegramNotifier::new(
        notify.telegram_bot_token.as_deref().unwrap_or_default(),
        notify.telegram_chat_id.as_deref().unwrap_or_default(),
        timeout,
    );
    if let Some(channel) = telegram {
        set = set.with(capped(channel, notify.daily_quota));
    }
    if let Some(channel) = DiscordNotifier::new(notify.discord_webhook.as_deref().unwrap_or_default(), timeout) {
        set = set.with(capped(channel, notify.daily_quota));
    }

    if set.is_empty() {
        warn!("No notification channel configured - alerts go to the log only");
    }
    set
}

fn capped<N: Notifier + 'static>(channel: N, quota: Option<u32>) -> Arc<dyn Notifier> {
    match quota {
        Some(limit) => Arc::new(DailyQuota::new(channel, limit)),
        None => Arc::new(channel),
    }
}
