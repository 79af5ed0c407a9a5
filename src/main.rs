//! Stablecoin Depeg Monitor
//!
//! Polls the configured pools, logs every price, alerts on depegs and on
//! cross-chain arbitrage windows that clear the profit floors.
//!
//! Supports hot-reloading via SIGHUP signal:
//!   kill -HUP $(pgrep pegarb-bot)
//!
//! Usage:
//!   cargo run -- --config config/pegarb.toml
//!   cargo run -- --once --json-logs
//!   cargo run -- --discover

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use pegarb_bot::{Monitor, MonitorConfig, PairConfig};
use serde::Serialize;
use signal_hook::consts::SIGHUP;
use signal_hook_tokio::Signals;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Reload flag - set by SIGHUP handler
static RELOAD_FLAG: AtomicBool = AtomicBool::new(false);

/// Stablecoin depeg monitor and cross-chain arbitrage estimator
#[derive(Parser)]
#[command(name = "pegarb-bot", version)]
struct Args {
    /// TOML config file
    #[arg(short, long, env = "PEGARB_CONFIG", default_value = "config/pegarb.toml")]
    config: PathBuf,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Emit JSON log lines
    #[arg(long)]
    json_logs: bool,

    /// Search DexScreener for stable/stable pools, print new ones as [[pair]] TOML and exit
    #[arg(long)]
    discover: bool,
}

/// `[[pair]]` array for printing discovered pools
#[derive(Serialize)]
struct PairList<'a> {
    pair: &'a [PairConfig],
}

fn init_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    if json {
        fmt().json().with_env_filter(filter).init();
    } else {
        fmt().with_env_filter(filter).with_target(false).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = MonitorConfig::load(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;
    init_logging(&config.general.log_level, args.json_logs);

    info!("===========================================");
    info!("   Stablecoin Depeg & Cross-Chain Monitor");
    info!("===========================================");
    info!("Config file: {}", args.config.display());
    info!("Pairs: {}", config.pairs.len());
    for pair in &config.pairs {
        info!(
            "  - {} on {} (pool {}, anchor {:.4}, threshold ±{:.3}%)",
            pair.asset_name, pair.chain, pair.pool, pair.anchor_price, pair.deviation_threshold
        );
    }
    info!(
        "Trade size ${:.0} | floors: spread {:.2}% / profit ${:.2} / margin {:.2}%",
        config.costs.trade_size_usd,
        config.floors.min_spread_pct,
        config.floors.min_profit_usd,
        config.floors.min_margin_pct
    );

    if args.discover {
        config.discovery.enabled = true;
    }
    let mut monitor = Monitor::from_config(config)?;

    if args.discover {
        if let Some((added, stats)) = monitor.discover_pairs().await {
            info!(
                "Discovery: {} symbols, {} requests, {} throttled, {} failed queries",
                stats.total_symbols, stats.requests_made, stats.rate_limited_count, stats.errors
            );
            println!("{}", toml::to_string(&PairList { pair: &added })?);
        }
        return Ok(());
    }

    if args.once {
        monitor.discover_pairs().await;
        let report = monitor.run_cycle().await;
        info!(
            "Single cycle: {} records, {} depegged, {} opportunities",
            report.records.len(),
            report.alerting_records(),
            report.opportunities.len()
        );
        return Ok(());
    }

    // Set up SIGHUP handler
    let mut signals = Signals::new([SIGHUP])?;
    tokio::spawn(async move {
        while let Some(sig) = signals.next().await {
            if sig == SIGHUP {
                info!("Received SIGHUP - flagging config reload");
                RELOAD_FLAG.store(true, Ordering::SeqCst);
            }
        }
    });

    monitor.run(&RELOAD_FLAG, &args.config).await
}
