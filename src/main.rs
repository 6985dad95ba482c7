//! CDP Watch - Main Entry Point

use anyhow::Result;
use cdp_watch::cdp::{normalize_snapshot, AnalyticsClient, SnapshotSource};
use cdp_watch::config::{Config, LoggingConfig};
use cdp_watch::engine::DiffEngine;
use cdp_watch::notify::{
    DiscordWebhook, FormatContext, LogSink, NotificationFormatter, NotificationSink,
};
use cdp_watch::risk::{RiskClassifier, RiskState};
use cdp_watch::scheduler::{preview_window, Scheduler};
use cdp_watch::utils::decimal::group_thousands;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::{self, format::FmtSpan};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// CDP Watch CLI
#[derive(Parser)]
#[command(name = "cdp-watch")]
#[command(version, about = "Indigo CDP change and liquidation alerts for Discord")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the events between a past snapshot and now, without sending
    Replay {
        /// How far back the earlier snapshot is taken
        #[arg(short, long, default_value = "60")]
        minutes: i64,
    },

    /// Fetch once and summarize validation and risk
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load()?;
    let _log_guard = init_logging(&config.logging)?;

    match cli.command {
        Some(Commands::Replay { minutes }) => return run_replay(&config, minutes).await,
        Some(Commands::Check) => return run_check(&config).await,
        None => {}
    }

    config.validate()?;
    log_config(&config);

    info!("CDP Watch v{} starting", env!("CARGO_PKG_VERSION"));

    let source = AnalyticsClient::new(&config.source)?;
    let sink: Box<dyn NotificationSink> = if config.discord.dry_run {
        warn!("Dry run: notifications are logged, not posted");
        Box::new(LogSink)
    } else {
        Box::new(DiscordWebhook::new(&config.discord)?)
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutdown signal received");
        shutdown_tx.send(true).ok();
    });

    let mut scheduler = Scheduler::new(source, sink, &config);
    scheduler.run(shutdown_rx).await?;

    info!("CDP Watch shutdown complete");
    Ok(())
}

/// Preview what would have been announced over a time window.
async fn run_replay(config: &Config, minutes: i64) -> Result<()> {
    let source = AnalyticsClient::new(&config.source)?;
    let engine = DiffEngine::new(RiskClassifier::new(&config.risk));
    let formatter = NotificationFormatter::new().without_links();

    let (events, stats) = preview_window(&source, &engine, minutes).await?;
    let ctx = FormatContext::from_lovelace(stats.total_collateral);

    info!(
        minutes,
        opened = stats.opened,
        closed = stats.closed,
        liquidated = stats.liquidated,
        risk_changed = stats.risk_changed,
        "Replay complete"
    );

    for event in &events {
        println!("{}\n", formatter.format(event, &ctx));
    }
    if events.is_empty() {
        println!("No CDP events in the last {} minutes", minutes);
    }

    Ok(())
}

/// Fetch one snapshot and report how it validates and classifies.
async fn run_check(config: &Config) -> Result<()> {
    let source = AnalyticsClient::new(&config.source)?;
    let classifier = RiskClassifier::new(&config.risk);

    let records = source.fetch().await?;
    let normalized = normalize_snapshot(&records);

    println!("Records:  {}", records.len());
    println!("Valid:    {}", normalized.positions.len());
    println!("Skipped:  {}", normalized.skipped.len());
    for skipped in normalized.skipped.iter().take(10) {
        println!("  #{}: {}", skipped.index, skipped.error);
    }

    let mut by_state: BTreeMap<&'static str, usize> = BTreeMap::new();
    let mut tvl = Decimal::ZERO;
    for position in &normalized.positions {
        let risk = classifier.classify(position);
        *by_state.entry(risk.state.as_str()).or_default() += 1;
        tvl += position.collateral_ada();
    }

    println!("TVL:      {} ADA", group_thousands(tvl, 0));
    for state in [
        RiskState::Healthy,
        RiskState::AtRisk,
        RiskState::Liquidatable,
        RiskState::Unpriced,
        RiskState::Unminted,
    ] {
        println!(
            "{:<13} {}",
            format!("{}:", state),
            by_state.get(state.as_str()).copied().unwrap_or(0)
        );
    }

    Ok(())
}

/// Install the stdout and hourly-file log layers.
///
/// The returned guard flushes the file writer when dropped, so `main` holds it.
fn init_logging(config: &LoggingConfig) -> Result<WorkerGuard> {
    std::fs::create_dir_all(&config.dir)?;
    let appender = tracing_appender::rolling::hourly(&config.dir, "cdp-watch.log");
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"))
        .add_directive("cdp_watch=debug".parse()?)
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?);

    let stdout_json = config
        .json
        .then(|| fmt::layer().json().with_current_span(false));
    let stdout_text = (!config.json).then(|| {
        fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
    });
    let file = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_span_events(FmtSpan::CLOSE);

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_json)
        .with(stdout_text)
        .with(file)
        .init();

    Ok(guard)
}

/// Log configuration on startup.
fn log_config(config: &Config) {
    info!("Configuration:");
    info!("   Source: {}", config.source.base_url);
    info!("   Poll Interval: {}s", config.scheduler.poll_interval_secs);
    info!(
        "   Max Consecutive Failures: {}",
        config.scheduler.max_consecutive_failures
    );
    info!(
        "   Notify Floor: {} ADA",
        group_thousands(config.discord.min_notify_collateral_ada, 0)
    );
    info!("   Safety Margin: {}", config.risk.safety_margin);
    let prices = config.risk.price_table();
    let ratios: BTreeMap<_, _> = config.risk.ratio_table().into_iter().collect();
    for (asset, ratio) in &ratios {
        info!(
            "   {}: liquidation at {}, price {}",
            asset,
            ratio,
            prices.get(asset).map_or("-".to_string(), |p| p.to_string())
        );
    }
}
