//! Configuration management for the CDP watcher.
//!
//! Loads settings from an optional `config` file and `CDPW__`-prefixed
//! environment variables (e.g. `CDPW__DISCORD__WEBHOOK_URL`).

use crate::notify::DISCORD_WEBHOOK_PREFIX;
use crate::risk::asset_key;
use anyhow::{Context, Result};
use config::builder::DefaultState;
use config::ConfigBuilder;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Snapshot source (Indigo analytics API)
    #[serde(default)]
    pub source: SourceConfig,
    /// Discord webhook and notification policy
    #[serde(default)]
    pub discord: DiscordConfig,
    /// Liquidation thresholds and collateral prices
    #[serde(default)]
    pub risk: RiskConfig,
    /// Polling cadence and cycle guards
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Log destinations
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Analytics API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// HTTP timeout in seconds
    #[serde(default = "default_source_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Channel webhook URL
    #[serde(default)]
    pub webhook_url: String,
    /// Log messages instead of posting them
    #[serde(default)]
    pub dry_run: bool,
    /// Pause between messages in milliseconds
    #[serde(default = "default_dispatch_delay_ms")]
    pub dispatch_delay_ms: u64,
    /// Minimum collateral (ADA) for an event to be posted
    #[serde(default = "default_min_notify_collateral")]
    pub min_notify_collateral_ada: Decimal,
    /// Post liquidations regardless of size
    #[serde(default = "default_true")]
    pub always_notify_liquidations: bool,
    /// Recently sent events remembered for deduplication
    #[serde(default = "default_dedup_window")]
    pub dedup_window: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Liquidation ratio per iAsset (collateral value / minted value),
    /// overlaid on the built-in table
    #[serde(default = "default_liquidation_ratios")]
    pub liquidation_ratios: HashMap<String, Decimal>,
    /// Ratio for assets missing from the table
    #[serde(default = "default_liquidation_ratio")]
    pub default_liquidation_ratio: Decimal,
    /// Relative band above the threshold reported as at-risk (0.10 = 10%)
    #[serde(default = "default_safety_margin")]
    pub safety_margin: Decimal,
    /// Collateral price per iAsset, in minted units per collateral unit
    #[serde(default)]
    pub prices: HashMap<String, Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between cycles
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Consecutive failed cycles before the process gives up
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
    /// Announce every position of the first snapshot as opened
    #[serde(default)]
    pub announce_initial_snapshot: bool,
    /// Events per cycle above which the cycle is rejected (0 = unlimited)
    #[serde(default = "default_max_events_per_cycle")]
    pub max_events_per_cycle: usize,
    /// Known positions below which the closed-fraction guard is skipped
    #[serde(default = "default_shrink_guard_min_positions")]
    pub shrink_guard_min_positions: usize,
    /// Largest share of known positions allowed to close in one cycle
    #[serde(default = "default_max_closed_fraction")]
    pub max_closed_fraction: Decimal,
    /// Identical shrink trips in a row after which the shrink is accepted (0 = never)
    #[serde(default = "default_shrink_confirmations")]
    pub shrink_confirmations: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory of the hourly rolling log file
    #[serde(default = "default_log_dir")]
    pub dir: String,
    /// Emit JSON lines on stdout instead of human-readable text
    #[serde(default)]
    pub json: bool,
}

// Default value functions
fn default_base_url() -> String {
    "https://analytics.indigoprotocol.io".to_string()
}

fn default_source_timeout() -> u64 {
    15
}

fn default_dispatch_delay_ms() -> u64 {
    2_000
}

fn default_min_notify_collateral() -> Decimal {
    Decimal::new(25_000, 0) // 25k ADA
}

fn default_true() -> bool {
    true
}

fn default_dedup_window() -> usize {
    1_024
}

fn default_liquidation_ratios() -> HashMap<String, Decimal> {
    [
        ("iUSD", Decimal::new(12, 1)), // 120%
        ("iBTC", Decimal::new(11, 1)), // 110%
        ("iETH", Decimal::new(11, 1)),
        ("iSOL", Decimal::new(11, 1)),
    ]
    .into_iter()
    .map(|(asset, ratio)| (asset.to_string(), ratio))
    .collect()
}

fn default_liquidation_ratio() -> Decimal {
    Decimal::new(15, 1) // 150% for unlisted assets
}

fn default_safety_margin() -> Decimal {
    Decimal::new(10, 2) // 0.10
}

fn default_poll_interval() -> u64 {
    30
}

fn default_max_consecutive_failures() -> u32 {
    10
}

fn default_max_events_per_cycle() -> usize {
    20
}

fn default_shrink_guard_min_positions() -> usize {
    10
}

fn default_max_closed_fraction() -> Decimal {
    Decimal::new(50, 2) // 0.50
}

fn default_shrink_confirmations() -> u32 {
    3
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl Config {
    /// Load configuration from environment variables and config files.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        Self::from_builder(
            config::Config::builder()
                .add_source(config::File::with_name("config").required(false))
                .add_source(config::Environment::default().separator("__").prefix("CDPW")),
        )
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let config = builder.build().context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if !self.discord.dry_run {
            anyhow::ensure!(
                !self.discord.webhook_url.is_empty(),
                "discord.webhook_url must be set unless dry_run is enabled"
            );
            anyhow::ensure!(
                self.discord.webhook_url.starts_with(DISCORD_WEBHOOK_PREFIX),
                "discord.webhook_url must start with {}",
                DISCORD_WEBHOOK_PREFIX
            );
        }

        anyhow::ensure!(
            self.risk
                .liquidation_ratios
                .values()
                .chain(std::iter::once(&self.risk.default_liquidation_ratio))
                .all(|r| *r > Decimal::ZERO),
            "liquidation ratios must be positive"
        );

        anyhow::ensure!(
            self.risk.safety_margin >= Decimal::ZERO,
            "safety_margin must not be negative"
        );

        anyhow::ensure!(
            self.risk.prices.values().all(|p| *p > Decimal::ZERO),
            "collateral prices must be positive"
        );

        let prices = self.risk.price_table();
        let mut unpriced: Vec<String> = self
            .risk
            .ratio_table()
            .into_keys()
            .filter(|asset| !prices.contains_key(asset))
            .collect();
        unpriced.sort();
        anyhow::ensure!(
            unpriced.is_empty(),
            "risk.prices has no price for: {}",
            unpriced.join(", ")
        );

        anyhow::ensure!(
            self.scheduler.poll_interval_secs >= 1,
            "poll_interval_secs must be at least 1"
        );

        anyhow::ensure!(
            self.scheduler.max_consecutive_failures >= 1,
            "max_consecutive_failures must be at least 1"
        );

        anyhow::ensure!(
            self.scheduler.shrink_confirmations < self.scheduler.max_consecutive_failures,
            "shrink_confirmations must be below max_consecutive_failures"
        );

        anyhow::ensure!(
            self.scheduler.max_closed_fraction > Decimal::ZERO
                && self.scheduler.max_closed_fraction <= Decimal::ONE,
            "max_closed_fraction must be between 0 and 1"
        );

        Ok(())
    }
}

impl RiskConfig {
    /// Built-in liquidation ratios overlaid with the configured ones, keyed by
    /// lowercase asset code.
    pub fn ratio_table(&self) -> HashMap<String, Decimal> {
        let mut table: HashMap<String, Decimal> = default_liquidation_ratios()
            .into_iter()
            .map(|(asset, ratio)| (asset_key(&asset), ratio))
            .collect();
        for (asset, ratio) in &self.liquidation_ratios {
            table.insert(asset_key(asset), *ratio);
        }
        table
    }

    /// Configured prices keyed by lowercase asset code.
    pub fn price_table(&self) -> HashMap<String, Decimal> {
        self.prices
            .iter()
            .map(|(asset, price)| (asset_key(asset), *price))
            .collect()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            json: false,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_source_timeout(),
        }
    }
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            dry_run: false,
            dispatch_delay_ms: default_dispatch_delay_ms(),
            min_notify_collateral_ada: default_min_notify_collateral(),
            always_notify_liquidations: default_true(),
            dedup_window: default_dedup_window(),
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            liquidation_ratios: default_liquidation_ratios(),
            default_liquidation_ratio: default_liquidation_ratio(),
            safety_margin: default_safety_margin(),
            prices: HashMap::new(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            max_consecutive_failures: default_max_consecutive_failures(),
            announce_initial_snapshot: false,
            max_events_per_cycle: default_max_events_per_cycle(),
            shrink_guard_min_positions: default_shrink_guard_min_positions(),
            max_closed_fraction: default_max_closed_fraction(),
            shrink_confirmations: default_shrink_confirmations(),
        }
    }
}
