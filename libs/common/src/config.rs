//! Bot configuration types.

use serde::{Deserialize, Serialize};

/// Top-level bot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Brokerage credentials and endpoints.
    #[serde(default)]
    pub alpaca: AlpacaConfig,

    /// Model artifact store and metadata feed.
    #[serde(default)]
    pub models: ModelsConfig,

    /// Fixed trading universe.
    #[serde(default = "default_assets")]
    pub assets: Vec<String>,

    /// Per-asset entry/exit parameters.
    #[serde(default)]
    pub strategy: StrategyConfig,

    /// Capital allocation parameters.
    #[serde(default)]
    pub portfolio: PortfolioConfig,

    /// Timing parameters (seconds).
    #[serde(default)]
    pub timing: TimingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlpacaConfig {
    /// API key ID.
    #[serde(default)]
    pub api_key: String,

    /// API secret.
    #[serde(default)]
    pub secret_key: String,

    /// Paper account (true) or live account (false).
    #[serde(default = "default_true")]
    pub paper: bool,

    /// Optional trading API base URL override.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Optional market-data API base URL override.
    #[serde(default)]
    pub data_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Drive folder holding `<BASE>_<QUOTE>_model.json` artifacts.
    #[serde(default)]
    pub drive_folder_id: String,

    /// Service-account credentials JSON.
    #[serde(default)]
    pub drive_credentials: String,

    /// `owner/repo` publishing `models_metadata.json` on its main branch.
    #[serde(default)]
    pub metadata_repo: String,

    /// Cache freshness window.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
}

/// Entry/exit thresholds (fractions, not percent).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Sell the whole position once unrealised profit reaches this.
    #[serde(default = "default_profit_target")]
    pub profit_target: f64,

    /// Sell the whole position once unrealised loss reaches this.
    #[serde(default = "default_stop_loss")]
    pub stop_loss: f64,

    /// Minimum confidence for a buy signal to open a position.
    #[serde(default = "default_buy_confidence")]
    pub min_buy_confidence: f64,

    /// Minimum confidence for a model sell signal to close a winning position.
    #[serde(default = "default_exit_confidence")]
    pub min_exit_confidence: f64,

    /// Share of the per-asset budget spent on an entry; the rest is a buffer.
    #[serde(default = "default_buy_budget_factor")]
    pub buy_budget_factor: f64,

    /// Price samples retained per symbol.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioConfig {
    /// Share of buying power spread across the universe.
    #[serde(default = "default_deploy_fraction")]
    pub deploy_fraction: f64,

    /// Minimum drift, as a fraction of target capital, before rebalancing.
    #[serde(default = "default_drift_threshold")]
    pub drift_threshold: f64,

    /// Rebalance when the UTC hour is a multiple of this.
    #[serde(default = "default_rebalance_every_hours")]
    pub rebalance_every_hours: u32,
}

/// Timing configuration (all values in seconds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Interval between trading cycles in `run` mode.
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_assets() -> Vec<String> {
    ["BTC/USD", "ETH/USD", "LTC/USD", "BCH/USD", "DOGE/USD"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_refresh_interval() -> u64 {
    30 * 60
}
fn default_profit_target() -> f64 {
    0.015
}
fn default_stop_loss() -> f64 {
    0.01
}
fn default_buy_confidence() -> f64 {
    0.5
}
fn default_exit_confidence() -> f64 {
    0.6
}
fn default_buy_budget_factor() -> f64 {
    0.9
}
fn default_history_capacity() -> usize {
    100
}

fn default_deploy_fraction() -> f64 {
    0.8
}
fn default_drift_threshold() -> f64 {
    0.10
}
fn default_rebalance_every_hours() -> u32 {
    6
}

fn default_scan_interval() -> u64 {
    60
}

impl Default for AlpacaConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            secret_key: String::new(),
            paper: default_true(),
            base_url: None,
            data_url: None,
        }
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            drive_folder_id: String::new(),
            drive_credentials: String::new(),
            metadata_repo: String::new(),
            refresh_interval_secs: default_refresh_interval(),
        }
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            profit_target: default_profit_target(),
            stop_loss: default_stop_loss(),
            min_buy_confidence: default_buy_confidence(),
            min_exit_confidence: default_exit_confidence(),
            buy_budget_factor: default_buy_budget_factor(),
            history_capacity: default_history_capacity(),
        }
    }
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            deploy_fraction: default_deploy_fraction(),
            drift_threshold: default_drift_threshold(),
            rebalance_every_hours: default_rebalance_every_hours(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: default_scan_interval(),
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            alpaca: AlpacaConfig::default(),
            models: ModelsConfig::default(),
            assets: default_assets(),
            strategy: StrategyConfig::default(),
            portfolio: PortfolioConfig::default(),
            timing: TimingConfig::default(),
        }
    }
}
