//! Configuration loader: merges config.toml, .env and environment variables.

use common::{AlpacaConfig, BotConfig, Error};
use std::path::Path;

fn parse_fraction(raw: &str, env_name: &str) -> Result<f64, Error> {
    let parsed = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| Error::Config(format!("{env_name} must be a number in (0,1)")))?;
    if parsed <= 0.0 || parsed >= 1.0 {
        return Err(Error::Config(format!("{env_name} must be a number in (0,1)")));
    }
    Ok(parsed)
}

fn parse_positive_u64(raw: &str, env_name: &str) -> Result<u64, Error> {
    let parsed = raw
        .trim()
        .parse::<u64>()
        .map_err(|_| Error::Config(format!("{env_name} must be an integer > 0")))?;
    if parsed == 0 {
        return Err(Error::Config(format!("{env_name} must be an integer > 0")));
    }
    Ok(parsed)
}

fn parse_bool(raw: &str) -> bool {
    let lowered = raw.trim().to_ascii_lowercase();
    lowered != "0" && lowered != "false" && lowered != "no" && lowered != "off"
}

fn parse_assets(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_ascii_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn non_empty(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn validate_config(config: &BotConfig) -> Result<(), Error> {
    let mut issues: Vec<String> = Vec::new();

    if config.assets.is_empty() {
        issues.push("assets must contain at least one symbol".into());
    }
    for symbol in &config.assets {
        if !symbol.contains('/') {
            issues.push(format!("asset {symbol} must be a BASE/QUOTE pair"));
        }
    }

    let s = &config.strategy;
    if s.profit_target <= 0.0 {
        issues.push("strategy.profit_target must be > 0".into());
    }
    if s.stop_loss <= 0.0 {
        issues.push("strategy.stop_loss must be > 0".into());
    }
    if !(0.0..=1.0).contains(&s.min_buy_confidence) {
        issues.push("strategy.min_buy_confidence must be in [0,1]".into());
    }
    if !(0.0..=1.0).contains(&s.min_exit_confidence) {
        issues.push("strategy.min_exit_confidence must be in [0,1]".into());
    }
    if s.buy_budget_factor <= 0.0 || s.buy_budget_factor > 1.0 {
        issues.push("strategy.buy_budget_factor must be in (0,1]".into());
    }
    if s.history_capacity < 2 {
        issues.push("strategy.history_capacity must be >= 2".into());
    }

    let p = &config.portfolio;
    if p.deploy_fraction <= 0.0 || p.deploy_fraction > 1.0 {
        issues.push("portfolio.deploy_fraction must be in (0,1]".into());
    }
    if p.drift_threshold < 0.0 {
        issues.push("portfolio.drift_threshold must be >= 0".into());
    }
    if p.rebalance_every_hours == 0 || p.rebalance_every_hours > 24 {
        issues.push("portfolio.rebalance_every_hours must be in 1..=24".into());
    }

    if config.models.refresh_interval_secs == 0 {
        issues.push("models.refresh_interval_secs must be > 0".into());
    }
    if config.timing.scan_interval_secs == 0 {
        issues.push("timing.scan_interval_secs must be > 0".into());
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Invalid config:\n - {}",
            issues.join("\n - ")
        )))
    }
}

/// Broker commands need both Alpaca keys; model commands never touch the broker.
pub fn require_broker_credentials(alpaca: &AlpacaConfig) -> Result<(), Error> {
    if alpaca.api_key.is_empty() {
        return Err(Error::Config(
            "ALPACA_API_KEY is required (set in .env or environment)".into(),
        ));
    }
    if alpaca.secret_key.is_empty() {
        return Err(Error::Config(
            "ALPACA_SECRET_KEY is required (set in .env or environment)".into(),
        ));
    }
    Ok(())
}

/// Load bot configuration from environment and optional config file.
pub fn load_config() -> Result<BotConfig, Error> {
    // 1. Load .env file from project root or parent directories.
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    // 2. Start with defaults, then config.toml if present.
    let mut config = BotConfig::default();
    let config_path = Path::new("config.toml");
    if config_path.exists() {
        let contents = std::fs::read_to_string(config_path)
            .map_err(|e| Error::Config(format!("Failed to read config.toml: {}", e)))?;
        config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config.toml: {}", e)))?;
    }

    // 3. Override with environment variables (highest priority).
    if let Ok(key) = std::env::var("ALPACA_API_KEY") {
        config.alpaca.api_key = key.trim().to_string();
    }
    if let Ok(secret) = std::env::var("ALPACA_SECRET_KEY") {
        config.alpaca.secret_key = secret.trim().to_string();
    }
    if let Ok(paper) = std::env::var("ALPACA_PAPER") {
        config.alpaca.paper = parse_bool(&paper);
    }
    if let Ok(url) = std::env::var("ALPACA_API_BASE_URL") {
        config.alpaca.base_url = non_empty(url);
    }
    if let Ok(url) = std::env::var("ALPACA_DATA_BASE_URL") {
        config.alpaca.data_url = non_empty(url);
    }
    if let Ok(creds) = std::env::var("GOOGLE_DRIVE_CREDENTIALS") {
        config.models.drive_credentials = creds;
    }
    if let Ok(folder) = std::env::var("GOOGLE_DRIVE_FOLDER_ID") {
        config.models.drive_folder_id = folder.trim().to_string();
    }
    if let Ok(repo) = std::env::var("GITHUB_REPO") {
        config.models.metadata_repo = repo.trim().to_string();
    }
    if let Ok(raw) = std::env::var("SCALPER_ASSETS") {
        config.assets = parse_assets(&raw);
    }
    if let Ok(raw) = std::env::var("SCALPER_PROFIT_TARGET") {
        config.strategy.profit_target = parse_fraction(&raw, "SCALPER_PROFIT_TARGET")?;
    }
    if let Ok(raw) = std::env::var("SCALPER_STOP_LOSS") {
        config.strategy.stop_loss = parse_fraction(&raw, "SCALPER_STOP_LOSS")?;
    }
    if let Ok(raw) = std::env::var("SCALPER_SCAN_INTERVAL_SECS") {
        config.timing.scan_interval_secs = parse_positive_u64(&raw, "SCALPER_SCAN_INTERVAL_SECS")?;
    }

    validate_config(&config)?;

    Ok(config)
}
