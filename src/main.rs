//! Scalper-bot: Alpaca crypto scalping bot.
//!
//! One-shot commands print a single JSON document and exit; `run` keeps
//! one engine alive and trades every scan interval until Ctrl-C.

mod config;
mod journal;

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::{error, info, warn};

use alpaca_client::AlpacaRestClient;
use common::{BotConfig, MetadataFeed, ModelStore};
use journal::{now_iso, resolve_trades_dir, JournalEvent, TradeJournal};
use model_store::{DriveModelStore, GithubMetadataFeed, ServiceAccountAuth};
use strategy::{CycleReport, ModelCache, PortfolioRebalancer, TradingEngine};

/// Alpaca crypto scalping bot
#[derive(Parser)]
#[command(name = "scalper-bot", about = "Alpaca crypto scalping bot")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print account equity, buying power, positions and loaded models.
    Status,
    /// Reload every model artifact and report validity and statistics.
    RefreshModels,
    /// Report model cache freshness without forcing a reload.
    ModelStatus,
    /// Execute one trading cycle.
    Trade,
    /// Rebalance the portfolio now, regardless of the hour.
    Rebalance,
    /// Cancel every open order.
    CancelOrders,
    /// Trade every scan interval until Ctrl-C.
    Run,
}

impl Command {
    fn label(&self) -> &'static str {
        match self {
            Command::Status => "status",
            Command::RefreshModels => "refresh_models",
            Command::ModelStatus => "model_status",
            Command::Trade => "trade",
            Command::Rebalance => "rebalance",
            Command::CancelOrders => "cancel_orders",
            Command::Run => "run",
        }
    }
}

struct App {
    cfg: BotConfig,
    journal: Option<TradeJournal>,
}

impl App {
    fn record(&self, event: JournalEvent<'_>) {
        if let Some(journal) = self.journal.as_ref() {
            journal.append(&event);
        }
    }

    /// Only broker commands reach this, so model commands run without keys.
    fn broker(&self) -> anyhow::Result<Arc<AlpacaRestClient>> {
        config::require_broker_credentials(&self.cfg.alpaca)?;
        Ok(Arc::new(AlpacaRestClient::new(&self.cfg.alpaca)?))
    }

    fn model_cache(&self) -> anyhow::Result<ModelCache> {
        let auth = ServiceAccountAuth::from_json(&self.cfg.models.drive_credentials)
            .context("loading GOOGLE_DRIVE_CREDENTIALS")?;
        let store: Arc<dyn ModelStore> =
            Arc::new(DriveModelStore::new(auth, &self.cfg.models.drive_folder_id)?);

        let feed: Option<Arc<dyn MetadataFeed>> = if self.cfg.models.metadata_repo.is_empty() {
            warn!("GITHUB_REPO not set, model metadata disabled");
            None
        } else {
            Some(Arc::new(GithubMetadataFeed::new(&self.cfg.models.metadata_repo)?))
        };

        Ok(ModelCache::new(store, feed, self.cfg.models.refresh_interval_secs))
    }

    fn build_engine(&self) -> anyhow::Result<TradingEngine> {
        let broker = self.broker()?;
        let cache = self.model_cache()?;
        Ok(TradingEngine::with_cache(&self.cfg, broker, cache))
    }

    fn record_cycle(&self, report: &CycleReport) {
        for outcome in &report.assets {
            if let Some(event) = JournalEvent::for_outcome(outcome) {
                self.record(event);
            }
        }
        if let Some(rebalance) = &report.rebalance {
            self.record(JournalEvent::rebalance_summary(rebalance));
        }
        self.record(JournalEvent::cycle_summary(report));
    }
}

async fn execute(app: &App, command: &Command) -> anyhow::Result<Value> {
    match command {
        Command::Status => {
            let mut engine = app.build_engine()?;
            if let Err(e) = engine.initialize().await {
                warn!("Model load failed, reporting status without models: {}", e);
            }
            let status = engine.status().await?;
            Ok(json!({ "status": status }))
        }
        Command::RefreshModels => {
            let mut cache = app.model_cache()?;
            let report = cache.refresh_report().await?;
            app.record(JournalEvent::model_report(&report));
            let message = match &report.warning {
                Some(w) => w.clone(),
                None => "models refreshed from the model store".to_string(),
            };
            let execution_time_ms = report.execution_time_ms;
            let next_update = report.next_update;
            Ok(json!({
                "message": message,
                "data": report,
                "execution_time_ms": execution_time_ms,
                "next_update": next_update
            }))
        }
        Command::ModelStatus => {
            let mut cache = app.model_cache()?;
            let status = cache.status().await?;
            Ok(json!({ "status": status }))
        }
        Command::Trade => {
            let mut engine = app.build_engine()?;
            let report = engine.execute_cycle().await?;
            app.record_cycle(&report);
            let status = engine.status().await?;
            Ok(json!({
                "message": "trading cycle executed",
                "cycle": report,
                "status": status
            }))
        }
        Command::Rebalance => {
            let rebalancer = PortfolioRebalancer::new(app.cfg.assets.clone(), &app.cfg.portfolio);
            let report = rebalancer.rebalance(app.broker()?.as_ref()).await?;
            app.record(JournalEvent::rebalance_summary(&report));
            Ok(json!({ "rebalance": report }))
        }
        Command::CancelOrders => {
            let broker = app.broker()?;
            let open = broker.open_orders().await?;
            broker.cancel_all_orders().await?;
            info!("Cancelled {} open orders", open.len());
            Ok(json!({ "cancelled": open.len(), "orders": open }))
        }
        Command::Run => run_loop(app).await,
    }
}

async fn run_loop(app: &App) -> anyhow::Result<Value> {
    let mut engine = app.build_engine()?;
    match engine.initialize().await {
        Ok(outcome) => app.record(JournalEvent::model_outcome(&outcome)),
        Err(e) if e.is_cycle_fatal() => return Err(e.into()),
        Err(e) => warn!("Initial model load failed, continuing: {}", e),
    }

    let interval = Duration::from_secs(app.cfg.timing.scan_interval_secs);
    let mut cycles = 0u64;
    let mut failed_cycles = 0u64;
    let mut orders = 0usize;

    let shutdown_reason = loop {
        match engine.execute_cycle().await {
            Ok(report) => {
                cycles += 1;
                orders += report.orders_placed();
                info!(
                    "Cycle {} done: {} assets, {} orders",
                    cycles,
                    report.assets.len(),
                    report.orders_placed()
                );
                app.record_cycle(&report);
            }
            Err(e) => {
                failed_cycles += 1;
                error!("Cycle aborted: {}", e);
                app.record(JournalEvent::CycleFailed {
                    error: e.to_string(),
                });
            }
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => break "ctrl_c",
            _ = sleep(interval) => {}
        }
    };

    info!("Shutting down ({})", shutdown_reason);
    Ok(json!({
        "message": "bot stopped",
        "reason": shutdown_reason,
        "cycles": cycles,
        "failed_cycles": failed_cycles,
        "orders": orders
    }))
}

fn print_json(value: &Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}

fn fail(err: anyhow::Error) -> ! {
    error!("{:#}", err);
    print_json(&json!({
        "success": false,
        "error": format!("{:#}", err),
        "timestamp": now_iso()
    }));
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "scalper_bot=info,alpaca_client=info,model_store=info,strategy=info".into()
            }),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let cfg = match config::load_config() {
        Ok(c) => c,
        Err(e) => fail(e.into()),
    };

    info!(
        "Environment: {}",
        if cfg.alpaca.paper { "PAPER" } else { "LIVE" }
    );
    info!("Assets: {:?}", cfg.assets);
    info!(
        "Strategy: target={:.2}%, stop={:.2}%, rebalance every {}h",
        cfg.strategy.profit_target * 100.0,
        cfg.strategy.stop_loss * 100.0,
        cfg.portfolio.rebalance_every_hours
    );

    let journal = match TradeJournal::open(resolve_trades_dir()) {
        Ok(j) => {
            info!("Trade journal path: {}", j.dir().display());
            Some(j)
        }
        Err(e) => {
            warn!("Trade journal unavailable: {}", e);
            None
        }
    };

    let app = App { cfg, journal };
    app.record(JournalEvent::BotStart {
        command: cli.command.label(),
        paper: app.cfg.alpaca.paper,
        assets: &app.cfg.assets,
        profit_target: app.cfg.strategy.profit_target,
        stop_loss: app.cfg.strategy.stop_loss,
        scan_interval_secs: app.cfg.timing.scan_interval_secs,
        model_refresh_interval_secs: app.cfg.models.refresh_interval_secs,
    });

    match execute(&app, &cli.command).await {
        Ok(mut body) => {
            if let Some(obj) = body.as_object_mut() {
                obj.insert("success".into(), Value::Bool(true));
                obj.insert("timestamp".into(), Value::String(now_iso()));
            }
            print_json(&body);
        }
        Err(e) => fail(e),
    }
}
