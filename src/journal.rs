//! Append-only JSONL trade journal, one file per UTC day.
//!
//! Each line is a [`JournalEvent`] stamped with the write time. The file
//! for the current day is opened on every append, so a long `run` rolls
//! over at midnight without any bookkeeping.

use std::{
    fs::{create_dir_all, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use common::Side;
use serde::Serialize;
use strategy::{
    AssetDecision, AssetOutcome, CycleReport, RebalanceOrder, RebalanceReport, RefreshOutcome,
    RefreshReport,
};
use tracing::{debug, warn};

const JOURNAL_SUBDIR: &str = "scalper-bot";

pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn repo_root() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    cwd.ancestors()
        .find(|dir| dir.join(".git").is_dir())
        .map(Path::to_path_buf)
}

/// `$TRADES_DIR/scalper-bot`, else `TRADES/scalper-bot` under the repo root
/// (or the working directory outside a checkout).
pub fn resolve_trades_dir() -> PathBuf {
    let base = std::env::var("TRADES_DIR")
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
        .map(PathBuf::from)
        .or_else(|| repo_root().map(|root| root.join("TRADES")))
        .unwrap_or_else(|| PathBuf::from("TRADES"));
    base.join(JOURNAL_SUBDIR)
}

/// Everything the bot writes to the journal.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JournalEvent<'a> {
    BotStart {
        command: &'static str,
        paper: bool,
        assets: &'a [String],
        profit_target: f64,
        stop_loss: f64,
        scan_interval_secs: u64,
        model_refresh_interval_secs: u64,
    },
    OrderPlaced {
        symbol: &'a str,
        side: Side,
        qty: f64,
        price: Option<f64>,
        decision: &'a AssetDecision,
        order_id: &'a str,
    },
    OrderFailed {
        symbol: &'a str,
        side: Side,
        qty: f64,
        price: Option<f64>,
        decision: &'a AssetDecision,
        error: &'a str,
    },
    CycleSummary {
        assets: usize,
        positions: usize,
        orders: usize,
        rebalance_ran: bool,
        rebalance_error: Option<&'a str>,
        duration_ms: i64,
    },
    CycleFailed {
        error: String,
    },
    ModelRefresh {
        models: usize,
        listed: usize,
        skipped: usize,
        all_valid: Option<bool>,
        avg_performance_pct: Option<f64>,
        execution_time_ms: Option<u64>,
    },
    RebalanceSummary {
        buying_power: f64,
        target_per_asset: f64,
        orders: &'a [RebalanceOrder],
        skipped: &'a [String],
    },
}

impl<'a> JournalEvent<'a> {
    /// The order event for an asset outcome, if an order was sent.
    ///
    /// Holds, skips and entries sized to zero never reach the broker and
    /// produce nothing.
    pub fn for_outcome(outcome: &'a AssetOutcome) -> Option<Self> {
        let (side, qty) = match &outcome.decision {
            AssetDecision::Buy { qty, .. } => (Side::Buy, *qty),
            AssetDecision::Sell { qty, .. } => (Side::Sell, *qty),
            AssetDecision::Hold | AssetDecision::Skipped { .. } => return None,
        };
        match (&outcome.order_id, &outcome.error) {
            (Some(order_id), _) => Some(Self::OrderPlaced {
                symbol: &outcome.symbol,
                side,
                qty,
                price: outcome.price,
                decision: &outcome.decision,
                order_id,
            }),
            (None, Some(error)) => Some(Self::OrderFailed {
                symbol: &outcome.symbol,
                side,
                qty,
                price: outcome.price,
                decision: &outcome.decision,
                error,
            }),
            (None, None) => {
                debug!("{}: {} of {} not sent, nothing to journal", outcome.symbol, side.as_str(), qty);
                None
            }
        }
    }

    pub fn cycle_summary(report: &'a CycleReport) -> Self {
        Self::CycleSummary {
            assets: report.assets.len(),
            positions: report.positions,
            orders: report.orders_placed(),
            rebalance_ran: report.rebalance_ran,
            rebalance_error: report.rebalance_error.as_deref(),
            duration_ms: (report.finished_at - report.started_at).num_milliseconds(),
        }
    }

    pub fn rebalance_summary(report: &'a RebalanceReport) -> Self {
        Self::RebalanceSummary {
            buying_power: report.buying_power,
            target_per_asset: report.target_per_asset,
            orders: &report.orders,
            skipped: &report.skipped,
        }
    }

    pub fn model_report(report: &RefreshReport) -> Self {
        Self::ModelRefresh {
            models: report.models_count,
            listed: report.listed,
            skipped: report.skipped.len(),
            all_valid: Some(report.all_valid),
            avg_performance_pct: Some(report.statistics.avg_performance_pct),
            execution_time_ms: Some(report.execution_time_ms),
        }
    }

    pub fn model_outcome(outcome: &RefreshOutcome) -> Self {
        Self::ModelRefresh {
            models: outcome.loaded,
            listed: outcome.listed,
            skipped: outcome.skipped.len(),
            all_valid: None,
            avg_performance_pct: None,
            execution_time_ms: None,
        }
    }
}

#[derive(Serialize)]
struct JournalLine<'a> {
    ts: String,
    #[serde(flatten)]
    event: &'a JournalEvent<'a>,
}

pub struct TradeJournal {
    dir: PathBuf,
}

impl TradeJournal {
    pub fn open(dir: PathBuf) -> std::io::Result<Self> {
        create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_for(&self, day: NaiveDate) -> PathBuf {
        self.dir.join(format!("trades-{}.jsonl", day.format("%Y-%m-%d")))
    }

    /// Append one event. Failures are logged and swallowed.
    pub fn append(&self, event: &JournalEvent<'_>) {
        if let Err(e) = self.append_at(Utc::now(), event) {
            warn!("Trade journal write failed: {}", e);
        }
    }

    fn append_at(&self, at: DateTime<Utc>, event: &JournalEvent<'_>) -> std::io::Result<()> {
        let line = JournalLine {
            ts: at.to_rfc3339_opts(SecondsFormat::Millis, true),
            event,
        };
        let json = serde_json::to_string(&line)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.file_for(at.date_naive()))?;
        writeln!(file, "{}", json)?;
        file.flush()
    }
}
