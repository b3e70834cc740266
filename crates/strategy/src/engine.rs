//! Long-lived trading context.
//!
//! Owns the price histories and the model cache for the lifetime of the
//! process. Each cycle reads positions once, then walks the asset
//! universe in order; failures on one asset are recorded in the report
//! and do not stop the others. Only account and credential failures
//! abort a cycle.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use common::{
    find_position, BotConfig, Broker, Error, MetadataFeed, ModelStore, Position, Side,
};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::cache::{ModelCache, RefreshOutcome};
use crate::history::PriceHistories;
use crate::predictor::PredictionEngine;
use crate::rebalance::{PortfolioRebalancer, RebalanceReport};
use crate::risk::{ExitReason, RiskManager};
use crate::summary::{ModelStatus, RefreshReport};

/// What the engine did with one asset this cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssetDecision {
    Skipped {
        reason: String,
    },
    Hold,
    Buy {
        qty: f64,
        confidence: f64,
        target_price: f64,
        algorithm: String,
    },
    Sell {
        qty: f64,
        reason: ExitReason,
        profit_percent: f64,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct AssetOutcome {
    pub symbol: String,
    pub price: Option<f64>,
    pub decision: AssetDecision,
    pub order_id: Option<String>,
    pub error: Option<String>,
}

impl AssetOutcome {
    fn skipped(symbol: &str, reason: impl Into<String>) -> Self {
        Self {
            symbol: symbol.to_string(),
            price: None,
            decision: AssetDecision::Skipped {
                reason: reason.into(),
            },
            order_id: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub positions: usize,
    pub assets: Vec<AssetOutcome>,
    pub rebalance_ran: bool,
    pub rebalance: Option<RebalanceReport>,
    pub rebalance_error: Option<String>,
}

impl CycleReport {
    pub fn orders_placed(&self) -> usize {
        let asset_orders = self.assets.iter().filter(|a| a.order_id.is_some()).count();
        let rebalance_orders = self
            .rebalance
            .as_ref()
            .map_or(0, |r| r.orders.iter().filter(|o| o.order_id.is_some()).count());
        asset_orders + rebalance_orders
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BotStatus {
    pub equity: f64,
    pub buying_power: f64,
    pub positions: usize,
    pub last_update: Option<DateTime<Utc>>,
    pub models: Vec<String>,
}

pub struct TradingEngine {
    broker: Arc<dyn Broker>,
    predictor: PredictionEngine,
    risk: RiskManager,
    rebalancer: PortfolioRebalancer,
    assets: Vec<String>,
    histories: PriceHistories,
    /// UTC date and hour of the last completed rebalance.
    last_rebalance: Option<(NaiveDate, u32)>,
}

impl TradingEngine {
    pub fn new(
        config: &BotConfig,
        broker: Arc<dyn Broker>,
        store: Arc<dyn ModelStore>,
        feed: Option<Arc<dyn MetadataFeed>>,
    ) -> Self {
        let cache = ModelCache::new(store, feed, config.models.refresh_interval_secs);
        Self::with_cache(config, broker, cache)
    }

    pub fn with_cache(config: &BotConfig, broker: Arc<dyn Broker>, cache: ModelCache) -> Self {
        Self {
            broker,
            predictor: PredictionEngine::new(cache),
            risk: RiskManager::new(&config.strategy),
            rebalancer: PortfolioRebalancer::new(config.assets.clone(), &config.portfolio),
            assets: config.assets.clone(),
            histories: PriceHistories::new(config.strategy.history_capacity),
            last_rebalance: None,
        }
    }

    /// Load models up front so the first cycle does not pay for it.
    pub async fn initialize(&mut self) -> Result<RefreshOutcome, Error> {
        let outcome = self.predictor.cache_mut().refresh().await?;
        info!("Engine initialised with {} models", outcome.loaded);
        Ok(outcome)
    }

    pub async fn execute_cycle(&mut self) -> Result<CycleReport, Error> {
        self.execute_cycle_at(Utc::now()).await
    }

    /// Run one cycle; `now` decides whether the rebalancer is due.
    pub async fn execute_cycle_at(&mut self, now: DateTime<Utc>) -> Result<CycleReport, Error> {
        let started_at = Utc::now();
        let positions = self
            .broker
            .get_positions()
            .await
            .map_err(|e| Error::AccountQuery(format!("positions: {}", e)))?;

        let mut outcomes = Vec::with_capacity(self.assets.len());
        for symbol in self.assets.clone() {
            let outcome = self.process_asset(&symbol, &positions).await?;
            outcomes.push(outcome);
        }

        let mut rebalance = None;
        let mut rebalance_error = None;
        let window = (now.date_naive(), now.hour());
        let rebalance_ran =
            self.rebalancer.is_due(now) && self.last_rebalance != Some(window);
        if rebalance_ran {
            info!("⚖️ Rebalance window open, rebalancing portfolio");
            match self.rebalancer.rebalance(self.broker.as_ref()).await {
                Ok(report) => {
                    self.last_rebalance = Some(window);
                    rebalance = Some(report);
                }
                Err(e) => {
                    error!("Rebalance failed: {}", e);
                    rebalance_error = Some(e.to_string());
                }
            }
        }

        Ok(CycleReport {
            started_at,
            finished_at: Utc::now(),
            positions: positions.len(),
            assets: outcomes,
            rebalance_ran,
            rebalance,
            rebalance_error,
        })
    }

    /// Update the symbol's history and route to the sell or buy path.
    ///
    /// Returns `Err` only for failures that must abort the whole cycle.
    pub async fn process_asset(
        &mut self,
        symbol: &str,
        positions: &[Position],
    ) -> Result<AssetOutcome, Error> {
        let price = match self.broker.get_price(symbol).await {
            Ok(Some(p)) if p > 0.0 => p,
            Ok(_) => {
                warn!("{}: no price available, skipping", symbol);
                return Ok(AssetOutcome::skipped(symbol, "price unavailable"));
            }
            Err(e) => {
                let err = Error::PriceUnavailable(format!("{}: {}", symbol, e));
                warn!("{}", err);
                return Ok(AssetOutcome::skipped(symbol, err.to_string()));
            }
        };

        let history = self.histories.record(symbol, price);

        let decision = match find_position(positions, symbol) {
            Some(position) => {
                let exit = self
                    .risk
                    .evaluate_sell(symbol, position, price, history, &mut self.predictor)
                    .await;
                match exit {
                    Ok(Some(exit)) => AssetDecision::Sell {
                        qty: exit.qty,
                        reason: exit.reason,
                        profit_percent: exit.profit_percent,
                    },
                    Ok(None) => AssetDecision::Hold,
                    Err(e) => return Self::isolate(symbol, price, e),
                }
            }
            None => {
                let entry = self
                    .risk
                    .evaluate_buy(symbol, price, history, &mut self.predictor)
                    .await;
                match entry {
                    Ok(Some(signal)) => {
                        // Buying power is re-read for every entry, not reserved.
                        let account = self
                            .broker
                            .get_account()
                            .await
                            .map_err(|e| Error::AccountQuery(e.to_string()))?;
                        let qty = self
                            .risk
                            .buy_quantity(account.buying_power, self.assets.len(), price);
                        info!(
                            "🟢 BUY SIGNAL {} @ ${:.4} (confidence {:.2}, {})",
                            symbol, price, signal.confidence, signal.algorithm
                        );
                        AssetDecision::Buy {
                            qty,
                            confidence: signal.confidence,
                            target_price: signal.target_price,
                            algorithm: signal.algorithm,
                        }
                    }
                    Ok(None) => AssetDecision::Hold,
                    Err(e) => return Self::isolate(symbol, price, e),
                }
            }
        };

        let order = match &decision {
            AssetDecision::Buy { qty, .. } if *qty > 0.0 => Some((Side::Buy, *qty)),
            AssetDecision::Sell { qty, .. } if *qty > 0.0 => Some((Side::Sell, *qty)),
            _ => None,
        };

        let mut outcome = AssetOutcome {
            symbol: symbol.to_string(),
            price: Some(price),
            decision,
            order_id: None,
            error: None,
        };

        if let Some((side, qty)) = order {
            match self.broker.place_order(symbol, qty, side).await {
                Ok(record) => {
                    info!("Order {} placed: {} {} {:.8}", record.id, side.as_str(), symbol, qty);
                    outcome.order_id = Some(record.id);
                }
                Err(e) => {
                    let err = Error::OrderPlacement {
                        symbol: symbol.to_string(),
                        reason: e.to_string(),
                    };
                    error!("{}", err);
                    outcome.error = Some(err.to_string());
                }
            }
        }

        Ok(outcome)
    }

    fn isolate(symbol: &str, price: f64, e: Error) -> Result<AssetOutcome, Error> {
        if e.is_cycle_fatal() {
            return Err(e);
        }
        warn!("{}: evaluation failed: {}", symbol, e);
        Ok(AssetOutcome {
            symbol: symbol.to_string(),
            price: Some(price),
            decision: AssetDecision::Hold,
            order_id: None,
            error: Some(e.to_string()),
        })
    }

    pub async fn status(&self) -> Result<BotStatus, Error> {
        let account = self
            .broker
            .get_account()
            .await
            .map_err(|e| Error::AccountQuery(e.to_string()))?;
        let positions = self
            .broker
            .get_positions()
            .await
            .map_err(|e| Error::AccountQuery(e.to_string()))?;

        Ok(BotStatus {
            equity: account.equity,
            buying_power: account.buying_power,
            positions: positions.len(),
            last_update: self.predictor.cache().last_update(),
            models: self.predictor.cache().symbols(),
        })
    }

    /// Force a refresh regardless of staleness and summarise the result.
    pub async fn refresh_models(&mut self) -> Result<RefreshReport, Error> {
        self.predictor.cache_mut().refresh_report().await
    }

    /// Cache status. Populates the cache first if it was never loaded.
    pub async fn model_status(&mut self) -> Result<ModelStatus, Error> {
        self.predictor.cache_mut().status().await
    }

    /// Drop cached models and price histories.
    pub fn reset(&mut self) {
        self.predictor.cache_mut().reset();
        self.histories.clear();
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn history(&self, symbol: &str) -> &[f64] {
        self.histories.get(symbol)
    }

    pub fn predictor(&self) -> &PredictionEngine {
        &self.predictor
    }
}
