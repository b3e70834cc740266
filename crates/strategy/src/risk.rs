//! Entry and exit rules for a single asset.

use common::{Action, Error, Position, Signal, StrategyConfig};
use serde::Serialize;
use tracing::info;

use crate::predictor::PredictionEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    ProfitTarget,
    StopLoss,
    ModelSignal,
}

/// Close the whole position for `reason`.
#[derive(Debug, Clone, Serialize)]
pub struct ExitDecision {
    pub reason: ExitReason,
    pub qty: f64,
    pub profit_percent: f64,
    /// Present only for model-signalled exits.
    pub signal: Option<Signal>,
}

#[derive(Debug, Clone)]
pub struct RiskManager {
    profit_target: f64,
    stop_loss: f64,
    min_buy_confidence: f64,
    min_exit_confidence: f64,
    buy_budget_factor: f64,
}

impl Default for RiskManager {
    fn default() -> Self {
        Self::new(&StrategyConfig::default())
    }
}

/// Fractional gain of `current_price` over the entry. Zero if the entry
/// price is unknown.
pub fn profit_percent(avg_entry_price: f64, current_price: f64) -> f64 {
    if avg_entry_price <= 0.0 {
        return 0.0;
    }
    (current_price - avg_entry_price) / avg_entry_price
}

impl RiskManager {
    pub fn new(config: &StrategyConfig) -> Self {
        Self {
            profit_target: config.profit_target,
            stop_loss: config.stop_loss,
            min_buy_confidence: config.min_buy_confidence,
            min_exit_confidence: config.min_exit_confidence,
            buy_budget_factor: config.buy_budget_factor,
        }
    }

    /// Decide whether to close `position`. Rules are checked in order and
    /// the first match wins; the predictor is only consulted when neither
    /// price rule fires.
    pub async fn evaluate_sell(
        &self,
        symbol: &str,
        position: &Position,
        current_price: f64,
        history: &[f64],
        predictor: &mut PredictionEngine,
    ) -> Result<Option<ExitDecision>, Error> {
        let pnl = profit_percent(position.avg_entry_price, current_price);

        if pnl >= self.profit_target {
            info!("💰 {} profit target hit: {:.2}%", symbol, pnl * 100.0);
            return Ok(Some(self.exit(ExitReason::ProfitTarget, position, pnl, None)));
        }

        if pnl <= -self.stop_loss {
            info!("🛑 {} stop loss hit: {:.2}%", symbol, pnl * 100.0);
            return Ok(Some(self.exit(ExitReason::StopLoss, position, pnl, None)));
        }

        let signal = predictor.predict(symbol, current_price, history).await?;
        if signal.action == Action::Sell && signal.confidence > self.min_exit_confidence && pnl > 0.0 {
            info!(
                "🤖 {} model exit: conf={:.2} profit={:.2}%",
                symbol,
                signal.confidence,
                pnl * 100.0
            );
            return Ok(Some(self.exit(ExitReason::ModelSignal, position, pnl, Some(signal))));
        }

        Ok(None)
    }

    /// Ask the predictor whether to enter `symbol`; returns the signal when
    /// it clears the buy confidence bar.
    pub async fn evaluate_buy(
        &self,
        symbol: &str,
        current_price: f64,
        history: &[f64],
        predictor: &mut PredictionEngine,
    ) -> Result<Option<Signal>, Error> {
        let signal = predictor.predict(symbol, current_price, history).await?;
        if signal.action == Action::Buy && signal.confidence > self.min_buy_confidence {
            Ok(Some(signal))
        } else {
            Ok(None)
        }
    }

    /// Equal-weight entry size. Capital already deployed in other
    /// positions is not subtracted.
    pub fn buy_quantity(&self, buying_power: f64, asset_count: usize, current_price: f64) -> f64 {
        if asset_count == 0 || current_price <= 0.0 || buying_power <= 0.0 {
            return 0.0;
        }
        (buying_power / asset_count as f64 * self.buy_budget_factor) / current_price
    }

    fn exit(
        &self,
        reason: ExitReason,
        position: &Position,
        profit_percent: f64,
        signal: Option<Signal>,
    ) -> ExitDecision {
        ExitDecision {
            reason,
            qty: position.qty,
            profit_percent,
            signal,
        }
    }
}
