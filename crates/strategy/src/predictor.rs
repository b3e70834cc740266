//! Signal generation from cached models with a heuristic fallback.

use common::{Action, Error, Model, Signal};
use tracing::{debug, info, warn};

use crate::cache::ModelCache;
use crate::indicators::{calculate_indicators, Indicators};

/// Models that returned less than this in training only ever hold.
pub const MIN_TRUSTED_PERFORMANCE: f64 = 0.10;
/// Every model-backed signal aims 1.5% above the current price.
pub const TARGET_MARKUP: f64 = 1.015;

const MODEL_BUY_RSI: f64 = 30.0;
const MODEL_BUY_DROP: f64 = -0.02;
const MODEL_SELL_RSI: f64 = 70.0;
const MODEL_SELL_RISE: f64 = 0.015;

const FALLBACK_BUY_RSI: f64 = 35.0;
const FALLBACK_BUY_DROP: f64 = -0.015;
const FALLBACK_SELL_RSI: f64 = 65.0;
const FALLBACK_SELL_RISE: f64 = 0.015;
const FALLBACK_CONFIDENCE: f64 = 0.6;
const FALLBACK_HOLD_CONFIDENCE: f64 = 0.4;

pub const FALLBACK_ALGORITHM: &str = "basic";

/// Decision rule for a symbol with a trained model.
pub fn model_signal(model: &Model, current_price: f64, ind: Indicators) -> Signal {
    let performance = model.performance_or_zero();
    let mut action = Action::Hold;
    let mut confidence = 0.5;

    if performance > MIN_TRUSTED_PERFORMANCE {
        if ind.rsi < MODEL_BUY_RSI && ind.price_change < MODEL_BUY_DROP {
            action = Action::Buy;
            confidence = 0.7 + performance * 0.3;
        } else if ind.rsi > MODEL_SELL_RSI && ind.price_change > MODEL_SELL_RISE {
            action = Action::Sell;
            confidence = 0.7 + performance * 0.3;
        }
    }

    Signal {
        action,
        confidence: confidence.clamp(0.0, 1.0),
        target_price: current_price * TARGET_MARKUP,
        model_performance: performance,
        algorithm: model.algorithm.clone(),
        trained_at: Some(model.trained_at),
    }
}

/// Heuristic used when no model exists for the symbol.
pub fn fallback_signal(current_price: f64, ind: Indicators) -> Signal {
    let (action, confidence, target_price) =
        if ind.rsi < FALLBACK_BUY_RSI && ind.price_change < FALLBACK_BUY_DROP {
            (Action::Buy, FALLBACK_CONFIDENCE, current_price * TARGET_MARKUP)
        } else if ind.rsi > FALLBACK_SELL_RSI && ind.price_change > FALLBACK_SELL_RISE {
            (Action::Sell, FALLBACK_CONFIDENCE, current_price)
        } else {
            (Action::Hold, FALLBACK_HOLD_CONFIDENCE, current_price)
        };

    Signal {
        action,
        confidence,
        target_price,
        model_performance: 0.0,
        algorithm: FALLBACK_ALGORITHM.to_string(),
        trained_at: None,
    }
}

/// Owns the model cache and refreshes it on demand before predicting.
#[derive(Debug)]
pub struct PredictionEngine {
    cache: ModelCache,
}

impl PredictionEngine {
    pub fn new(cache: ModelCache) -> Self {
        Self { cache }
    }

    /// Produce a signal for `symbol`.
    ///
    /// A stale cache is refreshed first and the prediction waits for it.
    /// Credential failures abort the caller's cycle; any other refresh
    /// failure is logged and the prediction runs against what is cached.
    pub async fn predict(
        &mut self,
        symbol: &str,
        current_price: f64,
        history: &[f64],
    ) -> Result<Signal, Error> {
        if self.cache.is_stale() {
            info!("Model cache stale, refreshing before predicting {}", symbol);
            match self.cache.refresh().await {
                Ok(outcome) => debug!("Refresh loaded {} models", outcome.loaded),
                Err(e) if e.is_cycle_fatal() => return Err(e),
                Err(e) => warn!("Model refresh failed, using cached models: {}", e),
            }
        }

        let ind = calculate_indicators(history);
        let signal = match self.cache.get(symbol) {
            Some(model) => model_signal(model, current_price, ind),
            None => {
                debug!("No model for {}, using basic strategy", symbol);
                fallback_signal(current_price, ind)
            }
        };

        debug!(
            "{}: rsi={:.1} change={:.4} → {:?} (conf={:.2}, algo={})",
            symbol, ind.rsi, ind.price_change, signal.action, signal.confidence, signal.algorithm
        );
        Ok(signal)
    }

    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut ModelCache {
        &mut self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeStore;
    use chrono::Utc;
    use std::sync::Arc;

    fn model(performance: Option<f64>) -> Model {
        Model {
            symbol: "BTC/USD".into(),
            algorithm: "random_forest".into(),
            performance,
            trained_at: Utc::now(),
            file_name: "BTC_USD_model.json".into(),
            last_modified: None,
        }
    }

    fn ind(rsi: f64, price_change: f64) -> Indicators {
        Indicators { rsi, price_change }
    }

    fn engine(store: FakeStore) -> (PredictionEngine, Arc<FakeStore>) {
        let store = Arc::new(store);
        (PredictionEngine::new(ModelCache::new(store.clone(), None, 1800)), store)
    }

    #[test]
    fn test_trusted_model_buy() {
        let s = model_signal(&model(Some(0.2)), 100.0, ind(25.0, -0.03));
        assert_eq!(s.action, Action::Buy);
        assert!((s.confidence - 0.76).abs() < 1e-9);
        assert!((s.target_price - 101.5).abs() < 1e-9);
        assert_eq!(s.algorithm, "random_forest");
        assert!(s.trained_at.is_some());
    }

    #[test]
    fn test_trusted_model_sell() {
        let s = model_signal(&model(Some(0.12)), 100.0, ind(75.0, 0.02));
        assert_eq!(s.action, Action::Sell);
        assert!((s.confidence - 0.736).abs() < 1e-9);
        assert!((s.target_price - 101.5).abs() < 1e-9);
    }

    #[test]
    fn test_untrusted_model_always_holds() {
        for perf in [Some(0.10), Some(0.05), Some(-0.3), None] {
            let s = model_signal(&model(perf), 100.0, ind(10.0, -0.05));
            assert_eq!(s.action, Action::Hold);
            assert_eq!(s.confidence, 0.5);
            assert!((s.target_price - 101.5).abs() < 1e-9);
        }
        assert_eq!(model_signal(&model(None), 1.0, ind(50.0, 0.0)).model_performance, 0.0);
    }

    #[test]
    fn test_trusted_model_needs_both_conditions() {
        // Oversold but drop too shallow for the model rule.
        let s = model_signal(&model(Some(0.3)), 100.0, ind(20.0, -0.015));
        assert_eq!(s.action, Action::Hold);
    }

    #[test]
    fn test_confidence_capped_at_one() {
        let s = model_signal(&model(Some(2.5)), 100.0, ind(20.0, -0.05));
        assert_eq!(s.confidence, 1.0);
    }

    #[test]
    fn test_fallback_thresholds() {
        let buy = fallback_signal(100.0, ind(20.0, -0.02));
        assert_eq!(buy.action, Action::Buy);
        assert_eq!(buy.confidence, 0.6);
        assert!((buy.target_price - 101.5).abs() < 1e-9);
        assert_eq!(buy.algorithm, FALLBACK_ALGORITHM);

        let sell = fallback_signal(100.0, ind(70.0, 0.02));
        assert_eq!(sell.action, Action::Sell);
        assert_eq!(sell.confidence, 0.6);
        assert_eq!(sell.target_price, 100.0);

        let hold = fallback_signal(100.0, ind(50.0, 0.0));
        assert_eq!(hold.action, Action::Hold);
        assert_eq!(hold.confidence, 0.4);
        assert_eq!(hold.target_price, 100.0);

        // Boundaries are strict.
        assert_eq!(fallback_signal(100.0, ind(35.0, -0.02)).action, Action::Hold);
        assert_eq!(fallback_signal(100.0, ind(20.0, -0.015)).action, Action::Hold);
    }

    #[tokio::test]
    async fn test_predict_refreshes_when_stale_then_uses_model() {
        let (mut engine, store) =
            engine(FakeStore::new().with_model("BTC_USD_model.json", "xgboost", Some(0.2)));

        let history = [100.0, 99.0, 98.0, 97.0, 95.0];
        let s = engine.predict("BTC/USD", 95.0, &history).await.unwrap();
        assert_eq!(store.list_calls(), 1);
        assert_eq!(s.algorithm, "xgboost");
        assert_eq!(s.action, Action::Buy);

        // Fresh cache: no second listing.
        engine.predict("BTC/USD", 95.0, &history).await.unwrap();
        assert_eq!(store.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_predict_without_model_uses_fallback() {
        let (mut engine, _) = engine(FakeStore::new());
        let prices: Vec<f64> = (0..15).map(|i| 100.0 * 0.97f64.powi(i)).collect();
        let current = *prices.last().unwrap();

        let s = engine.predict("SOL/USD", current, &prices).await.unwrap();
        assert_eq!(s.action, Action::Buy);
        assert_eq!(s.confidence, 0.6);
        assert!((s.target_price - current * 1.015).abs() < 1e-9);
        assert_eq!(s.model_performance, 0.0);
    }

    #[tokio::test]
    async fn test_predict_survives_listing_failure() {
        let (mut engine, store) = engine(FakeStore::new());
        store.fail_listing(true);
        let s = engine.predict("BTC/USD", 100.0, &[100.0]).await.unwrap();
        assert_eq!(s.action, Action::Hold);
        assert_eq!(s.algorithm, FALLBACK_ALGORITHM);
    }

    #[tokio::test]
    async fn test_predict_propagates_auth_failure() {
        let (mut engine, store) = engine(FakeStore::new());
        store.fail_auth(true);
        let err = engine.predict("BTC/USD", 100.0, &[100.0]).await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }
}
