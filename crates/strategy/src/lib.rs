//! Scalping decision engine.
//!
//! Turns price observations, cached per-symbol models and broker
//! positions into order actions, and rebalances capital on a cadence.

pub mod cache;
pub mod engine;
pub mod history;
pub mod indicators;
pub mod predictor;
pub mod rebalance;
pub mod risk;
pub mod summary;

#[cfg(test)]
pub(crate) mod test_support;

pub use cache::{CacheInfo, ModelCache, RefreshOutcome, SkippedArtifact};
pub use engine::{AssetDecision, AssetOutcome, BotStatus, CycleReport, TradingEngine};
pub use history::{PriceHistories, PriceHistory};
pub use indicators::{calculate_indicators, Indicators};
pub use predictor::PredictionEngine;
pub use rebalance::{AssetAllocation, PortfolioRebalancer, RebalanceOrder, RebalanceReport};
pub use risk::{ExitDecision, ExitReason, RiskManager};
pub use summary::{ModelStats, ModelStatus, RefreshReport};
