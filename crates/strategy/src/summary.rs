//! Reports built from the model cache: refresh summaries, validity and
//! performance statistics, and the status view.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use common::{Model, ModelsMetadata};
use serde::Serialize;
use serde_json::Value;

use crate::cache::{CacheInfo, RefreshOutcome, SkippedArtifact};

/// A model is reportable as valid when every field the predictor reads is
/// present, including an explicit performance figure.
pub fn is_valid(model: &Model) -> bool {
    !model.symbol.is_empty()
        && !model.algorithm.is_empty()
        && model.performance.map_or(false, f64::is_finite)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BestModel {
    pub symbol: String,
    pub algorithm: String,
    pub performance_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelStats {
    pub total_models: usize,
    pub avg_performance_pct: f64,
    pub best_performance_pct: f64,
    pub worst_performance_pct: f64,
    pub best_model: Option<BestModel>,
    pub algorithms: BTreeMap<String, usize>,
}

/// Performance statistics in percent. Missing performance counts as 0.
pub fn calculate_stats(models: &[Model]) -> ModelStats {
    let mut algorithms = BTreeMap::new();
    for m in models {
        *algorithms.entry(m.algorithm.clone()).or_insert(0) += 1;
    }

    let mut best: Option<&Model> = None;
    let mut sum = 0.0;
    let mut worst = f64::INFINITY;
    for m in models {
        let pct = m.performance_or_zero() * 100.0;
        sum += pct;
        worst = worst.min(pct);
        if best.map_or(true, |b| pct > b.performance_or_zero() * 100.0) {
            best = Some(m);
        }
    }

    let best_model = best.map(|m| BestModel {
        symbol: m.symbol.clone(),
        algorithm: m.algorithm.clone(),
        performance_pct: m.performance_or_zero() * 100.0,
    });

    ModelStats {
        total_models: models.len(),
        avg_performance_pct: if models.is_empty() { 0.0 } else { sum / models.len() as f64 },
        best_performance_pct: best_model.as_ref().map_or(0.0, |b| b.performance_pct),
        worst_performance_pct: if models.is_empty() { 0.0 } else { worst },
        best_model,
        algorithms,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary {
    pub symbol: String,
    pub algorithm: String,
    pub performance_pct: f64,
    pub trained_at: DateTime<Utc>,
    pub valid: bool,
}

impl From<&Model> for ModelSummary {
    fn from(m: &Model) -> Self {
        Self {
            symbol: m.symbol.clone(),
            algorithm: m.algorithm.clone(),
            performance_pct: m.performance_or_zero() * 100.0,
            trained_at: m.trained_at,
            valid: is_valid(m),
        }
    }
}

/// Result of an explicit model refresh.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub models_count: usize,
    pub last_update: Option<DateTime<Utc>>,
    pub metadata: Option<ModelsMetadata>,
    pub models: Vec<ModelSummary>,
    pub statistics: ModelStats,
    pub all_valid: bool,
    pub listed: usize,
    pub skipped: Vec<SkippedArtifact>,
    pub execution_time_ms: u64,
    pub next_update: Option<DateTime<Utc>>,
    /// Set when the store listed no loadable models.
    pub warning: Option<String>,
}

impl RefreshReport {
    pub fn build(
        outcome: RefreshOutcome,
        info: CacheInfo,
        refresh_interval: Duration,
        execution_time_ms: u64,
    ) -> Self {
        let models: Vec<ModelSummary> = info.models.iter().map(ModelSummary::from).collect();
        let warning = if models.is_empty() {
            Some("no models found in the model store".to_string())
        } else {
            None
        };

        Self {
            models_count: info.total_models,
            last_update: info.last_update,
            metadata: info.metadata,
            all_valid: models.iter().all(|m| m.valid),
            statistics: calculate_stats(&info.models),
            models,
            listed: outcome.listed,
            skipped: outcome.skipped,
            execution_time_ms,
            next_update: info.last_update.map(|ts| ts + refresh_interval),
            warning,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataSummary {
    pub last_training: Option<String>,
    pub training_config: Option<Value>,
}

/// Point-in-time view of the cache for monitoring.
#[derive(Debug, Clone, Serialize)]
pub struct ModelStatus {
    pub models_loaded: bool,
    pub total_models: usize,
    pub last_update: Option<DateTime<Utc>>,
    pub minutes_since_update: Option<i64>,
    pub needs_refresh: bool,
    pub metadata: Option<MetadataSummary>,
    pub models: Vec<Model>,
}

impl ModelStatus {
    pub fn from_info(info: CacheInfo, needs_refresh: bool, now: DateTime<Utc>) -> Self {
        Self {
            models_loaded: info.total_models > 0,
            total_models: info.total_models,
            last_update: info.last_update,
            minutes_since_update: info.last_update.map(|ts| (now - ts).num_minutes()),
            needs_refresh,
            metadata: info.metadata.map(|m| MetadataSummary {
                last_training: m.last_update,
                training_config: m.training_config,
            }),
            models: info.models,
        }
    }
}
