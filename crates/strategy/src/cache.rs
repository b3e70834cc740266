//! Per-symbol model cache with all-or-nothing refresh.
//!
//! A single `last_update` covers every symbol: the mapping is rebuilt from
//! the store listing and swapped in whole, never patched per symbol.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use common::{
    symbol_from_artifact_name, Error, MetadataFeed, Model, ModelStore, ModelsMetadata,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::summary::{ModelStatus, RefreshReport};

const ARTIFACT_SUFFIX: &str = "_model.json";

/// An artifact that was listed but not loaded.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedArtifact {
    pub name: String,
    pub reason: String,
}

/// What a successful refresh did.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshOutcome {
    pub listed: usize,
    pub loaded: usize,
    pub skipped: Vec<SkippedArtifact>,
    pub metadata_refreshed: bool,
    pub completed_at: DateTime<Utc>,
}

/// Read-only projection of the cache.
#[derive(Debug, Clone, Serialize)]
pub struct CacheInfo {
    pub total_models: usize,
    pub last_update: Option<DateTime<Utc>>,
    pub metadata: Option<ModelsMetadata>,
    pub models: Vec<Model>,
}

pub struct ModelCache {
    models: BTreeMap<String, Model>,
    last_update: Option<DateTime<Utc>>,
    metadata: Option<ModelsMetadata>,
    refresh_interval: Duration,
    store: Arc<dyn ModelStore>,
    feed: Option<Arc<dyn MetadataFeed>>,
}

impl std::fmt::Debug for ModelCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelCache")
            .field("models", &self.models.keys().collect::<Vec<_>>())
            .field("last_update", &self.last_update)
            .field("refresh_interval", &self.refresh_interval)
            .finish()
    }
}

impl ModelCache {
    pub fn new(
        store: Arc<dyn ModelStore>,
        feed: Option<Arc<dyn MetadataFeed>>,
        refresh_interval_secs: u64,
    ) -> Self {
        Self {
            models: BTreeMap::new(),
            last_update: None,
            metadata: None,
            refresh_interval: Duration::seconds(refresh_interval_secs as i64),
            store,
            feed,
        }
    }

    /// Reload metadata and every model artifact.
    ///
    /// Metadata is best-effort. A failed listing leaves the cache untouched
    /// and is returned to the caller; individual download failures only
    /// drop that symbol from the new mapping.
    pub async fn refresh(&mut self) -> Result<RefreshOutcome, Error> {
        let metadata = match &self.feed {
            Some(feed) => match feed.fetch_metadata().await {
                Ok(m) => Some(m),
                Err(e) => {
                    warn!("Metadata fetch failed, keeping previous metadata: {}", e);
                    None
                }
            },
            None => None,
        };

        let artifacts = self.store.list_artifacts().await.map_err(|e| match e {
            Error::Auth(_) | Error::ArtifactListing(_) => e,
            other => Error::ArtifactListing(other.to_string()),
        })?;

        let mut models = BTreeMap::new();
        let mut skipped = Vec::new();
        let mut seen = HashSet::new();

        for artifact in &artifacts {
            if !artifact.name.ends_with(ARTIFACT_SUFFIX) {
                debug!("Ignoring non-model file {}", artifact.name);
                skipped.push(SkippedArtifact {
                    name: artifact.name.clone(),
                    reason: "not a model artifact".into(),
                });
                continue;
            }

            // Listing is newest first; keep the first artifact per symbol.
            let symbol = symbol_from_artifact_name(&artifact.name);
            if !seen.insert(symbol.clone()) {
                debug!("Skipping older artifact {} for {}", artifact.name, symbol);
                skipped.push(SkippedArtifact {
                    name: artifact.name.clone(),
                    reason: format!("superseded by a newer artifact for {symbol}"),
                });
                continue;
            }

            let loaded = self
                .store
                .download_artifact(artifact)
                .await
                .and_then(|body| Model::from_artifact(&symbol, body, artifact));

            match loaded {
                Ok(model) => {
                    info!(
                        "Model loaded: {} ({}, performance={:.2}%)",
                        symbol,
                        model.algorithm,
                        model.performance_or_zero() * 100.0
                    );
                    models.insert(symbol, model);
                }
                Err(e) => {
                    warn!("Skipping artifact {}: {}", artifact.name, e);
                    skipped.push(SkippedArtifact {
                        name: artifact.name.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let completed_at = Utc::now();
        let loaded = models.len();
        let metadata_refreshed = metadata.is_some();

        self.models = models;
        self.last_update = Some(completed_at);
        if metadata.is_some() {
            self.metadata = metadata;
        }

        info!(
            "Models refreshed: {} loaded / {} listed [{}]",
            loaded,
            artifacts.len(),
            self.models.keys().cloned().collect::<Vec<_>>().join(", ")
        );

        Ok(RefreshOutcome {
            listed: artifacts.len(),
            loaded,
            skipped,
            metadata_refreshed,
            completed_at,
        })
    }

    /// True when never refreshed or the last refresh is older than the
    /// refresh interval.
    pub fn is_stale(&self) -> bool {
        self.is_stale_at(Utc::now())
    }

    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        match self.last_update {
            None => true,
            Some(ts) => now - ts > self.refresh_interval,
        }
    }

    pub fn get(&self, symbol: &str) -> Option<&Model> {
        self.models.get(symbol)
    }

    pub fn info(&self) -> CacheInfo {
        CacheInfo {
            total_models: self.models.len(),
            last_update: self.last_update,
            metadata: self.metadata.clone(),
            models: self.models.values().cloned().collect(),
        }
    }

    pub fn symbols(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    pub fn metadata(&self) -> Option<&ModelsMetadata> {
        self.metadata.as_ref()
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// Force a refresh regardless of staleness and summarise the result.
    pub async fn refresh_report(&mut self) -> Result<RefreshReport, Error> {
        let started = Instant::now();
        let outcome = self.refresh().await?;
        let report = RefreshReport::build(
            outcome,
            self.info(),
            self.refresh_interval,
            started.elapsed().as_millis() as u64,
        );

        info!(
            "✅ Models refreshed: {} loaded, avg performance {:.2}%",
            report.models_count, report.statistics.avg_performance_pct
        );
        if let Some(best) = &report.statistics.best_model {
            info!("   best model: {} ({:.2}%)", best.symbol, best.performance_pct);
        }
        Ok(report)
    }

    /// Freshness report. Populates the cache first if it was never loaded.
    pub async fn status(&mut self) -> Result<ModelStatus, Error> {
        if self.last_update.is_none() {
            info!("📥 Model cache empty, loading before reporting status");
            self.refresh().await?;
        }
        Ok(ModelStatus::from_info(self.info(), self.is_stale(), Utc::now()))
    }

    /// Forget everything; the next prediction triggers a refresh.
    pub fn reset(&mut self) {
        self.models.clear();
        self.last_update = None;
        self.metadata = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{artifact, FakeFeed, FakeStore};

    fn cache_with(store: FakeStore, feed: Option<FakeFeed>) -> (ModelCache, Arc<FakeStore>) {
        let store = Arc::new(store);
        let feed = feed.map(|f| Arc::new(f) as Arc<dyn MetadataFeed>);
        (ModelCache::new(store.clone(), feed, 1800), store)
    }

    #[tokio::test]
    async fn test_fresh_after_refresh_then_stale_after_interval() {
        let (mut cache, _) = cache_with(
            FakeStore::new().with_model("BTC_USD_model.json", "random_forest", Some(0.12)),
            None,
        );
        assert!(cache.is_stale(), "never-refreshed cache is stale");
        assert!(cache.last_update().is_none());

        let outcome = cache.refresh().await.unwrap();
        assert_eq!(outcome.loaded, 1);
        assert!(!cache.is_stale());

        let done = cache.last_update().unwrap();
        assert!(!cache.is_stale_at(done + Duration::minutes(29)));
        assert!(!cache.is_stale_at(done + Duration::minutes(30)));
        assert!(cache.is_stale_at(done + Duration::minutes(31)));
    }

    #[tokio::test]
    async fn test_failed_listing_leaves_cache_unchanged() {
        let (mut cache, store) = cache_with(
            FakeStore::new()
                .with_model("BTC_USD_model.json", "random_forest", Some(0.12))
                .with_model("ETH_USD_model.json", "xgboost", Some(0.08)),
            Some(FakeFeed::with_models(2)),
        );
        cache.refresh().await.unwrap();
        let before = cache.info();

        store.fail_listing(true);
        let err = cache.refresh().await.unwrap_err();
        assert!(matches!(err, Error::ArtifactListing(_)));

        let after = cache.info();
        assert_eq!(after.models, before.models);
        assert_eq!(after.last_update, before.last_update);
        assert_eq!(after.metadata, before.metadata);
    }

    #[tokio::test]
    async fn test_auth_failure_surfaces_as_auth() {
        let (mut cache, store) = cache_with(FakeStore::new(), None);
        store.fail_auth(true);
        let err = cache.refresh().await.unwrap_err();
        assert!(err.is_cycle_fatal());
        assert!(cache.last_update().is_none());
    }

    #[tokio::test]
    async fn test_partial_download_failure_keeps_the_rest() {
        let (mut cache, store) = cache_with(
            FakeStore::new()
                .with_model("BTC_USD_model.json", "random_forest", Some(0.12))
                .with_model("ETH_USD_model.json", "xgboost", Some(0.08))
                .with_model("DOGE_USD_model.json", "lstm", Some(0.2)),
            None,
        );
        store.fail_download("ETH_USD_model.json");

        let outcome = cache.refresh().await.unwrap();
        assert_eq!(outcome.listed, 3);
        assert_eq!(outcome.loaded, 2);
        assert_eq!(outcome.skipped.len(), 1);
        assert!(cache.get("BTC/USD").is_some());
        assert!(cache.get("ETH/USD").is_none());
        assert!(cache.get("DOGE/USD").is_some());
        assert!(cache.last_update().is_some());
    }

    #[tokio::test]
    async fn test_refresh_replaces_mapping_wholesale() {
        let (mut cache, store) = cache_with(
            FakeStore::new()
                .with_model("BTC_USD_model.json", "random_forest", Some(0.12))
                .with_model("LTC_USD_model.json", "xgboost", Some(0.05)),
            None,
        );
        cache.refresh().await.unwrap();
        assert_eq!(cache.symbols(), vec!["BTC/USD", "LTC/USD"]);

        store.remove("LTC_USD_model.json");
        cache.refresh().await.unwrap();
        assert_eq!(cache.symbols(), vec!["BTC/USD"]);
    }

    #[tokio::test]
    async fn test_malformed_artifact_is_skipped() {
        let store = FakeStore::new().with_model("BTC_USD_model.json", "random_forest", Some(0.12));
        store.insert_raw(artifact("f-bad", "ETH_USD_model.json"), None, Some("2025-01-01T00:00:00"));
        let (mut cache, _) = cache_with(store, None);

        let outcome = cache.refresh().await.unwrap();
        assert_eq!(outcome.loaded, 1);
        assert!(outcome.skipped[0].reason.contains("missing algorithm"));
    }

    #[tokio::test]
    async fn test_metadata_failure_is_not_fatal() {
        let feed = FakeFeed::with_models(3);
        let (mut cache, _) = cache_with(
            FakeStore::new().with_model("BTC_USD_model.json", "random_forest", Some(0.12)),
            Some(feed),
        );
        let outcome = cache.refresh().await.unwrap();
        assert!(outcome.metadata_refreshed);
        assert_eq!(cache.metadata().map(|m| m.models.len()), Some(3));

        let (mut cache, _) = cache_with(
            FakeStore::new().with_model("BTC_USD_model.json", "random_forest", Some(0.12)),
            Some(FakeFeed::failing()),
        );
        let outcome = cache.refresh().await.unwrap();
        assert!(!outcome.metadata_refreshed);
        assert!(cache.metadata().is_none());
        assert_eq!(outcome.loaded, 1);
    }

    #[tokio::test]
    async fn test_metadata_failure_keeps_previous_metadata() {
        let feed = Arc::new(FakeFeed::with_models(1));
        let store = Arc::new(
            FakeStore::new().with_model("BTC_USD_model.json", "random_forest", Some(0.12)),
        );
        let mut cache = ModelCache::new(store, Some(feed.clone() as Arc<dyn MetadataFeed>), 1800);

        cache.refresh().await.unwrap();
        let before = cache.metadata().cloned();
        assert_eq!(before.as_ref().map(|m| m.models.len()), Some(1));

        feed.set_failing(true);
        let outcome = cache.refresh().await.unwrap();
        assert!(!outcome.metadata_refreshed);
        assert_eq!(outcome.loaded, 1);
        assert_eq!(cache.metadata().cloned(), before);
    }

    #[tokio::test]
    async fn test_non_model_files_are_ignored() {
        let store = FakeStore::new().with_model("BTC_USD_model.json", "random_forest", Some(0.12));
        store.insert_raw(artifact("f-meta", "models_metadata.json"), Some("n/a"), Some("2025-01-01T00:00:00"));
        let (mut cache, _) = cache_with(store, None);

        cache.refresh().await.unwrap();
        assert_eq!(cache.symbols(), vec!["BTC/USD"]);
    }

    #[tokio::test]
    async fn test_reset_forces_staleness() {
        let (mut cache, _) = cache_with(
            FakeStore::new().with_model("BTC_USD_model.json", "random_forest", Some(0.12)),
            None,
        );
        cache.refresh().await.unwrap();
        cache.reset();
        assert!(cache.is_stale());
        assert_eq!(cache.info().total_models, 0);
    }
}
