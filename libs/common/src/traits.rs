//! Collaborator seams consumed by the decision engine.
//!
//! Concrete network clients live in `alpaca_client` and `model_store`;
//! tests substitute in-memory fakes.

use async_trait::async_trait;

use crate::types::{Account, ArtifactRef, ModelArtifact, ModelsMetadata, OrderRecord, Position, Side};
use crate::Result;

/// Brokerage execution client.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn get_account(&self) -> Result<Account>;

    async fn get_positions(&self) -> Result<Vec<Position>>;

    /// Latest traded price, or `None` when the feed has nothing for `symbol`.
    async fn get_price(&self, symbol: &str) -> Result<Option<f64>>;

    /// Market order, good-till-canceled.
    async fn place_order(&self, symbol: &str, qty: f64, side: Side) -> Result<OrderRecord>;
}

/// Remote store holding one trained artifact per symbol.
#[async_trait]
pub trait ModelStore: Send + Sync {
    /// List every artifact in the model folder, newest first.
    async fn list_artifacts(&self) -> Result<Vec<ArtifactRef>>;

    async fn download_artifact(&self, artifact: &ArtifactRef) -> Result<ModelArtifact>;
}

/// Best-effort source of global training metadata.
#[async_trait]
pub trait MetadataFeed: Send + Sync {
    async fn fetch_metadata(&self) -> Result<ModelsMetadata>;
}
