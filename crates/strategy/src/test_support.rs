//! In-memory collaborators for engine tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use common::{
    Account, ArtifactRef, Broker, Error, MetadataFeed, ModelArtifact, ModelStore, ModelsMetadata,
    OrderRecord, Position, Result, Side,
};

pub fn artifact(id: &str, name: &str) -> ArtifactRef {
    ArtifactRef {
        id: id.into(),
        name: name.into(),
        modified_time: None,
    }
}

// ── Model store ───────────────────────────────────────────────────────

#[derive(Default)]
struct StoreState {
    entries: Vec<(ArtifactRef, ModelArtifact)>,
    fail_listing: bool,
    fail_auth: bool,
    failing_downloads: HashSet<String>,
    list_calls: usize,
}

#[derive(Default)]
pub struct FakeStore {
    state: Mutex<StoreState>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(self, name: &str, algorithm: &str, performance: Option<f64>) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let id = format!("f-{}", state.entries.len());
            state.entries.push((
                artifact(&id, name),
                ModelArtifact {
                    symbol: None,
                    algorithm: Some(algorithm.into()),
                    performance,
                    trained_at: Some("2025-03-01T12:00:00Z".into()),
                },
            ));
        }
        self
    }

    pub fn insert_raw(&self, artifact: ArtifactRef, algorithm: Option<&str>, trained_at: Option<&str>) {
        self.state.lock().unwrap().entries.push((
            artifact,
            ModelArtifact {
                symbol: None,
                algorithm: algorithm.map(String::from),
                performance: Some(0.1),
                trained_at: trained_at.map(String::from),
            },
        ));
    }

    pub fn remove(&self, name: &str) {
        self.state.lock().unwrap().entries.retain(|(a, _)| a.name != name);
    }

    pub fn fail_listing(&self, fail: bool) {
        self.state.lock().unwrap().fail_listing = fail;
    }

    pub fn fail_auth(&self, fail: bool) {
        self.state.lock().unwrap().fail_auth = fail;
    }

    pub fn fail_download(&self, name: &str) {
        self.state.lock().unwrap().failing_downloads.insert(name.into());
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }
}

#[async_trait]
impl ModelStore for FakeStore {
    async fn list_artifacts(&self) -> Result<Vec<ArtifactRef>> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        if state.fail_auth {
            return Err(Error::Auth("invalid_grant".into()));
        }
        if state.fail_listing {
            return Err(Error::Http("connection reset".into()));
        }
        Ok(state.entries.iter().map(|(a, _)| a.clone()).collect())
    }

    async fn download_artifact(&self, artifact: &ArtifactRef) -> Result<ModelArtifact> {
        let state = self.state.lock().unwrap();
        if state.failing_downloads.contains(&artifact.name) {
            return Err(Error::ArtifactDownload {
                name: artifact.name.clone(),
                reason: "status=500".into(),
            });
        }
        state
            .entries
            .iter()
            .find(|(a, _)| a.id == artifact.id)
            .map(|(_, body)| body.clone())
            .ok_or_else(|| Error::ArtifactDownload {
                name: artifact.name.clone(),
                reason: "status=404".into(),
            })
    }
}

// ── Metadata feed ─────────────────────────────────────────────────────

pub struct FakeFeed {
    metadata: Option<ModelsMetadata>,
    failing: Mutex<bool>,
}

impl FakeFeed {
    pub fn with_models(count: usize) -> Self {
        Self {
            metadata: Some(ModelsMetadata {
                models: (0..count).map(|i| serde_json::json!({ "index": i })).collect(),
                last_update: Some("2025-03-01T06:00:00".into()),
                training_config: Some(serde_json::json!({ "lookback_days": 30 })),
            }),
            failing: Mutex::new(false),
        }
    }

    pub fn failing() -> Self {
        Self {
            metadata: None,
            failing: Mutex::new(true),
        }
    }

    pub fn set_failing(&self, fail: bool) {
        *self.failing.lock().unwrap() = fail;
    }
}

#[async_trait]
impl MetadataFeed for FakeFeed {
    async fn fetch_metadata(&self) -> Result<ModelsMetadata> {
        if *self.failing.lock().unwrap() {
            return Err(Error::MetadataFetch("404".into()));
        }
        self.metadata
            .clone()
            .ok_or_else(|| Error::MetadataFetch("404".into()))
    }
}

// ── Broker ────────────────────────────────────────────────────────────

struct BrokerState {
    account: Account,
    positions: Vec<Position>,
    prices: HashMap<String, f64>,
    orders: Vec<(String, f64, Side)>,
    fail_account: bool,
    fail_positions: bool,
    failing_orders: HashSet<String>,
    failing_prices: HashSet<String>,
    account_calls: usize,
}

pub struct FakeBroker {
    state: Mutex<BrokerState>,
}

impl FakeBroker {
    pub fn new(buying_power: f64) -> Self {
        Self {
            state: Mutex::new(BrokerState {
                account: Account {
                    equity: buying_power,
                    buying_power,
                },
                positions: Vec::new(),
                prices: HashMap::new(),
                orders: Vec::new(),
                fail_account: false,
                fail_positions: false,
                failing_orders: HashSet::new(),
                failing_prices: HashSet::new(),
                account_calls: 0,
            }),
        }
    }

    pub fn with_price(self, symbol: &str, price: f64) -> Self {
        self.set_price(symbol, price);
        self
    }

    pub fn with_position(self, symbol: &str, qty: f64, avg_entry_price: f64, market_value: f64) -> Self {
        self.state.lock().unwrap().positions.push(Position {
            symbol: symbol.into(),
            qty,
            avg_entry_price,
            market_value: Some(market_value),
        });
        self
    }

    pub fn set_price(&self, symbol: &str, price: f64) {
        self.state.lock().unwrap().prices.insert(symbol.into(), price);
    }

    pub fn fail_account(&self, fail: bool) {
        self.state.lock().unwrap().fail_account = fail;
    }

    pub fn fail_positions(&self, fail: bool) {
        self.state.lock().unwrap().fail_positions = fail;
    }

    pub fn fail_order(&self, symbol: &str) {
        self.state.lock().unwrap().failing_orders.insert(symbol.into());
    }

    pub fn fail_price(&self, symbol: &str) {
        self.state.lock().unwrap().failing_prices.insert(symbol.into());
    }

    pub fn orders(&self) -> Vec<(String, f64, Side)> {
        self.state.lock().unwrap().orders.clone()
    }

    pub fn account_calls(&self) -> usize {
        self.state.lock().unwrap().account_calls
    }
}

#[async_trait]
impl Broker for FakeBroker {
    async fn get_account(&self) -> Result<Account> {
        let mut state = self.state.lock().unwrap();
        state.account_calls += 1;
        if state.fail_account {
            return Err(Error::Http("503 Service Unavailable".into()));
        }
        Ok(state.account.clone())
    }

    async fn get_positions(&self) -> Result<Vec<Position>> {
        let state = self.state.lock().unwrap();
        if state.fail_positions {
            return Err(Error::Http("503 Service Unavailable".into()));
        }
        Ok(state.positions.clone())
    }

    async fn get_price(&self, symbol: &str) -> Result<Option<f64>> {
        let state = self.state.lock().unwrap();
        if state.failing_prices.contains(symbol) {
            return Err(Error::Http("timeout".into()));
        }
        Ok(state.prices.get(symbol).copied())
    }

    async fn place_order(&self, symbol: &str, qty: f64, side: Side) -> Result<OrderRecord> {
        let mut state = self.state.lock().unwrap();
        if state.failing_orders.contains(symbol) {
            return Err(Error::BrokerApi {
                status: 403,
                message: "insufficient balance".into(),
            });
        }
        state.orders.push((symbol.to_string(), qty, side));
        Ok(OrderRecord {
            id: format!("order-{}", state.orders.len()),
            client_order_id: String::new(),
            symbol: symbol.to_string(),
            qty: Some(qty),
            side,
            status: "accepted".into(),
            submitted_at: None,
        })
    }
}
