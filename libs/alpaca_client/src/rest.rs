//! REST client for the Alpaca API.
//!
//! Covers: account and position queries, latest crypto bars, order entry.
//! All methods are rate-limited and authenticated with the key/secret
//! header pair.

use std::collections::HashMap;
use std::error::Error as StdError;

use async_trait::async_trait;
use common::config::AlpacaConfig;
use common::{Account, Broker, Error, OrderRecord, Position, Side};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::rate_limit::RateLimiter;

const PAPER_BASE_URL: &str = "https://paper-api.alpaca.markets";
const LIVE_BASE_URL: &str = "https://api.alpaca.markets";
const DATA_BASE_URL: &str = "https://data.alpaca.markets";

fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

fn resolve_base_url(override_url: Option<&str>, default: &str) -> String {
    match override_url.map(normalize_base_url) {
        Some(url) if !url.is_empty() => {
            info!("Using Alpaca base URL override: {}", url);
            url
        }
        Some(_) => {
            warn!("Ignoring empty Alpaca base URL override");
            default.to_string()
        }
        None => default.to_string(),
    }
}

fn format_reqwest_error(err: &reqwest::Error) -> String {
    // Keep chained causes so network failures (DNS/TLS/socket) are visible.
    let mut message = err.to_string();
    let mut source = err.source();

    while let Some(cause) = source {
        let cause_msg = cause.to_string();
        if !cause_msg.is_empty() && !message.contains(&cause_msg) {
            message.push_str(": ");
            message.push_str(&cause_msg);
        }
        source = cause.source();
    }

    message
}

/// Alpaca accepts fractional crypto quantities up to 9 dp; 8 matches the
/// precision the rest of the bot reasons in.
pub fn format_qty(qty: f64) -> String {
    format!("{:.8}", qty)
}

/// Order request body for POST /v2/orders.
#[derive(Debug, Clone, Serialize)]
struct CreateOrderRequest<'a> {
    symbol: &'a str,
    qty: String,
    side: Side,
    #[serde(rename = "type")]
    order_type: &'static str,
    time_in_force: &'static str,
    client_order_id: String,
}

#[derive(Debug, Deserialize)]
struct LatestBarsResponse {
    #[serde(default)]
    bars: HashMap<String, Bar>,
}

#[derive(Debug, Deserialize)]
struct Bar {
    /// Close.
    c: f64,
}

/// Async REST client for the Alpaca trading API.
#[derive(Debug, Clone)]
pub struct AlpacaRestClient {
    client: reqwest::Client,
    headers: HeaderMap,
    base_url: String,
    data_url: String,
    limiter: RateLimiter,
}

impl AlpacaRestClient {
    /// Create a new REST client from the `[alpaca]` config section.
    pub fn new(cfg: &AlpacaConfig) -> Result<Self, Error> {
        if cfg.api_key.trim().is_empty() || cfg.secret_key.trim().is_empty() {
            return Err(Error::Auth("Alpaca API key and secret are required".into()));
        }

        let default_base = if cfg.paper { PAPER_BASE_URL } else { LIVE_BASE_URL };
        let base_url = resolve_base_url(cfg.base_url.as_deref(), default_base);
        let data_url = resolve_base_url(cfg.data_url.as_deref(), DATA_BASE_URL);

        let mut headers = HeaderMap::new();
        headers.insert(
            "APCA-API-KEY-ID",
            HeaderValue::from_str(cfg.api_key.trim())
                .map_err(|e| Error::Auth(format!("invalid API key header: {e}")))?,
        );
        let mut secret = HeaderValue::from_str(cfg.secret_key.trim())
            .map_err(|e| Error::Auth(format!("invalid secret header: {e}")))?;
        secret.set_sensitive(true);
        headers.insert("APCA-API-SECRET-KEY", secret);

        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .tcp_keepalive(std::time::Duration::from_secs(30))
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .map_err(|e| Error::Http(format_reqwest_error(&e)))?;

        Ok(Self {
            client,
            headers,
            base_url,
            data_url,
            limiter: RateLimiter::new(),
        })
    }

    /// URL helper.
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, Error> {
        let status_code = resp.status().as_u16();
        if status_code == 429 {
            warn!("Rate limited by Alpaca");
            return Err(Error::RateLimited { retry_after_ms: 1000 });
        }
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::BrokerApi {
                status: status_code,
                message: body,
            });
        }
        Ok(resp)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: String) -> Result<T, Error> {
        self.limiter.wait_read().await;

        let resp = self
            .client
            .get(url)
            .headers(self.headers.clone())
            .send()
            .await
            .map_err(|e| Error::Http(format_reqwest_error(&e)))?;

        Self::check_status(resp)
            .await?
            .json()
            .await
            .map_err(|e| Error::Http(format_reqwest_error(&e)))
    }

    // ── Read endpoints ────────────────────────────────────────────────

    /// Fetch equity and buying power.
    pub async fn account(&self) -> Result<Account, Error> {
        self.get_json(self.url("/v2/account")).await
    }

    /// Fetch all open positions.
    pub async fn positions(&self) -> Result<Vec<Position>, Error> {
        let positions: Vec<Position> = self.get_json(self.url("/v2/positions")).await?;
        debug!("Fetched {} positions", positions.len());
        Ok(positions)
    }

    /// Close of the most recent one-minute bar for a crypto pair.
    pub async fn latest_crypto_close(&self, symbol: &str) -> Result<Option<f64>, Error> {
        self.limiter.wait_read().await;

        let resp = self
            .client
            .get(format!("{}/v1beta3/crypto/us/latest/bars", self.data_url))
            .headers(self.headers.clone())
            .query(&[("symbols", symbol)])
            .send()
            .await
            .map_err(|e| Error::Http(format_reqwest_error(&e)))?;

        let body: LatestBarsResponse = Self::check_status(resp)
            .await?
            .json()
            .await
            .map_err(|e| Error::Http(format_reqwest_error(&e)))?;

        Ok(body.bars.get(symbol).map(|bar| bar.c))
    }

    /// Fetch orders that are still working.
    pub async fn open_orders(&self) -> Result<Vec<OrderRecord>, Error> {
        self.get_json(self.url("/v2/orders?status=open")).await
    }

    // ── Write endpoints ───────────────────────────────────────────────

    /// Place a market, good-till-canceled order.
    pub async fn create_order(&self, symbol: &str, qty: f64, side: Side) -> Result<OrderRecord, Error> {
        self.limiter.wait_write().await;

        let body = CreateOrderRequest {
            symbol,
            qty: format_qty(qty),
            side,
            order_type: "market",
            time_in_force: "gtc",
            client_order_id: Uuid::new_v4().to_string(),
        };

        debug!(
            "Creating order: {} {} x{} ({})",
            side.as_str(),
            symbol,
            body.qty,
            body.client_order_id,
        );

        let resp = self
            .client
            .post(self.url("/v2/orders"))
            .headers(self.headers.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Http(format_reqwest_error(&e)))?;

        let order: OrderRecord = Self::check_status(resp)
            .await?
            .json()
            .await
            .map_err(|e| Error::Http(format_reqwest_error(&e)))?;

        info!(
            "Order {} accepted: {} {} x{} status={}",
            order.id,
            side.as_str(),
            symbol,
            body.qty,
            order.status,
        );

        Ok(order)
    }

    /// Cancel every open order.
    pub async fn cancel_all_orders(&self) -> Result<(), Error> {
        self.limiter.wait_write().await;

        let resp = self
            .client
            .delete(self.url("/v2/orders"))
            .headers(self.headers.clone())
            .send()
            .await
            .map_err(|e| Error::Http(format_reqwest_error(&e)))?;

        Self::check_status(resp).await?;
        info!("Cancelled all open orders");
        Ok(())
    }
}

#[async_trait]
impl Broker for AlpacaRestClient {
    async fn get_account(&self) -> Result<Account, Error> {
        self.account().await
    }

    async fn get_positions(&self) -> Result<Vec<Position>, Error> {
        self.positions().await
    }

    async fn get_price(&self, symbol: &str) -> Result<Option<f64>, Error> {
        self.latest_crypto_close(symbol).await
    }

    async fn place_order(&self, symbol: &str, qty: f64, side: Side) -> Result<OrderRecord, Error> {
        self.create_order(symbol, qty, side).await
    }
}
