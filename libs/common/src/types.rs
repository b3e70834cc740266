//! Domain types shared across the bot.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// ── Numeric helpers ───────────────────────────────────────────────────

/// Alpaca encodes most decimals as JSON strings; accept either form.
pub fn de_decimal<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Num(n) => Ok(n),
        Raw::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| serde::de::Error::custom(format!("invalid decimal: {s:?}"))),
    }
}

fn de_opt_decimal<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(f64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Num(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid decimal: {s:?}"))),
    }
}

/// Parse a trainer timestamp. Accepts RFC 3339 and naive ISO-8601
/// (interpreted as UTC), with or without fractional seconds.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Strip the pair separator so `BTC/USD` and `BTCUSD` compare equal.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.replace('/', "").to_ascii_uppercase()
}

// ── Broker Types ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

/// Account snapshot from GET /v2/account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    #[serde(deserialize_with = "de_decimal")]
    pub equity: f64,
    #[serde(deserialize_with = "de_decimal")]
    pub buying_power: f64,
}

/// An open position as returned by GET /v2/positions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    #[serde(deserialize_with = "de_decimal")]
    pub qty: f64,
    #[serde(deserialize_with = "de_decimal")]
    pub avg_entry_price: f64,
    #[serde(default, deserialize_with = "de_opt_decimal")]
    pub market_value: Option<f64>,
}

impl Position {
    /// Whether this position belongs to `symbol`, tolerating the
    /// slash-less form the broker reports crypto positions under.
    pub fn matches(&self, symbol: &str) -> bool {
        normalize_symbol(&self.symbol) == normalize_symbol(symbol)
    }
}

/// Find the position held for `symbol`, if any.
pub fn find_position<'a>(positions: &'a [Position], symbol: &str) -> Option<&'a Position> {
    positions.iter().find(|p| p.matches(symbol))
}

/// An order as acknowledged by the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: String,
    #[serde(default)]
    pub client_order_id: String,
    pub symbol: String,
    #[serde(default, deserialize_with = "de_opt_decimal")]
    pub qty: Option<f64>,
    pub side: Side,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
}

// ── Signal Types ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

/// A trade signal produced fresh for every evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct Signal {
    pub action: Action,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub target_price: f64,
    /// Training return of the backing model, 0 for the fallback heuristic.
    pub model_performance: f64,
    pub algorithm: String,
    pub trained_at: Option<DateTime<Utc>>,
}

// ── Model Types ───────────────────────────────────────────────────────

/// A model artifact entry from the store listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub id: String,
    pub name: String,
    #[serde(default, rename = "modifiedTime")]
    pub modified_time: Option<DateTime<Utc>>,
}

/// Raw artifact body as written by the training pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub algorithm: Option<String>,
    #[serde(default)]
    pub performance: Option<f64>,
    #[serde(default)]
    pub trained_at: Option<String>,
}

/// A validated, immutable per-symbol prediction model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Model {
    pub symbol: String,
    pub algorithm: String,
    /// Fractional training return (0.12 = 12%). Absent means 0.
    pub performance: Option<f64>,
    pub trained_at: DateTime<Utc>,
    pub file_name: String,
    pub last_modified: Option<DateTime<Utc>>,
}

impl Model {
    /// Validate a downloaded artifact. `algorithm` and a parseable
    /// `trained_at` are required; `performance` may be absent.
    pub fn from_artifact(
        symbol: &str,
        artifact: ModelArtifact,
        source: &ArtifactRef,
    ) -> Result<Self, crate::Error> {
        let malformed = |reason: &str| crate::Error::MalformedArtifact {
            name: source.name.clone(),
            reason: reason.to_string(),
        };

        let algorithm = artifact
            .algorithm
            .filter(|a| !a.trim().is_empty())
            .ok_or_else(|| malformed("missing algorithm"))?;
        let raw_ts = artifact
            .trained_at
            .ok_or_else(|| malformed("missing trained_at"))?;
        let trained_at =
            parse_timestamp(&raw_ts).ok_or_else(|| malformed("unparseable trained_at"))?;
        if let Some(p) = artifact.performance {
            if !p.is_finite() {
                return Err(malformed("non-finite performance"));
            }
        }

        Ok(Self {
            symbol: symbol.to_string(),
            algorithm,
            performance: artifact.performance,
            trained_at,
            file_name: source.name.clone(),
            last_modified: source.modified_time,
        })
    }

    /// Recorded training return, defaulting to 0 when the trainer omitted it.
    pub fn performance_or_zero(&self) -> f64 {
        self.performance.unwrap_or(0.0)
    }
}

/// Map an artifact file name to its trading symbol:
/// `BTC_USD_model.json` → `BTC/USD`.
pub fn symbol_from_artifact_name(name: &str) -> String {
    name.replacen("_model.json", "", 1).replacen('_', "/", 1)
}

/// Global training metadata published next to the models.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelsMetadata {
    #[serde(default)]
    pub models: Vec<serde_json::Value>,
    #[serde(default)]
    pub last_update: Option<String>,
    #[serde(default)]
    pub training_config: Option<serde_json::Value>,
}
