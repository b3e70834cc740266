//! Unified error type for the scalper bot.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Auth error: {0}")]
    Auth(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Alpaca API error (status={status}): {message}")]
    BrokerApi { status: u16, message: String },

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Artifact listing failed: {0}")]
    ArtifactListing(String),

    #[error("Artifact download failed for {name}: {reason}")]
    ArtifactDownload { name: String, reason: String },

    #[error("Malformed model artifact {name}: {reason}")]
    MalformedArtifact { name: String, reason: String },

    #[error("Metadata fetch failed: {0}")]
    MetadataFetch(String),

    #[error("Price unavailable for {0}")]
    PriceUnavailable(String),

    #[error("Order placement failed for {symbol}: {reason}")]
    OrderPlacement { symbol: String, reason: String },

    #[error("Account query failed: {0}")]
    AccountQuery(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Errors in shared state acquisition abort the whole trading cycle.
    /// Everything else stays isolated to the asset that raised it.
    pub fn is_cycle_fatal(&self) -> bool {
        matches!(self, Error::AccountQuery(_) | Error::Auth(_))
    }
}
