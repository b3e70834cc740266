//! Service-account OAuth for the Drive API.
//!
//! Assertion format: `base64url(header).base64url(claims)` signed with
//! RSASSA-PKCS1-v1_5 / SHA-256, exchanged at the token endpoint for a
//! bearer token that is cached until shortly before expiry.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::{Signature, SigningKey};
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{RandomizedSigner, SignatureEncoding};
use rsa::RsaPrivateKey;
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use tokio::sync::Mutex;
use tracing::{debug, info};

use common::Error;

use crate::{format_reqwest_error, http_client};

const DRIVE_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Refresh the bearer token this long before it expires.
const EXPIRY_MARGIN_SECS: i64 = 60;

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// Subset of the downloaded service-account key file.
#[derive(Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_LIFETIME_SECS
}

#[derive(Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Holds the service-account identity and the parsed RSA signing key.
#[derive(Clone)]
pub struct ServiceAccountAuth {
    pub client_email: String,
    token_uri: String,
    signing_key: SigningKey<Sha256>,
    client: reqwest::Client,
    token: Arc<Mutex<Option<CachedToken>>>,
}

impl std::fmt::Debug for ServiceAccountAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountAuth")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .field("signing_key", &"<redacted>")
            .finish()
    }
}

impl ServiceAccountAuth {
    /// Create from the raw key-file JSON.
    ///
    /// The embedded PEM may contain literal `\n` (two chars) instead of real
    /// newlines when it was pasted into an env var; both forms are accepted.
    pub fn from_json(credentials: &str) -> Result<Self, Error> {
        if credentials.trim().is_empty() {
            return Err(Error::Auth("Drive credentials are not configured".into()));
        }
        let key: ServiceAccountKey = serde_json::from_str(credentials)
            .map_err(|e| Error::Auth(format!("Failed to parse service-account JSON: {e}")))?;

        let pem = key.private_key.replace("\\n", "\n");
        let pem = pem.trim();

        let private_key = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| Error::Auth(format!("Failed to parse RSA private key: {e}")))?;

        Ok(Self {
            client_email: key.client_email,
            token_uri: key.token_uri,
            signing_key: SigningKey::<Sha256>::new(private_key),
            client: http_client()?,
            token: Arc::new(Mutex::new(None)),
        })
    }

    /// Build a signed JWT-bearer assertion issued at `now`.
    pub fn build_assertion(&self, now: DateTime<Utc>) -> String {
        let iat = now.timestamp();
        let header = json!({ "alg": "RS256", "typ": "JWT" });
        let claims = json!({
            "iss": self.client_email,
            "scope": DRIVE_READONLY_SCOPE,
            "aud": self.token_uri,
            "iat": iat,
            "exp": iat + ASSERTION_LIFETIME_SECS,
        });

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header.to_string()),
            URL_SAFE_NO_PAD.encode(claims.to_string()),
        );

        let mut rng = rand::thread_rng();
        let signature: Signature = self
            .signing_key
            .sign_with_rng(&mut rng, signing_input.as_bytes());

        format!("{}.{}", signing_input, URL_SAFE_NO_PAD.encode(signature.to_bytes()))
    }

    /// Return a valid bearer token, exchanging a fresh assertion if needed.
    pub async fn access_token(&self) -> Result<String, Error> {
        let mut guard = self.token.lock().await;
        let now = Utc::now();

        if let Some(cached) = guard.as_ref() {
            if cached.expires_at - Duration::seconds(EXPIRY_MARGIN_SECS) > now {
                return Ok(cached.value.clone());
            }
        }

        debug!("Requesting Drive access token for {}", self.client_email);
        let assertion = self.build_assertion(now);

        let resp = self
            .client
            .post(&self.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::Http(format_reqwest_error(&e)))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Auth(format!("token exchange rejected ({status}): {body}")));
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| Error::Auth(format_reqwest_error(&e)))?;

        info!("Drive access token acquired (expires in {}s)", token.expires_in);
        *guard = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: now + Duration::seconds(token.expires_in),
        });

        Ok(token.access_token)
    }
}
