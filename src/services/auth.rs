//! Bearer tokens for outgoing Google API calls.
//!
//! Inbound authorization is left to the hosting platform; this module only
//! supplies credentials for the storage, vision, and Vertex clients.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";
const METADATA_HEADER: &str = "Metadata-Flavor";
const METADATA_HEADER_VALUE: &str = "Google";
const EXPIRY_SAFETY_WINDOW_SECS: i64 = 300;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("metadata server request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("metadata server returned {0}")]
    Status(u16),
}

#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Access token for an `Authorization: Bearer` header.
    async fn token(&self) -> Result<String, AuthError>;
}

/// Token managed outside the process, e.g. `GOOGLE_OAUTH_ACCESS_TOKEN`.
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self) -> Result<String, AuthError> {
        Ok(self.token.clone())
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Service-account token from the GCE/Cloud Run metadata server, cached
/// until shortly before it expires.
pub struct MetadataTokenProvider {
    http: reqwest::Client,
    url: String,
    cache: Arc<Mutex<Option<CachedToken>>>,
}

impl MetadataTokenProvider {
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_url(http, METADATA_TOKEN_URL)
    }

    pub fn with_url(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
            cache: Arc::new(Mutex::new(None)),
        }
    }
}

#[async_trait]
impl TokenProvider for MetadataTokenProvider {
    async fn token(&self) -> Result<String, AuthError> {
        #[derive(Deserialize)]
        struct MetadataToken {
            access_token: String,
            expires_in: i64,
        }

        // Held across the refresh so concurrent callers share one request.
        let mut cache = self.cache.lock().await;
        let now = Utc::now();
        if let Some(cached) = cache.as_ref() {
            if cached.expires_at - Duration::seconds(EXPIRY_SAFETY_WINDOW_SECS) > now {
                return Ok(cached.token.clone());
            }
        }

        let resp = self
            .http
            .get(&self.url)
            .header(METADATA_HEADER, METADATA_HEADER_VALUE)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AuthError::Status(resp.status().as_u16()));
        }
        let fresh: MetadataToken = resp.json().await?;
        *cache = Some(CachedToken {
            token: fresh.access_token.clone(),
            expires_at: now + Duration::seconds(fresh.expires_in),
        });
        Ok(fresh.access_token)
    }
}
