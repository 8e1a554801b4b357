//! OAuth2-protected webhook sink.
//!
//! Obtains a bearer token via the client-credentials grant, then posts
//! the completion notice as JSON to the target URL. Tokens for the
//! default identity are cached in-process with a 55-minute safety
//! lifetime; per-call overrides of client id or scope bypass the cache
//! and fetch a fresh token.

use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{NotifyError, Result};

const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Cached-token safety lifetime, kept below typical 60-minute expiries.
const TOKEN_LIFETIME: Duration = Duration::from_secs(55 * 60);

/// Capability for delivering a completion notice to a webhook target.
#[async_trait::async_trait]
pub trait WebhookSink: Send + Sync {
    /// Posts `payload` to `url`, optionally overriding the OAuth client
    /// id or scope for this call.
    ///
    /// # Errors
    ///
    /// Returns an error on token fetch failure, transport failure, or a
    /// response outside the 2xx/3xx range.
    async fn send(
        &self,
        url: &str,
        payload: &Value,
        client_id_override: Option<&str>,
        scope_override: Option<&str>,
    ) -> Result<()>;
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_live(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Webhook client using the OAuth2 client-credentials grant.
pub struct OAuthWebhookClient {
    token_url: String,
    client_id: String,
    client_secret: String,
    scope: String,
    client: reqwest::Client,
    cache: RwLock<Option<CachedToken>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl OAuthWebhookClient {
    /// Creates a webhook client for the given token endpoint and
    /// default credential.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        scope: impl Into<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(CLIENT_TIMEOUT).build()?;
        Ok(Self {
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: scope.into(),
            client,
            cache: RwLock::new(None),
        })
    }

    async fn bearer_token(
        &self,
        client_id_override: Option<&str>,
        scope_override: Option<&str>,
    ) -> Result<String> {
        // Overrides never touch the shared cache; the cached entry is
        // only valid for the default identity.
        if client_id_override.is_some() || scope_override.is_some() {
            return self.fetch_token(client_id_override, scope_override).await;
        }

        if let Some(cached) = self.cache.read().await.as_ref() {
            if cached.is_live() {
                return Ok(cached.token.clone());
            }
        }

        let mut cache = self.cache.write().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(cached) = cache.as_ref() {
            if cached.is_live() {
                return Ok(cached.token.clone());
            }
        }

        let token = self.fetch_token(None, None).await?;
        *cache = Some(CachedToken {
            token: token.clone(),
            expires_at: Instant::now() + TOKEN_LIFETIME,
        });
        debug!("refreshed webhook bearer token");
        Ok(token)
    }

    async fn fetch_token(
        &self,
        client_id_override: Option<&str>,
        scope_override: Option<&str>,
    ) -> Result<String> {
        let client_id = client_id_override.unwrap_or(&self.client_id);
        let scope = scope_override.unwrap_or(&self.scope);

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", client_id),
            ("client_secret", &self.client_secret),
            ("scope", scope),
        ];

        let response = self.client.post(&self.token_url).form(&form).send().await?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(NotifyError::TokenStatus(status));
        }

        let token: TokenResponse = response.json().await?;
        Ok(token.access_token)
    }
}

#[async_trait::async_trait]
impl WebhookSink for OAuthWebhookClient {
    async fn send(
        &self,
        url: &str,
        payload: &Value,
        client_id_override: Option<&str>,
        scope_override: Option<&str>,
    ) -> Result<()> {
        let token = self.bearer_token(client_id_override, scope_override).await?;

        let response = self.client.post(url).bearer_auth(token).json(payload).send().await?;

        let status = response.status().as_u16();
        if !(200..400).contains(&status) {
            return Err(NotifyError::WebhookStatus(status));
        }

        Ok(())
    }
}

/// Webhook sink that discards all notices.
#[derive(Debug, Default)]
pub struct NoOpWebhookSink;

#[async_trait::async_trait]
impl WebhookSink for NoOpWebhookSink {
    async fn send(
        &self,
        _url: &str,
        _payload: &Value,
        _client_id_override: Option<&str>,
        _scope_override: Option<&str>,
    ) -> Result<()> {
        Ok(())
    }
}
