//! Real-time broadcast sink.
//!
//! Posts completion notices to a Sockudo broadcast endpoint as
//! `{channel, event, data}` with static bearer-key authentication. An
//! unconfigured sink (empty base URL) succeeds without side effect so
//! deployments without a broadcast server need no special casing.

use std::time::Duration;

use serde_json::{json, Value};

use crate::error::{NotifyError, Result};

const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Capability for broadcasting a completion notice.
#[async_trait::async_trait]
pub trait Broadcaster: Send + Sync {
    /// Broadcasts `payload` as `event` on `channel`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or an error status from
    /// the endpoint.
    async fn broadcast(&self, channel: &str, event: &str, payload: &Value) -> Result<()>;
}

/// Broadcaster backed by a Sockudo HTTP endpoint.
pub struct SockudoBroadcaster {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl SockudoBroadcaster {
    /// Creates a broadcaster for the given endpoint.
    ///
    /// An empty `base_url` produces a broadcaster whose sends succeed
    /// without doing anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(CLIENT_TIMEOUT).build()?;
        Ok(Self { base_url: base_url.into(), api_key: api_key.into(), client })
    }
}

#[async_trait::async_trait]
impl Broadcaster for SockudoBroadcaster {
    async fn broadcast(&self, channel: &str, event: &str, payload: &Value) -> Result<()> {
        if self.base_url.is_empty() {
            return Ok(());
        }

        let url = format!("{}/api/v1/broadcast", self.base_url);
        let body = json!({
            "channel": channel,
            "event": event,
            "data": payload,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("X-App-Key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status().as_u16();
        if status >= 400 {
            return Err(NotifyError::BroadcastStatus(status));
        }

        Ok(())
    }
}

/// Broadcaster that discards all notices.
#[derive(Debug, Default)]
pub struct NoOpBroadcaster;

#[async_trait::async_trait]
impl Broadcaster for NoOpBroadcaster {
    async fn broadcast(&self, _channel: &str, _event: &str, _payload: &Value) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::{
        matchers::{body_json, header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;

    #[tokio::test]
    async fn posts_payload_with_both_auth_headers() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/broadcast"))
            .and(header("Authorization", "Bearer app-key-1"))
            .and(header("X-App-Key", "app-key-1"))
            .and(body_json(json!({
                "channel": "jobs",
                "event": "task.finished",
                "data": {"id": "t-1", "status": "success"},
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let sink = SockudoBroadcaster::new(server.uri(), "app-key-1").unwrap();
        sink.broadcast("jobs", "task.finished", &json!({"id": "t-1", "status": "success"}))
            .await
            .unwrap();

        server.verify().await;
    }

    #[tokio::test]
    async fn error_status_surfaces_as_status_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/broadcast"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let sink = SockudoBroadcaster::new(server.uri(), "k").unwrap();
        let err = sink.broadcast("c", "e", &json!({})).await.unwrap_err();

        assert!(matches!(err, NotifyError::BroadcastStatus(503)));
    }

    #[tokio::test]
    async fn empty_base_url_is_a_no_op() {
        let sink = SockudoBroadcaster::new("", "unused").unwrap();
        sink.broadcast("c", "e", &json!({"any": "thing"})).await.unwrap();
    }
}
