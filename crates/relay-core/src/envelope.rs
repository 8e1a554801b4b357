//! Task envelope wire format and tolerant decoding.
//!
//! The envelope is the native JSON object carrying a task's identity,
//! payload, and retry/notify controls. Decoding also accepts a legacy
//! Celery-style wrapper: a JSON array whose first element is the native
//! object, produced by publishers that wrap the envelope as `args[0]`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{Result, TaskError};

/// Current envelope schema version.
pub const ENVELOPE_VERSION: &str = "1.0";

/// Default retry budget applied when `max_attempts` is absent or zero.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// The native task envelope.
///
/// Envelopes are immutable during processing; a retry is expressed by
/// publishing a new envelope with `attempt` incremented, never by
/// mutating the in-flight delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    /// Schema version, currently `"1.0"`.
    pub version: String,

    /// Opaque unique id, generated by the publisher.
    pub id: String,

    /// Handler registry key. Non-empty.
    pub task: String,

    /// Handler-specific payload, carried verbatim.
    #[serde(default)]
    pub payload: Value,

    /// RFC3339 timestamp set at publish time.
    pub created_at: String,

    /// Zero on first delivery, incremented on each retry republish.
    #[serde(default)]
    pub attempt: u32,

    /// Retry budget. Zero means "use the default of 5".
    #[serde(default)]
    pub max_attempts: u32,

    /// Per-task deadline in seconds. Zero means no deadline.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub timeout_seconds: u64,

    /// Opaque idempotency key, uninterpreted by the worker.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub idempotency_key: String,

    /// Opaque producer metadata, uninterpreted by the worker.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub meta: Value,

    /// Completion notification configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notify: Option<NotifyConfig>,
}

/// Notification preferences for task completion.
///
/// Absent sub-records mean the corresponding sink is skipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Real-time broadcast target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sockudo: Option<BroadcastSpec>,

    /// OAuth2-protected webhook target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook: Option<WebhookSpec>,
}

/// Broadcast channel and event for a completion notice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastSpec {
    /// Channel to broadcast on.
    pub channel: String,

    /// Event name attached to the broadcast.
    pub event: String,

    /// Whether to attach the task payload to the notification data.
    #[serde(default)]
    pub include_payload: bool,
}

/// Webhook target for a completion notice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookSpec {
    /// Target URL for the JSON POST.
    pub url: String,

    /// Per-task OAuth client id, bypassing the cached default identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_client_id: Option<String>,

    /// Per-task OAuth scope, bypassing the cached default identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_scope: Option<String>,
}

/// Optional envelope fields supplied at publish time.
#[derive(Debug, Clone, Default)]
pub struct TaskOptions {
    /// Retry budget override.
    pub max_attempts: Option<u32>,

    /// Per-task deadline in seconds.
    pub timeout_seconds: Option<u64>,

    /// Opaque idempotency key.
    pub idempotency_key: Option<String>,

    /// Opaque producer metadata.
    pub meta: Option<Value>,

    /// Completion notification configuration.
    pub notify: Option<NotifyConfig>,
}

impl TaskEnvelope {
    /// Builds a fresh envelope for publishing.
    ///
    /// Assigns a new id, stamps `created_at` with the current time, and
    /// starts the retry state at attempt zero.
    pub fn new(task: impl Into<String>, payload: Value, options: TaskOptions) -> Self {
        Self {
            version: ENVELOPE_VERSION.to_string(),
            id: Uuid::new_v4().to_string(),
            task: task.into(),
            payload,
            created_at: Utc::now().to_rfc3339(),
            attempt: 0,
            max_attempts: options.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
            timeout_seconds: options.timeout_seconds.unwrap_or(0),
            idempotency_key: options.idempotency_key.unwrap_or_default(),
            meta: options.meta.unwrap_or(Value::Null),
            notify: options.notify,
        }
    }

    /// Decodes a message body into an envelope.
    ///
    /// Accepts the native object directly, or a legacy Celery-style
    /// array whose first element is the native object. Anything else is
    /// a poison message.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Envelope`] when the body is not valid JSON,
    /// does not match either accepted shape, or names no task.
    pub fn decode(body: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| TaskError::Envelope(format!("body is not valid JSON: {e}")))?;

        let envelope: Self = match value {
            Value::Object(_) => serde_json::from_value(value)
                .map_err(|e| TaskError::Envelope(e.to_string()))?,
            Value::Array(items) => {
                let first = items
                    .into_iter()
                    .next()
                    .ok_or_else(|| TaskError::Envelope("empty wrapper array".to_string()))?;
                serde_json::from_value(first).map_err(|e| {
                    TaskError::Envelope(format!("wrapper element is not an envelope: {e}"))
                })?
            },
            other => {
                return Err(TaskError::Envelope(format!(
                    "expected object or wrapper array, got {other}"
                )))
            },
        };

        if envelope.task.is_empty() {
            return Err(TaskError::Envelope("envelope names no task".to_string()));
        }

        Ok(envelope)
    }

    /// Encodes the envelope for publishing.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Envelope`] if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| TaskError::Envelope(e.to_string()))
    }

    /// Returns the effective retry budget, applying the default when the
    /// envelope carries zero.
    pub fn effective_max_attempts(&self) -> u32 {
        if self.max_attempts == 0 {
            DEFAULT_MAX_ATTEMPTS
        } else {
            self.max_attempts
        }
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(n: &u64) -> bool {
    *n == 0
}
