//! Envelope dispatch: decode, look up, execute, decide, notify.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use relay_core::{HandlerRegistry, TaskEnvelope, TaskError};
use relay_notify::{Broadcaster, WebhookSink};
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Budget for each detached notification send.
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of dispatching one delivery.
///
/// The worker pool alone translates verdicts into broker operations:
/// ack for success, republish-then-ack for retry, nack without requeue
/// for fatal.
#[derive(Debug)]
pub enum DispatchVerdict {
    /// Handler completed; ack the delivery.
    Success,

    /// Transient failure with retry budget remaining; republish with
    /// `attempt` and ack the original.
    Retry {
        /// Attempt number the republished envelope must carry.
        attempt: u32,
        /// The failure that triggered the retry.
        error: TaskError,
    },

    /// Poison message or exhausted retries; nack without requeue.
    Fatal {
        /// The terminal failure.
        error: TaskError,
    },
}

/// Dispatches raw message bodies to registered handlers.
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    broadcaster: Arc<dyn Broadcaster>,
    webhook: Arc<dyn WebhookSink>,
}

impl Dispatcher {
    /// Creates a dispatcher over the given registry and notification
    /// sinks.
    pub fn new(
        registry: Arc<HandlerRegistry>,
        broadcaster: Arc<dyn Broadcaster>,
        webhook: Arc<dyn WebhookSink>,
    ) -> Self {
        Self { registry, broadcaster, webhook }
    }

    /// Processes one raw message body to a verdict.
    ///
    /// `shutdown` is the worker's shutdown scope; in-flight handlers
    /// observe it (and the per-task deadline, when set) through their
    /// cancellation token. Completion notifications run detached from
    /// both, so a verdict already owed to a producer escapes shutdown.
    pub async fn dispatch(&self, shutdown: &CancellationToken, body: &[u8]) -> DispatchVerdict {
        let envelope = match TaskEnvelope::decode(body) {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!(%error, "discarding poison message");
                return DispatchVerdict::Fatal { error };
            },
        };

        let Some(handler) = self.registry.lookup(&envelope.task) else {
            let error = TaskError::UnknownTask(envelope.task.clone());
            warn!(task = %envelope.task, id = %envelope.id, "no handler registered");
            return DispatchVerdict::Fatal { error };
        };

        let max_attempts = envelope.effective_max_attempts();

        let cancel = shutdown.child_token();
        let started = Instant::now();
        let result = if envelope.timeout_seconds > 0 {
            let deadline = Duration::from_secs(envelope.timeout_seconds);
            match tokio::time::timeout(deadline, handler.handle(cancel.clone(), envelope.payload.clone()))
                .await
            {
                Ok(result) => result,
                Err(_) => {
                    cancel.cancel();
                    Err(TaskError::DeadlineExceeded(envelope.timeout_seconds))
                },
            }
        } else {
            handler.handle(cancel, envelope.payload.clone()).await
        };
        let duration = started.elapsed();

        match result {
            Ok(()) => {
                info!(
                    task = %envelope.task,
                    id = %envelope.id,
                    duration_ms = duration.as_millis() as u64,
                    "task succeeded"
                );
                self.notify(&envelope, "success", None);
                DispatchVerdict::Success
            },
            Err(error) => {
                warn!(
                    task = %envelope.task,
                    id = %envelope.id,
                    attempt = envelope.attempt,
                    max_attempts,
                    %error,
                    "task failed"
                );

                if envelope.attempt + 1 < max_attempts {
                    DispatchVerdict::Retry { attempt: envelope.attempt + 1, error }
                } else {
                    self.notify(&envelope, "error", Some(&error));
                    DispatchVerdict::Fatal { error }
                }
            },
        }
    }

    /// Fires completion notifications for the envelope's configured
    /// sinks.
    ///
    /// Each sink runs as a detached task on its own 10-second budget,
    /// derived from a fresh root rather than the task context: a
    /// timed-out or shut-down task still owes its producers a final
    /// status. Sink failures are logged and swallowed.
    fn notify(&self, envelope: &TaskEnvelope, status: &str, error: Option<&TaskError>) {
        let Some(config) = &envelope.notify else { return };

        let mut payload = serde_json::json!({
            "id": envelope.id,
            "task": envelope.task,
            "status": status,
            "attempt": envelope.attempt,
            "created_at": envelope.created_at,
            "finished_at": Utc::now().to_rfc3339(),
        });
        if let Some(error) = error {
            payload["error"] = Value::String(error.to_string());
        }

        if let Some(spec) = config.sockudo.clone() {
            let mut data = payload.clone();
            if spec.include_payload {
                data["payload"] = envelope.payload.clone();
            }
            let broadcaster = Arc::clone(&self.broadcaster);
            let id = envelope.id.clone();
            tokio::spawn(async move {
                match tokio::time::timeout(
                    NOTIFY_TIMEOUT,
                    broadcaster.broadcast(&spec.channel, &spec.event, &data),
                )
                .await
                {
                    Ok(Ok(())) => {},
                    Ok(Err(error)) => warn!(%id, %error, "broadcast notification failed"),
                    Err(_) => warn!(%id, "broadcast notification timed out"),
                }
            });
        }

        if let Some(spec) = config.webhook.clone() {
            let webhook = Arc::clone(&self.webhook);
            let id = envelope.id.clone();
            tokio::spawn(async move {
                match tokio::time::timeout(
                    NOTIFY_TIMEOUT,
                    webhook.send(
                        &spec.url,
                        &payload,
                        spec.oauth_client_id.as_deref(),
                        spec.oauth_scope.as_deref(),
                    ),
                )
                .await
                {
                    Ok(Ok(())) => {},
                    Ok(Err(error)) => warn!(%id, %error, "webhook notification failed"),
                    Err(_) => warn!(%id, "webhook notification timed out"),
                }
            });
        }
    }
}
