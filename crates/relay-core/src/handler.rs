//! The task handler capability.

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// A registered task handler.
///
/// Handlers receive the envelope's raw `payload` and a cancellation
/// token derived from the worker's shutdown scope (and the per-task
/// deadline when one is set). Handlers are responsible for their own
/// idempotency: the broker delivers at least once, and a retry
/// republish re-runs the handler with the same payload.
#[async_trait::async_trait]
pub trait TaskHandler: Send + Sync {
    /// Processes the task payload.
    ///
    /// # Errors
    ///
    /// Returning an error marks the attempt failed; the dispatcher
    /// decides between retry and terminal failure based on the
    /// envelope's retry budget.
    async fn handle(&self, cancel: CancellationToken, payload: Value) -> Result<()>;
}
