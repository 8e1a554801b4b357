//! Error taxonomy for task decoding and execution.
//!
//! Distinguishes poison conditions (unparseable envelopes, unknown task
//! names) from handler failures so the dispatcher can decide between
//! retry and terminal failure without inspecting error strings.

use thiserror::Error;

/// Result type alias using [`TaskError`].
pub type Result<T> = std::result::Result<T, TaskError>;

/// Errors produced while decoding or executing a task.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The message body could not be decoded into a task envelope.
    ///
    /// Poison condition: the delivery must not be retried.
    #[error("invalid task envelope: {0}")]
    Envelope(String),

    /// No handler is registered under the envelope's task name.
    ///
    /// Poison condition: retrying cannot succeed until a new worker
    /// build registers the handler.
    #[error("unknown task: {0}")]
    UnknownTask(String),

    /// The handler exceeded the envelope's per-task deadline.
    #[error("task deadline exceeded after {0}s")]
    DeadlineExceeded(u64),

    /// The handler could not decode its task-specific payload.
    #[error("invalid task payload: {0}")]
    Payload(String),

    /// A persistence operation inside a handler failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// Any other handler failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TaskError {
    /// Returns whether the error is a poison condition.
    ///
    /// Poison deliveries are nacked without requeue and never retried,
    /// because redelivery would fail identically.
    pub const fn is_poison(&self) -> bool {
        matches!(self, Self::Envelope(_) | Self::UnknownTask(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poison_conditions_identified() {
        assert!(TaskError::Envelope("bad json".into()).is_poison());
        assert!(TaskError::UnknownTask("ghost".into()).is_poison());
        assert!(!TaskError::DeadlineExceeded(5).is_poison());
        assert!(!TaskError::Storage("connection lost".into()).is_poison());
    }

    #[test]
    fn error_display_format() {
        let error = TaskError::UnknownTask("ghost".into());
        assert_eq!(error.to_string(), "unknown task: ghost");

        let error = TaskError::DeadlineExceeded(30);
        assert_eq!(error.to_string(), "task deadline exceeded after 30s");
    }
}
