//! Error types for broker operations.

use std::time::Duration;

use thiserror::Error;

/// Result type alias using [`BrokerError`].
pub type Result<T> = std::result::Result<T, BrokerError>;

/// Errors from broker connection, publish, and pool operations.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Caller passed an unusable argument (e.g. an empty task name).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// AMQP-level failure from the underlying client.
    #[error("broker error: {0}")]
    Amqp(#[from] lapin::Error),

    /// Envelope or body could not be encoded/decoded for publishing.
    #[error("envelope codec failure: {0}")]
    Envelope(String),

    /// No live channel is available for a retry republish.
    ///
    /// Happens when the supervisor is mid-reconnect; the original
    /// delivery is dead-lettered and the broker redelivers.
    #[error("publish channel unavailable")]
    ChannelUnavailable,

    /// Workers did not drain within the shutdown deadline.
    #[error("worker pool shutdown timed out after {0:?}")]
    ShutdownTimeout(Duration),
}
