//! Error types for notification sinks.
//!
//! Sink errors are always logged and swallowed by the dispatcher; they
//! carry enough context for the log line and nothing more.

use thiserror::Error;

/// Result type alias using [`NotifyError`].
pub type Result<T> = std::result::Result<T, NotifyError>;

/// Errors produced by the broadcast and webhook sinks.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The broadcast endpoint answered with an error status.
    #[error("broadcast failed with status {0}")]
    BroadcastStatus(u16),

    /// The webhook target answered outside the accepted range.
    #[error("webhook failed with status {0}")]
    WebhookStatus(u16),

    /// The OAuth token endpoint answered with an error status.
    #[error("token fetch failed with status {0}")]
    TokenStatus(u16),

    /// Transport-level HTTP failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}
