//! Completion notification sinks.
//!
//! Two fire-and-forget side channels for task completion notices: a
//! real-time broadcast endpoint authenticated with a static key, and an
//! OAuth2-protected webhook with an in-process token cache. Both are
//! injected into the dispatcher as capabilities; no-op implementations
//! stand in when a sink is not configured.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod broadcast;
pub mod error;
pub mod webhook;

pub use broadcast::{Broadcaster, NoOpBroadcaster, SockudoBroadcaster};
pub use error::{NotifyError, Result};
pub use webhook::{NoOpWebhookSink, OAuthWebhookClient, WebhookSink};
