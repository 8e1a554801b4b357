//! Core domain types for the relay task worker.
//!
//! Provides the task envelope and its wire codec (native JSON and the
//! Celery protocol v2 body used for Python inter-op), the handler
//! capability trait, the name-to-handler registry, and the shared error
//! taxonomy. All other crates depend on these foundational types.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod celery;
pub mod envelope;
pub mod error;
pub mod handler;
pub mod models;
pub mod registry;

pub use celery::{CeleryBody, CeleryMetadata};
pub use envelope::{
    BroadcastSpec, NotifyConfig, TaskEnvelope, TaskOptions, WebhookSpec, DEFAULT_MAX_ATTEMPTS,
    ENVELOPE_VERSION,
};
pub use error::{Result, TaskError};
pub use handler::TaskHandler;
pub use models::LogRecord;
pub use registry::HandlerRegistry;
