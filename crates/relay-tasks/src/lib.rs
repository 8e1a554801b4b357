//! Task dispatch pipeline and built-in handlers.
//!
//! The dispatcher turns a raw message body into a verdict the worker
//! pool applies at the broker: ack, retry-republish, or terminal nack.
//! Completion notifications fan out from here on detached timeout
//! budgets so broker acknowledgement is never delayed by sink latency.
//!
//! The one built-in handler persists Monolog-style log records into
//! PostgreSQL.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod dispatcher;
pub mod log_store;
pub mod logger;
pub mod payloads;

pub use dispatcher::{DispatchVerdict, Dispatcher};
pub use log_store::LogStore;
pub use logger::LoggerHandler;
pub use payloads::{log_payload, LogPayload};
