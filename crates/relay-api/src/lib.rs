//! Configuration loading and the health probe surface.
//!
//! Configuration merges built-in defaults, an optional `config.toml`,
//! and environment variable overrides. The health endpoint reports
//! subsystem liveness without ever failing the probe outright, so
//! partial outages do not trigger orchestration restart loops.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod health;

pub use config::Config;
pub use health::{HealthResponse, HealthState};
