//! RabbitMQ plumbing for the relay task worker.
//!
//! One supervisor task owns the broker session: it dials with
//! exponential backoff, declares the exchange/queue/binding topology,
//! sets prefetch, and streams deliveries onto a bounded channel. A
//! fixed pool of workers drains that channel, invokes the dispatcher,
//! and applies the verdict at the broker: ack, retry-republish-then-ack,
//! or terminal nack. The publisher side produces envelopes in the
//! native format and in Celery protocol v2 for Python worker fleets.
//!
//! ```text
//!   RabbitMQ ──deliveries──▶ Supervisor ──bounded channel──▶ Workers
//!      ▲                          │                             │
//!      │                   shared channel ◀────republish────────┤
//!      └──────ack/nack────────────────────────────────────────-─┘
//! ```
//!
//! Backpressure comes from two sides: broker prefetch caps unacked
//! deliveries at `2 × concurrency`, and the bounded channel stalls the
//! supervisor's forwarding when every worker is busy.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backoff;
pub mod consumer;
pub mod engine;
pub mod error;
pub mod publisher;
pub mod worker_pool;

pub use backoff::{retry_delay_ms, DialBackoff};
pub use consumer::{ConsumerConfig, ConsumerSupervisor, SharedChannel};
pub use engine::ConsumerEngine;
pub use error::{BrokerError, Result};
pub use publisher::Publisher;
pub use worker_pool::WorkerPool;

/// Exchange shared with the Python Celery fleet.
pub const CELERY_EXCHANGE: &str = "celery";

/// Queue used when the caller does not name one.
pub const DEFAULT_QUEUE: &str = "celery";

/// Default number of pool workers.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Default capacity of the bounded delivery channel.
pub const DEFAULT_CHANNEL_BUFFER: usize = 100;
