//! Consumer engine wiring the supervisor to the worker pool.

use std::{
    sync::{atomic::AtomicBool, Arc},
    time::Duration,
};

use lapin::message::Delivery;
use relay_tasks::Dispatcher;
use tokio::{
    sync::{mpsc, RwLock},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::{
    consumer::{ConsumerConfig, ConsumerSupervisor, SharedChannel},
    error::Result,
    worker_pool::WorkerPool,
};

/// Running consumer: one supervisor task plus a fixed worker pool.
///
/// The supervisor and pool communicate over a bounded delivery channel
/// and share the publish channel handle for retry republishes. Dropping
/// the supervisor's sender on shutdown lets workers drain the buffered
/// backlog before stopping.
pub struct ConsumerEngine {
    supervisor: JoinHandle<()>,
    pool: WorkerPool,
    shutdown: CancellationToken,
}

impl ConsumerEngine {
    /// Starts the supervisor and worker pool.
    ///
    /// `connected` is maintained by the supervisor for the health
    /// endpoint. Returns immediately; use [`ConsumerEngine::shutdown`]
    /// to stop.
    pub fn start(
        config: ConsumerConfig,
        dispatcher: Arc<Dispatcher>,
        connected: Arc<AtomicBool>,
        shutdown: CancellationToken,
    ) -> Self {
        let publish_channel: SharedChannel = Arc::new(RwLock::new(None));
        let (sender, receiver) = mpsc::channel::<Delivery>(config.buffer);

        let pool = WorkerPool::spawn(
            config.concurrency,
            receiver,
            dispatcher,
            Arc::clone(&publish_channel),
            config.backoff_enabled,
            shutdown.clone(),
        );

        let supervisor = ConsumerSupervisor::new(
            config,
            publish_channel,
            connected,
            shutdown.clone(),
            sender,
        );
        let supervisor = tokio::spawn(supervisor.run());

        Self { supervisor, pool, shutdown }
    }

    /// Signals shutdown and waits for the supervisor and workers.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool fails to drain within `timeout`.
    pub async fn shutdown(self, timeout: Duration) -> Result<()> {
        self.shutdown.cancel();

        if let Err(error) = self.supervisor.await {
            error!(%error, "consumer supervisor task panicked");
        }

        self.pool.shutdown_graceful(timeout).await
    }
}
