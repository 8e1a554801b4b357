//! Fixed worker pool applying dispatch verdicts at the broker.
//!
//! Each delivery is acknowledged exactly once across every path:
//! success acks, a retry republishes then acks the original, and both
//! poison and republish failure nack without requeue (the dead-letter
//! path).

use std::{sync::Arc, time::Duration};

use lapin::{
    message::Delivery,
    options::{BasicAckOptions, BasicNackOptions, BasicPublishOptions},
    types::{AMQPValue, FieldTable},
    BasicProperties,
};
use relay_core::TaskEnvelope;
use relay_tasks::{DispatchVerdict, Dispatcher};
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    backoff::retry_delay_ms,
    consumer::SharedChannel,
    error::{BrokerError, Result},
};

/// Pool of worker tasks draining the bounded delivery channel.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `count` workers over the given delivery receiver.
    pub fn spawn(
        count: usize,
        receiver: mpsc::Receiver<Delivery>,
        dispatcher: Arc<Dispatcher>,
        publish_channel: SharedChannel,
        backoff_enabled: bool,
        shutdown: CancellationToken,
    ) -> Self {
        info!(worker_count = count, "spawning pool workers");

        let receiver = Arc::new(Mutex::new(receiver));
        let handles = (0..count)
            .map(|worker_id| {
                let receiver = Arc::clone(&receiver);
                let dispatcher = Arc::clone(&dispatcher);
                let publish_channel = Arc::clone(&publish_channel);
                let shutdown = shutdown.clone();
                tokio::spawn(worker_loop(
                    worker_id,
                    receiver,
                    dispatcher,
                    publish_channel,
                    backoff_enabled,
                    shutdown,
                ))
            })
            .collect();

        Self { handles }
    }

    /// Waits for all workers to drain, bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::ShutdownTimeout`] if workers are still
    /// running when the deadline passes.
    pub async fn shutdown_graceful(self, timeout: Duration) -> Result<()> {
        let join_all = async {
            for (worker_id, handle) in self.handles.into_iter().enumerate() {
                if let Err(error) = handle.await {
                    error!(worker_id, %error, "worker task panicked");
                }
            }
        };

        match tokio::time::timeout(timeout, join_all).await {
            Ok(()) => {
                info!("worker pool drained");
                Ok(())
            },
            Err(_) => {
                error!(timeout_secs = timeout.as_secs(), "worker pool shutdown timed out");
                Err(BrokerError::ShutdownTimeout(timeout))
            },
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<Delivery>>>,
    dispatcher: Arc<Dispatcher>,
    publish_channel: SharedChannel,
    backoff_enabled: bool,
    shutdown: CancellationToken,
) {
    info!(worker_id, "pool worker starting");

    loop {
        let delivery = {
            let mut receiver = receiver.lock().await;
            tokio::select! {
                () = shutdown.cancelled() => None,
                delivery = receiver.recv() => delivery,
            }
        };

        let Some(delivery) = delivery else { break };
        process_delivery(
            worker_id,
            delivery,
            &dispatcher,
            &publish_channel,
            backoff_enabled,
            &shutdown,
        )
        .await;
    }

    info!(worker_id, "pool worker stopped");
}

async fn process_delivery(
    worker_id: usize,
    delivery: Delivery,
    dispatcher: &Dispatcher,
    publish_channel: &SharedChannel,
    backoff_enabled: bool,
    shutdown: &CancellationToken,
) {
    match dispatcher.dispatch(shutdown, &delivery.data).await {
        DispatchVerdict::Success => ack(worker_id, &delivery).await,
        DispatchVerdict::Retry { attempt, .. } => {
            match republish(&delivery, attempt, publish_channel, backoff_enabled).await {
                Ok(()) => {
                    debug!(worker_id, attempt, "retry republished");
                    ack(worker_id, &delivery).await;
                },
                Err(error) => {
                    error!(worker_id, attempt, %error, "retry republish failed, dead-lettering");
                    nack(worker_id, &delivery).await;
                },
            }
        },
        DispatchVerdict::Fatal { .. } => nack(worker_id, &delivery).await,
    }
}

async fn ack(worker_id: usize, delivery: &Delivery) {
    if let Err(error) = delivery.acker.ack(BasicAckOptions::default()).await {
        // Channel is gone; the broker will redeliver after the
        // visibility window.
        warn!(worker_id, %error, "ack failed on lost channel");
    }
}

async fn nack(worker_id: usize, delivery: &Delivery) {
    let options = BasicNackOptions { requeue: false, ..Default::default() };
    if let Err(error) = delivery.acker.nack(options).await {
        warn!(worker_id, %error, "nack failed on lost channel");
    }
}

async fn republish(
    delivery: &Delivery,
    attempt: u32,
    publish_channel: &SharedChannel,
    backoff_enabled: bool,
) -> Result<()> {
    let (body, headers) = build_retry_publication(&delivery.data, attempt, backoff_enabled)?;

    let guard = publish_channel.read().await;
    let channel = guard.as_ref().ok_or(BrokerError::ChannelUnavailable)?;

    let properties = BasicProperties::default()
        .with_content_type("application/json".into())
        .with_content_encoding("utf-8".into())
        .with_delivery_mode(2)
        .with_headers(headers);

    channel
        .basic_publish(
            delivery.exchange.as_str(),
            delivery.routing_key.as_str(),
            BasicPublishOptions::default(),
            &body,
            properties,
        )
        .await?
        .await?;

    Ok(())
}

/// Builds the republished body and headers for a retry.
///
/// The new envelope carries the incremented attempt; the `x-delay`
/// header (when backoff is enabled) asks a delayed-exchange broker
/// plugin to hold the message. Without the plugin the header is inert
/// and the retry is effectively immediate.
pub fn build_retry_publication(
    body: &[u8],
    attempt: u32,
    backoff_enabled: bool,
) -> Result<(Vec<u8>, FieldTable)> {
    let mut envelope =
        TaskEnvelope::decode(body).map_err(|e| BrokerError::Envelope(e.to_string()))?;
    envelope.attempt = attempt;
    let encoded = envelope.encode().map_err(|e| BrokerError::Envelope(e.to_string()))?;

    let mut headers = FieldTable::default();
    if backoff_enabled {
        let delay = i64::try_from(retry_delay_ms(attempt)).unwrap_or(i64::MAX);
        headers.insert("x-delay".into(), AMQPValue::LongLongInt(delay));
    }

    Ok((encoded, headers))
}

#[cfg(test)]
mod tests {
    use relay_core::{TaskEnvelope, TaskOptions};
    use serde_json::json;

    use super::*;

    fn envelope_body(attempt: u32) -> Vec<u8> {
        let mut envelope = TaskEnvelope::new("logger", json!({"message": "hi"}), TaskOptions::default());
        envelope.attempt = attempt;
        envelope.encode().unwrap()
    }

    #[test]
    fn republication_increments_attempt_and_keeps_payload() {
        let (body, _) = build_retry_publication(&envelope_body(0), 1, true).unwrap();
        let envelope = TaskEnvelope::decode(&body).unwrap();

        assert_eq!(envelope.attempt, 1);
        assert_eq!(envelope.task, "logger");
        assert_eq!(envelope.payload, json!({"message": "hi"}));
    }

    #[test]
    fn republication_carries_delay_header_when_enabled() {
        let key = lapin::types::ShortString::from("x-delay");

        let (_, headers) = build_retry_publication(&envelope_body(0), 1, true).unwrap();
        assert_eq!(headers.inner().get(&key), Some(&AMQPValue::LongLongInt(1_000)));

        let (_, headers) = build_retry_publication(&envelope_body(1), 2, true).unwrap();
        assert_eq!(headers.inner().get(&key), Some(&AMQPValue::LongLongInt(2_000)));
    }

    #[test]
    fn delay_header_omitted_when_backoff_disabled() {
        let (_, headers) = build_retry_publication(&envelope_body(0), 1, false).unwrap();
        assert!(headers.inner().is_empty());
    }

    #[test]
    fn unparseable_body_cannot_be_republished() {
        let err = build_retry_publication(b"junk", 1, true).unwrap_err();
        assert!(matches!(err, BrokerError::Envelope(_)));
    }
}
