//! Task publisher for the native and Celery v2 wire formats.
//!
//! One publisher holds one connection and channel, reused across many
//! publishes; lapin channels are safe for concurrent use. Body and
//! header construction is split into pure builders so argument
//! validation happens before any broker I/O.

use lapin::{
    options::{BasicPublishOptions, QueueDeclareOptions},
    types::{AMQPValue, FieldTable},
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use relay_core::{CeleryBody, TaskEnvelope, TaskOptions};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::{
    error::{BrokerError, Result},
    CELERY_EXCHANGE, DEFAULT_QUEUE,
};

/// Publisher over a live broker connection.
pub struct Publisher {
    connection: Connection,
    channel: Channel,
}

impl Publisher {
    /// Connects to the broker and opens the publish channel.
    ///
    /// # Errors
    ///
    /// Returns an error if dialing or channel creation fails.
    pub async fn connect(url: &str) -> Result<Self> {
        let connection = Connection::connect(url, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;
        Ok(Self { connection, channel })
    }

    /// Publishes a task in the native envelope format.
    ///
    /// The envelope goes to the default exchange with the queue as
    /// routing key, persistent, JSON-encoded. Returns the generated
    /// task id.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::InvalidArgument`] for an empty task name
    /// (before any broker I/O), or an AMQP error from declare/publish.
    pub async fn publish_task(
        &self,
        task: &str,
        payload: Value,
        queue: &str,
        options: TaskOptions,
    ) -> Result<String> {
        let (id, body) = build_native_publication(task, payload, options)?;
        let queue = effective_queue(queue);

        self.declare_queue(queue).await?;

        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_content_encoding("utf-8".into())
            .with_delivery_mode(2);

        self.channel
            .basic_publish("", queue, BasicPublishOptions::default(), &body, properties)
            .await?
            .await?;

        debug!(%id, task, queue, "published native task");
        Ok(id)
    }

    /// Publishes a task in Celery protocol v2 format for a Python
    /// worker fleet.
    ///
    /// The body is `[args, {}, metadata]`; identity travels in the
    /// headers and the correlation id. Returns the generated task id.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::InvalidArgument`] for an empty task name
    /// (before any broker I/O), or an AMQP error from declare/publish.
    pub async fn publish_celery_task(
        &self,
        task: &str,
        args: Vec<Value>,
        queue: &str,
    ) -> Result<String> {
        let (id, body, headers) = build_celery_publication(task, args)?;
        let queue = effective_queue(queue);

        self.declare_queue(queue).await?;

        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_content_encoding("utf-8".into())
            .with_delivery_mode(2)
            .with_correlation_id(id.as_str().into())
            .with_headers(headers);

        self.channel
            .basic_publish(
                CELERY_EXCHANGE,
                queue,
                BasicPublishOptions::default(),
                &body,
                properties,
            )
            .await?
            .await?;

        debug!(%id, task, queue, "published celery task");
        Ok(id)
    }

    /// Closes the channel, then the connection, surfacing the first
    /// error.
    ///
    /// # Errors
    ///
    /// Returns the channel close error if any, else the connection
    /// close error.
    pub async fn close(&self) -> Result<()> {
        let channel = self.channel.close(200, "publisher closing").await;
        let connection = self.connection.close(200, "publisher closing").await;
        channel?;
        connection?;
        Ok(())
    }

    /// Idempotent durable declare of the target queue.
    async fn declare_queue(&self, queue: &str) -> Result<()> {
        self.channel
            .queue_declare(
                queue,
                QueueDeclareOptions { durable: true, ..Default::default() },
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }
}

fn effective_queue(queue: &str) -> &str {
    if queue.is_empty() {
        DEFAULT_QUEUE
    } else {
        queue
    }
}

/// Builds the id and body for a native-format publish.
///
/// # Errors
///
/// Returns [`BrokerError::InvalidArgument`] if `task` is empty.
pub fn build_native_publication(
    task: &str,
    payload: Value,
    options: TaskOptions,
) -> Result<(String, Vec<u8>)> {
    if task.is_empty() {
        return Err(BrokerError::InvalidArgument("task name is required".to_string()));
    }

    let envelope = TaskEnvelope::new(task, payload, options);
    let body = envelope.encode().map_err(|e| BrokerError::Envelope(e.to_string()))?;
    Ok((envelope.id, body))
}

/// Builds the id, body, and headers for a Celery v2 publish.
///
/// # Errors
///
/// Returns [`BrokerError::InvalidArgument`] if `task` is empty.
pub fn build_celery_publication(
    task: &str,
    args: Vec<Value>,
) -> Result<(String, Vec<u8>, FieldTable)> {
    if task.is_empty() {
        return Err(BrokerError::InvalidArgument("task name is required".to_string()));
    }

    let id = Uuid::new_v4().to_string();
    let body = serde_json::to_vec(&CeleryBody::new(args))
        .map_err(|e| BrokerError::Envelope(e.to_string()))?;

    let mut headers = FieldTable::default();
    headers.insert("lang".into(), AMQPValue::LongString("py".into()));
    headers.insert("task".into(), AMQPValue::LongString(task.into()));
    headers.insert("id".into(), AMQPValue::LongString(id.as_str().into()));
    headers.insert("root_id".into(), AMQPValue::LongString(id.as_str().into()));

    Ok((id, body, headers))
}

#[cfg(test)]
mod tests {
    use lapin::types::ShortString;
    use serde_json::json;

    use super::*;

    #[test]
    fn empty_task_name_rejected_before_broker_io() {
        let err = build_native_publication("", json!({}), TaskOptions::default()).unwrap_err();
        assert!(matches!(err, BrokerError::InvalidArgument(_)));

        let err = build_celery_publication("", Vec::new()).unwrap_err();
        assert!(matches!(err, BrokerError::InvalidArgument(_)));
    }

    #[test]
    fn native_publication_carries_fresh_envelope() {
        let (id, body) =
            build_native_publication("logger", json!({"message": "hi"}), TaskOptions::default())
                .unwrap();

        let envelope = TaskEnvelope::decode(&body).unwrap();
        assert_eq!(envelope.id, id);
        assert_eq!(envelope.task, "logger");
        assert_eq!(envelope.attempt, 0);
        assert_eq!(envelope.max_attempts, 5);
        assert_eq!(envelope.payload, json!({"message": "hi"}));
    }

    #[test]
    fn native_publication_applies_options() {
        let (_, body) = build_native_publication(
            "send_email",
            json!({"to": "user@example.com"}),
            TaskOptions {
                max_attempts: Some(3),
                timeout_seconds: Some(120),
                ..Default::default()
            },
        )
        .unwrap();

        let envelope = TaskEnvelope::decode(&body).unwrap();
        assert_eq!(envelope.max_attempts, 3);
        assert_eq!(envelope.timeout_seconds, 120);
    }

    #[test]
    fn celery_publication_matches_protocol_v2() {
        let (id, body, headers) =
            build_celery_publication("analyze", vec![json!("v1"), json!("v2"), json!("v3")])
                .unwrap();

        let decoded: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            decoded,
            json!([
                ["v1", "v2", "v3"],
                {},
                {"callbacks": null, "errbacks": null, "chain": null, "chord": null}
            ])
        );

        let inner = headers.inner();
        assert_eq!(
            inner.get(&ShortString::from("lang")),
            Some(&AMQPValue::LongString("py".into()))
        );
        assert_eq!(
            inner.get(&ShortString::from("task")),
            Some(&AMQPValue::LongString("analyze".into()))
        );
        assert_eq!(
            inner.get(&ShortString::from("id")),
            Some(&AMQPValue::LongString(id.as_str().into()))
        );
        assert_eq!(
            inner.get(&ShortString::from("root_id")),
            Some(&AMQPValue::LongString(id.as_str().into()))
        );
    }

    #[test]
    fn celery_ids_are_unique_per_publication() {
        let (first, ..) = build_celery_publication("analyze", Vec::new()).unwrap();
        let (second, ..) = build_celery_publication("analyze", Vec::new()).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn default_queue_applied_when_empty() {
        assert_eq!(effective_queue(""), "celery");
        assert_eq!(effective_queue("go.logger"), "go.logger");
    }
}
