//! End-to-end verdict flows from publish-shaped bodies through the
//! dispatcher, without a live broker: the worker pool's broker calls
//! are exercised at the seam where bodies, headers, and verdicts are
//! built.

use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

use lapin::types::AMQPValue;
use relay_broker::worker_pool::build_retry_publication;
use relay_broker::publisher::build_native_publication;
use relay_core::{HandlerRegistry, TaskEnvelope, TaskHandler, TaskOptions};
use relay_notify::{NoOpBroadcaster, NoOpWebhookSink};
use relay_tasks::{DispatchVerdict, Dispatcher, LoggerHandler};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

struct FailsFirst {
    failures: AtomicU32,
}

#[async_trait::async_trait]
impl TaskHandler for FailsFirst {
    async fn handle(&self, _cancel: CancellationToken, _payload: Value) -> relay_core::Result<()> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            Err(anyhow::anyhow!("transient failure").into())
        } else {
            Ok(())
        }
    }
}

struct AlwaysFails;

#[async_trait::async_trait]
impl TaskHandler for AlwaysFails {
    async fn handle(&self, _cancel: CancellationToken, _payload: Value) -> relay_core::Result<()> {
        Err(anyhow::anyhow!("permanent failure").into())
    }
}

fn dispatcher(registry: HandlerRegistry) -> Dispatcher {
    Dispatcher::new(Arc::new(registry), Arc::new(NoOpBroadcaster), Arc::new(NoOpWebhookSink))
}

fn delay_header(headers: &lapin::types::FieldTable) -> Option<i64> {
    match headers.inner().get(&lapin::types::ShortString::from("x-delay")) {
        Some(AMQPValue::LongLongInt(ms)) => Some(*ms),
        _ => None,
    }
}

#[tokio::test]
async fn logger_task_happy_path_without_database() {
    let mut registry = HandlerRegistry::new();
    registry.register("logger", Arc::new(LoggerHandler::new(None)));
    let dispatcher = dispatcher(registry);

    let (_, body) = build_native_publication(
        "logger",
        json!({
            "message": "hi",
            "channel": "t",
            "level": "200",
            "level_name": "INFO",
            "datetime": "2023-01-01 12:00:00",
        }),
        TaskOptions::default(),
    )
    .unwrap();

    let verdict = dispatcher.dispatch(&CancellationToken::new(), &body).await;
    assert!(matches!(verdict, DispatchVerdict::Success), "expected ack, got {verdict:?}");
}

#[tokio::test]
async fn retry_then_success_walks_the_delay_ladder() {
    let mut registry = HandlerRegistry::new();
    registry.register("flaky", Arc::new(FailsFirst { failures: AtomicU32::new(2) }));
    let dispatcher = dispatcher(registry);
    let shutdown = CancellationToken::new();

    let (_, body) = build_native_publication("flaky", json!({}), TaskOptions::default()).unwrap();

    // First delivery fails; the republished body carries attempt 1 and
    // a 1s delay hint.
    let DispatchVerdict::Retry { attempt, .. } = dispatcher.dispatch(&shutdown, &body).await
    else {
        panic!("expected retry verdict")
    };
    assert_eq!(attempt, 1);

    let (body, headers) = build_retry_publication(&body, attempt, true).unwrap();
    assert_eq!(delay_header(&headers), Some(1_000));
    assert_eq!(TaskEnvelope::decode(&body).unwrap().attempt, 1);

    // Second delivery fails; attempt 2, 2s delay hint.
    let DispatchVerdict::Retry { attempt, .. } = dispatcher.dispatch(&shutdown, &body).await
    else {
        panic!("expected retry verdict")
    };
    assert_eq!(attempt, 2);

    let (body, headers) = build_retry_publication(&body, attempt, true).unwrap();
    assert_eq!(delay_header(&headers), Some(2_000));

    // Third delivery succeeds and would be acked.
    let verdict = dispatcher.dispatch(&shutdown, &body).await;
    assert!(matches!(verdict, DispatchVerdict::Success));
}

#[tokio::test]
async fn exhaustion_ends_in_terminal_failure() {
    let mut registry = HandlerRegistry::new();
    registry.register("doomed", Arc::new(AlwaysFails));
    let dispatcher = dispatcher(registry);
    let shutdown = CancellationToken::new();

    let (_, mut body) = build_native_publication(
        "doomed",
        json!({}),
        TaskOptions { max_attempts: Some(3), ..Default::default() },
    )
    .unwrap();

    // Attempts 0 and 1 retry; attempt 2 is terminal.
    for expected in [1, 2] {
        let DispatchVerdict::Retry { attempt, .. } = dispatcher.dispatch(&shutdown, &body).await
        else {
            panic!("expected retry verdict")
        };
        assert_eq!(attempt, expected);
        let (next, _) = build_retry_publication(&body, attempt, false).unwrap();
        body = next;
    }

    let verdict = dispatcher.dispatch(&shutdown, &body).await;
    assert!(matches!(verdict, DispatchVerdict::Fatal { .. }), "expected nack, got {verdict:?}");
}

#[tokio::test]
async fn unknown_task_is_terminal_without_retry() {
    let dispatcher = dispatcher(HandlerRegistry::new());

    let (_, body) = build_native_publication("ghost", json!({}), TaskOptions::default()).unwrap();
    let verdict = dispatcher.dispatch(&CancellationToken::new(), &body).await;

    match verdict {
        DispatchVerdict::Fatal { error } => assert!(error.is_poison()),
        other => panic!("expected fatal verdict, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_array_context_and_extra_accepted() {
    let mut registry = HandlerRegistry::new();
    registry.register("logger", Arc::new(LoggerHandler::new(None)));
    let dispatcher = dispatcher(registry);

    let (_, body) = build_native_publication(
        "logger",
        json!({
            "message": "empty maps",
            "level": 200,
            "level_name": "INFO",
            "datetime": "2023-01-01 12:00:00",
            "context": [],
            "extra": [],
        }),
        TaskOptions::default(),
    )
    .unwrap();

    let verdict = dispatcher.dispatch(&CancellationToken::new(), &body).await;
    assert!(matches!(verdict, DispatchVerdict::Success));
}
