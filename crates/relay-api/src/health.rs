//! Health probe endpoint.
//!
//! `GET /healthcheck` always answers 200. A partial outage is reported
//! as `"degraded"` in the body instead of a non-2xx status, so
//! orchestrators keep the process alive while the supervisor redials
//! the broker or the database recovers.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

/// Shared state for the health endpoint.
#[derive(Clone)]
pub struct HealthState {
    /// Database pool when one is configured.
    pub pool: Option<PgPool>,
    /// Broker liveness flag maintained by the consumer supervisor.
    pub rabbit_connected: Arc<AtomicBool>,
}

/// Health check response body.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `"ok"` when both subsystems are live, `"degraded"` otherwise.
    pub status: &'static str,
    /// Database liveness: `"up"` or `"down"`.
    pub database: &'static str,
    /// Broker liveness: `"up"` or `"down"`.
    pub rabbitmq: &'static str,
    /// Database failure detail, present only when the database is down.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_error: Option<String>,
}

/// Health check handler.
///
/// Called frequently by orchestration probes, so the database check is
/// a single lightweight query.
pub async fn healthcheck(State(state): State<HealthState>) -> Json<HealthResponse> {
    let (database_up, database_error) = match &state.pool {
        Some(pool) => match sqlx::query("SELECT 1").execute(pool).await {
            Ok(_) => (true, None),
            Err(e) => (false, Some(e.to_string())),
        },
        None => (false, Some("database not configured".to_string())),
    };

    let rabbit_up = state.rabbit_connected.load(Ordering::SeqCst);

    let response = HealthResponse {
        status: if database_up && rabbit_up { "ok" } else { "degraded" },
        database: if database_up { "up" } else { "down" },
        rabbitmq: if rabbit_up { "up" } else { "down" },
        database_error,
    };

    debug!(status = response.status, "health check completed");
    Json(response)
}

/// Builds the health router.
pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/healthcheck", get(healthcheck))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves the health endpoint until the shutdown token fires.
///
/// # Errors
///
/// Returns an error if the port cannot be bound or the server fails.
pub async fn serve(
    state: HealthState,
    port: u16,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "health endpoint listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("health endpoint stopped");
    Ok(())
}
