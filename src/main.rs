//! Relay durable task worker.
//!
//! Main entry point. Initializes all subsystems and coordinates
//! graceful startup and shutdown: configuration, the optional
//! PostgreSQL pool, handler registration, notification sinks, the
//! health endpoint, and the broker consumer engine.

use std::{
    sync::{atomic::AtomicBool, Arc},
    time::Duration,
};

use anyhow::{Context, Result};
use relay_api::{Config, HealthState};
use relay_broker::ConsumerEngine;
use relay_core::HandlerRegistry;
use relay_notify::{
    Broadcaster, NoOpWebhookSink, OAuthWebhookClient, SockudoBroadcaster, WebhookSink,
};
use relay_tasks::{Dispatcher, LogStore, LoggerHandler};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Grace period for draining in-flight tasks on shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("starting relay task worker");

    let config = Config::load()?;
    info!(
        broker = %config.amqp_url_masked(),
        queue = %config.task_queue,
        concurrency = config.worker_concurrency,
        buffer = config.task_channel_buffer,
        "configuration loaded"
    );

    // The database is an optional collaborator: without it the logger
    // handler degrades to log-and-skip instead of dead-lettering.
    let db_pool = if config.database_configured() {
        match create_database_pool(&config).await {
            Ok(pool) => {
                run_migrations(&pool).await?;
                info!(database = %config.database_url_masked(), "database ready");
                Some(pool)
            },
            Err(error) => {
                warn!(%error, "database unavailable, log persistence disabled");
                None
            },
        }
    } else {
        warn!("no database configured, log persistence disabled");
        None
    };

    let mut registry = HandlerRegistry::new();
    registry.register("logger", Arc::new(LoggerHandler::new(db_pool.clone().map(LogStore::new))));
    let registry = Arc::new(registry);

    let broadcaster: Arc<dyn Broadcaster> =
        Arc::new(SockudoBroadcaster::new(config.sockudo_url.clone(), config.sockudo_key.clone())?);
    let webhook: Arc<dyn WebhookSink> = if config.webhook_oauth_token_url.is_empty() {
        Arc::new(NoOpWebhookSink)
    } else {
        Arc::new(OAuthWebhookClient::new(
            config.webhook_oauth_token_url.clone(),
            config.webhook_oauth_client_id.clone(),
            config.webhook_oauth_client_secret.clone(),
            config.webhook_oauth_scope.clone(),
        )?)
    };

    let dispatcher = Arc::new(Dispatcher::new(registry, broadcaster, webhook));

    let shutdown = CancellationToken::new();
    let rabbit_connected = Arc::new(AtomicBool::new(false));

    let health_handle = tokio::spawn({
        let state = HealthState {
            pool: db_pool.clone(),
            rabbit_connected: Arc::clone(&rabbit_connected),
        };
        let port = config.health_port;
        let shutdown = shutdown.clone();
        async move {
            if let Err(error) = relay_api::health::serve(state, port, shutdown).await {
                error!(%error, "health endpoint failed");
            }
        }
    });

    let engine = ConsumerEngine::start(
        config.consumer_config(),
        dispatcher,
        rabbit_connected,
        shutdown.clone(),
    );

    info!("relay is ready for deliveries");

    shutdown_signal().await;
    info!("shutdown signal received, starting graceful shutdown");

    shutdown.cancel();
    if let Err(error) = engine.shutdown(SHUTDOWN_TIMEOUT).await {
        warn!(%error, "consumer engine did not drain cleanly");
    }
    let _ = health_handle.await;

    if let Some(pool) = db_pool {
        pool.close().await;
        info!("database connections closed");
    }

    info!("relay shutdown complete");
    Ok(())
}

/// Initializes tracing with environment-based configuration.
fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,relay=debug"))
        .expect("Invalid RUST_LOG environment variable");

    let fmt_layer = fmt::layer().with_target(true).with_thread_ids(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

/// Creates the database connection pool with bounded retries.
async fn create_database_pool(config: &Config) -> Result<sqlx::PgPool> {
    const MAX_RETRIES: u32 = 5;
    const RETRY_DELAY: Duration = Duration::from_secs(2);

    let mut retries = 0;
    loop {
        match PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(10))
            .connect(&config.database_url())
            .await
        {
            Ok(pool) => {
                sqlx::query("SELECT 1")
                    .execute(&pool)
                    .await
                    .context("failed to verify database connection")?;
                return Ok(pool);
            },
            Err(_e) if retries < MAX_RETRIES => {
                retries += 1;
                info!(
                    attempt = retries,
                    max_retries = MAX_RETRIES,
                    "database connection failed, retrying"
                );
                tokio::time::sleep(RETRY_DELAY).await;
            },
            Err(e) => {
                return Err(e).context("failed to create database connection pool after retries");
            },
        }
    }
}

/// Ensures the log table exists.
async fn run_migrations(pool: &sqlx::PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS log (
            id UUID PRIMARY KEY,
            message TEXT NOT NULL,
            channel TEXT NOT NULL,
            level INTEGER NOT NULL,
            level_name TEXT NOT NULL,
            datetime TEXT NOT NULL,
            context JSONB NOT NULL,
            extra JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create log table")?;

    Ok(())
}

/// Waits for shutdown signal (CTRL+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received CTRL+C signal");
        },
        _ = terminate => {
            info!("received SIGTERM signal");
        },
    }
}
