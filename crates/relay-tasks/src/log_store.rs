//! Persistence for log records.

use relay_core::{LogRecord, TaskError};
use sqlx::{types::Json, PgPool};

/// Repository for the `log` table.
///
/// The store is an optional collaborator: a worker without a configured
/// database runs with no store at all, and the logger handler degrades
/// to log-and-skip.
#[derive(Clone)]
pub struct LogStore {
    pool: PgPool,
}

impl LogStore {
    /// Creates a store over the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts one log record.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Storage`] if the insert fails; the failure
    /// is transient from the dispatcher's point of view and eligible
    /// for retry.
    pub async fn insert(&self, record: &LogRecord) -> Result<(), TaskError> {
        sqlx::query(
            r"
            INSERT INTO log (
                id, message, channel, level, level_name, datetime,
                context, extra, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ",
        )
        .bind(record.id)
        .bind(&record.message)
        .bind(&record.channel)
        .bind(record.level)
        .bind(&record.level_name)
        .bind(&record.datetime)
        .bind(Json(&record.context))
        .bind(Json(&record.extra))
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| TaskError::Storage(format!("failed to insert log record: {e}")))?;

        Ok(())
    }

    /// Verifies database connectivity with a lightweight query.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Storage`] if the connection is unhealthy.
    pub async fn health_check(&self) -> Result<(), TaskError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| TaskError::Storage(e.to_string()))?;

        Ok(())
    }
}
