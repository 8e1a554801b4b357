//! Built-in handler persisting Monolog-style log records.
//!
//! Producers serialize records loosely: `level` arrives as an integer,
//! float, or decimal string, and empty `context`/`extra` mappings
//! arrive as empty arrays (PHP's json_encode of an empty array). The
//! handler normalizes all of it before touching the database.

use chrono::{NaiveDateTime, Utc};
use relay_core::{LogRecord, TaskError, TaskHandler};
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::log_store::LogStore;

/// Datetime layouts tried in order against the producer's string.
const DATETIME_FORMATS: &[&str] =
    &["%Y-%m-%d %H:%M:%S%.6f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M:%S%.3f"];

/// Format used when storing the parsed timestamp back as a string.
const DATETIME_STORE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Handler for the `logger` task.
pub struct LoggerHandler {
    store: Option<LogStore>,
}

#[derive(Debug, Deserialize)]
struct LoggerPayload {
    #[serde(default)]
    message: String,
    #[serde(default)]
    channel: String,
    #[serde(default)]
    level: Value,
    #[serde(default)]
    level_name: String,
    #[serde(default)]
    datetime: String,
    #[serde(default)]
    context: Value,
    #[serde(default)]
    extra: Value,
}

impl LoggerHandler {
    /// Creates the handler.
    ///
    /// Pass `None` when no database is configured; the handler then
    /// logs a skip and reports success, so log traffic does not
    /// dead-letter during a database outage.
    pub fn new(store: Option<LogStore>) -> Self {
        Self { store }
    }

    fn build_record(payload: LoggerPayload) -> LogRecord {
        let now = Utc::now();

        LogRecord {
            id: Uuid::now_v7(),
            message: payload.message,
            channel: payload.channel,
            level: normalize_level(&payload.level),
            level_name: payload.level_name,
            datetime: parse_datetime(&payload.datetime).format(DATETIME_STORE_FORMAT).to_string(),
            context: normalize_map(payload.context),
            extra: normalize_map(payload.extra),
            created_at: now,
            updated_at: now,
        }
    }
}

#[async_trait::async_trait]
impl TaskHandler for LoggerHandler {
    async fn handle(&self, _cancel: CancellationToken, payload: Value) -> relay_core::Result<()> {
        let payload: LoggerPayload = serde_json::from_value(payload)
            .map_err(|e| TaskError::Payload(format!("failed to decode logger payload: {e}")))?;

        let record = Self::build_record(payload);

        let Some(store) = &self.store else {
            warn!(id = %record.id, "database not connected, skipping log record");
            return Ok(());
        };

        store.insert(&record).await?;
        debug!(id = %record.id, "log record saved");
        Ok(())
    }
}

/// Normalizes the loosely-typed `level` field to its numeric value.
///
/// Unknown shapes become 0 with a warning rather than failing the task.
fn normalize_level(value: &Value) -> i32 {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i as i32
            } else if let Some(f) = n.as_f64() {
                f as i32
            } else {
                warn!(%value, "log level out of range, defaulting to 0");
                0
            }
        },
        Value::String(s) => s.parse::<i32>().unwrap_or_else(|_| {
            warn!(level = %s, "invalid log level string, defaulting to 0");
            0
        }),
        other => {
            warn!(level = %other, "invalid log level type, defaulting to 0");
            0
        },
    }
}

/// Normalizes `context`/`extra` to a mapping.
///
/// Arrays collapse to the empty mapping: producers that serialize an
/// empty PHP array send `[]` where a map is meant.
fn normalize_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Parses the producer timestamp, falling back to now with a warning.
fn parse_datetime(raw: &str) -> NaiveDateTime {
    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return parsed;
        }
    }
    warn!(datetime = raw, "invalid log datetime, defaulting to now");
    Utc::now().naive_utc()
}
