//! Persistent domain records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A row in the `log` table, produced by the built-in logger handler.
///
/// Field shapes mirror the Monolog-style records the producing
/// applications emit: `level` is the numeric severity, `datetime` is the
/// producer's formatted timestamp string, and `context`/`extra` are
/// free-form mappings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Time-ordered unique id (UUIDv7).
    pub id: Uuid,

    /// Log message text.
    pub message: String,

    /// Producer channel name.
    pub channel: String,

    /// Numeric severity (Monolog scale: 100 debug .. 600 emergency).
    pub level: i32,

    /// Severity name as sent by the producer.
    pub level_name: String,

    /// Producer timestamp, stored in its formatted string form.
    pub datetime: String,

    /// Free-form context mapping.
    pub context: Map<String, Value>,

    /// Free-form extra mapping.
    pub extra: Map<String, Value>,

    /// Row creation time.
    pub created_at: DateTime<Utc>,

    /// Row update time.
    pub updated_at: DateTime<Utc>,
}
