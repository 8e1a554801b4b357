//! Producer-side payload construction for the logger task.
//!
//! Builds the same record shape the Laravel applications emit through
//! their Monolog channel, so Rust-side producers and tests can enqueue
//! logger tasks without hand-writing JSON.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Monolog numeric severities by level name.
fn level_number(level: &str) -> i32 {
    match level.to_lowercase().as_str() {
        "debug" => 100,
        "notice" => 250,
        "warning" => 300,
        "error" => 400,
        "critical" => 500,
        "alert" => 550,
        "emergency" => 600,
        _ => 200, // info
    }
}

/// A logger-task payload in producer wire shape.
///
/// `level` is a decimal string and empty mappings stay as maps; the
/// consuming handler normalizes both either way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogPayload {
    /// Time-ordered record id.
    pub id: String,
    /// Log message text.
    pub message: String,
    /// Producer channel, fixed to `celery`.
    pub channel: String,
    /// Numeric severity as a decimal string.
    pub level: String,
    /// Uppercased severity name.
    pub level_name: String,
    /// Formatted producer timestamp.
    pub datetime: String,
    /// Free-form context mapping.
    pub context: Map<String, Value>,
    /// Free-form extra mapping.
    pub extra: Map<String, Value>,
    /// Record creation timestamp.
    pub created_at: String,
    /// Record update timestamp.
    pub updated_at: String,
}

/// Builds a logger-task payload for the given message and level name.
pub fn log_payload(
    message: impl Into<String>,
    level: &str,
    context: Option<Map<String, Value>>,
    extra: Option<Map<String, Value>>,
) -> LogPayload {
    let datetime = Utc::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string();
    let level_num = level_number(level);

    LogPayload {
        id: Uuid::now_v7().to_string(),
        message: message.into(),
        channel: "celery".to_string(),
        level: level_num.to_string(),
        level_name: level.to_uppercase(),
        datetime: datetime.clone(),
        context: context.unwrap_or_default(),
        extra: extra.unwrap_or_default(),
        created_at: datetime.clone(),
        updated_at: datetime,
    }
}
