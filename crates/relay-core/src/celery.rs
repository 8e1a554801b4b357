//! Celery protocol v2 message body.
//!
//! The inter-op publish path produces messages a Python Celery worker
//! fleet can consume. The body is a three-element ordered sequence
//! `[args, kwargs, metadata]`; task identity travels in the AMQP
//! headers, not the body.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Celery v2 body: `[args, kwargs, metadata]`.
///
/// Serialized as a JSON array, matching the wire shape Celery expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CeleryBody(pub Vec<Value>, pub Map<String, Value>, pub CeleryMetadata);

/// Fixed metadata mapping of the v2 body.
///
/// All four fields are always present and null; this worker does not
/// produce canvases (chains, chords, or callbacks).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CeleryMetadata {
    /// Celery callback signature list, always null.
    pub callbacks: Option<Value>,
    /// Celery error-callback signature list, always null.
    pub errbacks: Option<Value>,
    /// Celery chain continuation, always null.
    pub chain: Option<Value>,
    /// Celery chord coordination, always null.
    pub chord: Option<Value>,
}

impl CeleryBody {
    /// Builds a v2 body with the given positional arguments, empty
    /// kwargs, and the fixed null metadata.
    pub fn new(args: Vec<Value>) -> Self {
        Self(args, Map::new(), CeleryMetadata::default())
    }

    /// Positional arguments.
    pub fn args(&self) -> &[Value] {
        &self.0
    }

    /// Keyword arguments (always empty on the publish path).
    pub fn kwargs(&self) -> &Map<String, Value> {
        &self.1
    }

    /// Fixed metadata mapping.
    pub fn metadata(&self) -> &CeleryMetadata {
        &self.2
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn body_serializes_as_three_element_array() {
        let body = CeleryBody::new(vec![json!("v1"), json!("v2"), json!("v3")]);
        let encoded = serde_json::to_value(&body).unwrap();

        assert_eq!(
            encoded,
            json!([
                ["v1", "v2", "v3"],
                {},
                {"callbacks": null, "errbacks": null, "chain": null, "chord": null}
            ])
        );
    }

    #[test]
    fn body_round_trips() {
        let body = CeleryBody::new(vec![json!("2025-12-01"), json!({"format": "pdf"})]);
        let bytes = serde_json::to_vec(&body).unwrap();
        let decoded: CeleryBody = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(decoded, body);
        assert!(decoded.kwargs().is_empty());
        assert_eq!(decoded.metadata(), &CeleryMetadata::default());
    }

    #[test]
    fn empty_args_still_produce_full_shape() {
        let body = CeleryBody::new(Vec::new());
        let encoded = serde_json::to_value(&body).unwrap();

        let elements = encoded.as_array().unwrap();
        assert_eq!(elements.len(), 3);
        assert_eq!(elements[0], json!([]));
    }
}
