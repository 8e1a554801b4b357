//! Name-to-handler registry.
//!
//! The registry is assembled during process initialization and shared
//! behind an `Arc` for the worker pool's lifetime. All writes happen
//! before the pool starts; afterwards the map is only read.

use std::{collections::HashMap, sync::Arc};

use crate::handler::TaskHandler;

/// Mapping from task name to handler.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler under the given task name.
    ///
    /// # Panics
    ///
    /// Panics if a handler is already registered under `name`. Duplicate
    /// registration silently shadowing an existing handler is a
    /// programmer error, so it aborts startup instead.
    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        let name = name.into();
        assert!(
            !self.handlers.contains_key(&name),
            "task handler already registered for {name}"
        );
        self.handlers.insert(name, handler);
    }

    /// Returns the handler registered under `name`, if any.
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(name).cloned()
    }

    /// Removes all registered handlers. Intended for test resets.
    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::error::Result;

    struct NoopHandler;

    #[async_trait::async_trait]
    impl TaskHandler for NoopHandler {
        async fn handle(&self, _cancel: CancellationToken, _payload: Value) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn lookup_before_registration_yields_none() {
        let registry = HandlerRegistry::new();
        assert!(registry.lookup("logger").is_none());
    }

    #[test]
    fn registered_handler_is_found() {
        let mut registry = HandlerRegistry::new();
        registry.register("logger", Arc::new(NoopHandler));

        assert!(registry.lookup("logger").is_some());
        assert!(registry.lookup("other").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn duplicate_registration_panics() {
        let mut registry = HandlerRegistry::new();
        registry.register("logger", Arc::new(NoopHandler));
        registry.register("logger", Arc::new(NoopHandler));
    }

    #[test]
    fn clear_resets_registry() {
        let mut registry = HandlerRegistry::new();
        registry.register("logger", Arc::new(NoopHandler));
        registry.clear();

        assert!(registry.is_empty());
        assert!(registry.lookup("logger").is_none());

        // Re-registration after clear must not panic.
        registry.register("logger", Arc::new(NoopHandler));
    }
}
