use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use courier_protocol::InboundEvent;
use thiserror::Error;

use crate::handlers::HandlerError;

/// A type-specific adapter invoked for the event kinds it declares.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Event kinds this handler answers to (e.g. `["USER_REGISTERED"]`)
    fn event_types(&self) -> &[&'static str];

    /// Decode the event payload and act on it
    async fn handle(&self, event: &InboundEvent) -> Result<(), HandlerError>;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no handler registered for event type {0:?}")]
    NoHandler(String),
}

/// Maps an event kind to the handlers interested in it, in registration order.
///
/// Registration happens once at startup; afterwards the registry is shared
/// behind an `Arc` and only read.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Vec<Arc<dyn EventHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn EventHandler>) {
        for kind in handler.event_types() {
            self.handlers
                .entry((*kind).to_string())
                .or_default()
                .push(handler.clone());
        }
    }

    pub fn handlers_for(&self, kind: &str) -> Result<&[Arc<dyn EventHandler>], RegistryError> {
        match self.handlers.get(kind) {
            Some(hs) if !hs.is_empty() => Ok(hs.as_slice()),
            _ => Err(RegistryError::NoHandler(kind.to_string())),
        }
    }

    /// Registered event kinds, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named {
        kinds: &'static [&'static str],
    }

    #[async_trait]
    impl EventHandler for Named {
        fn event_types(&self) -> &[&'static str] {
            self.kinds
        }

        async fn handle(&self, _event: &InboundEvent) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    fn named(kinds: &'static [&'static str]) -> Arc<dyn EventHandler> {
        Arc::new(Named { kinds })
    }

    fn same(found: &[Arc<dyn EventHandler>], expected: &[Arc<dyn EventHandler>]) -> bool {
        found.len() == expected.len()
            && found.iter().zip(expected).all(|(a, b)| Arc::ptr_eq(a, b))
    }

    #[test]
    fn test_registration_order_is_preserved() {
        let h1 = named(&["T"]);
        let h2 = named(&["T"]);
        let h3 = named(&["T"]);

        let mut registry = HandlerRegistry::new();
        registry.register(h1.clone());
        registry.register(h2.clone());
        registry.register(h3.clone());

        let found = registry.handlers_for("T").unwrap();
        assert!(same(found, &[h1.clone(), h2.clone(), h3.clone()]));
        assert!(!same(found, &[h2, h1, h3]));
    }

    #[test]
    fn test_multi_kind_handler_lands_in_every_list() {
        let both = named(&["A", "B"]);
        let only_b = named(&["B"]);

        let mut registry = HandlerRegistry::new();
        registry.register(both.clone());
        registry.register(only_b.clone());

        assert_eq!(registry.handlers_for("A").unwrap().len(), 1);
        assert!(same(registry.handlers_for("B").unwrap(), &[both, only_b]));
        assert_eq!(registry.kinds(), vec!["A", "B"]);
    }

    #[test]
    fn test_unknown_kind_is_not_found() {
        let registry = HandlerRegistry::new();
        assert_eq!(
            registry.handlers_for("NOPE").err(),
            Some(RegistryError::NoHandler("NOPE".to_string()))
        );
    }
}
