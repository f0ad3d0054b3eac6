use std::sync::Arc;

use courier_protocol::InboundEvent;
use tracing::{debug, error, warn};

use crate::handlers::HandlerError;
use crate::registry::HandlerRegistry;

/// Event Processor
///
/// Routes an inbound event to its registered handlers, one after another.
/// The first failing handler stops the chain; work done by earlier handlers
/// is not undone.
pub struct Processor {
    registry: Arc<HandlerRegistry>,
}

impl Processor {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self { registry }
    }

    /// Dispatch one event.
    ///
    /// An event nobody handles is acknowledged: it is logged and `Ok(())` is returned.
    pub async fn process(&self, event: &InboundEvent) -> Result<(), HandlerError> {
        let handlers = match self.registry.handlers_for(&event.kind) {
            Ok(hs) => hs,
            Err(e) => {
                warn!(event_type = %event.kind, event_id = %event.id, "{e}");
                return Ok(());
            }
        };

        for (position, handler) in handlers.iter().enumerate() {
            if let Err(e) = handler.handle(event).await {
                error!(
                    error = %e,
                    event_type = %event.kind,
                    event_id = %event.id,
                    handler = position,
                    "handler failed"
                );
                return Err(e);
            }
        }

        debug!(event_type = %event.kind, event_id = %event.id, handlers = handlers.len(), "event dispatched");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::EventHandler;
    use crate::testing::ScriptedHandler;
    use serde_json::json;

    fn event(kind: &str) -> InboundEvent {
        InboundEvent::new("evt-1", kind, json!({}))
    }

    #[tokio::test]
    async fn test_first_error_stops_the_chain() {
        let h1 = Arc::new(ScriptedHandler::ok(&["T"]));
        let h2 = Arc::new(ScriptedHandler::failing(&["T"]));
        let h3 = Arc::new(ScriptedHandler::ok(&["T"]));

        let mut registry = HandlerRegistry::new();
        registry.register(h1.clone() as Arc<dyn EventHandler>);
        registry.register(h2.clone() as Arc<dyn EventHandler>);
        registry.register(h3.clone() as Arc<dyn EventHandler>);
        let processor = Processor::new(Arc::new(registry));

        let result = processor.process(&event("T")).await;

        assert!(matches!(result, Err(HandlerError::Decode { .. })));
        assert_eq!(h1.invocations(), 1);
        assert_eq!(h2.invocations(), 1);
        assert_eq!(h3.invocations(), 0);
    }

    #[tokio::test]
    async fn test_all_handlers_run_in_order() {
        let h1 = Arc::new(ScriptedHandler::ok(&["T"]));
        let h2 = Arc::new(ScriptedHandler::ok(&["T", "U"]));

        let mut registry = HandlerRegistry::new();
        registry.register(h1.clone() as Arc<dyn EventHandler>);
        registry.register(h2.clone() as Arc<dyn EventHandler>);
        let processor = Processor::new(Arc::new(registry));

        processor.process(&event("T")).await.unwrap();
        processor.process(&event("U")).await.unwrap();

        assert_eq!(h1.invocations(), 1);
        assert_eq!(h2.invocations(), 2);
    }

    #[tokio::test]
    async fn test_unroutable_event_is_acknowledged() {
        let other = Arc::new(ScriptedHandler::ok(&["T"]));
        let mut registry = HandlerRegistry::new();
        registry.register(other.clone() as Arc<dyn EventHandler>);
        let processor = Processor::new(Arc::new(registry));

        assert!(processor.process(&event("UNKNOWN")).await.is_ok());
        assert!(processor.process(&event("")).await.is_ok());
        assert_eq!(other.invocations(), 0);
    }
}
