//! EventSubscriber port - Interface for receiving bus messages.
//!
//! The hub registers its handler once at startup, one subscription per
//! routed event type, and never unsubscribes. Delivery semantics
//! (ordering, at-least-once) belong to the bus implementation.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::foundation::{DomainError, EventEnvelope};

/// Handler for processing bus messages.
///
/// Implementations should be:
/// - **Idempotent** - The bus may deliver the same envelope twice
/// - **Quick** - Fan-out only, no long-running work
/// - **Isolated** - A failure affects only the envelope being handled
///
/// # Example
///
/// ```ignore
/// #[async_trait]
/// impl EventHandler for MessageBusHub {
///     async fn handle(&self, event: EventEnvelope) -> Result<(), DomainError> {
///         let Some(event) = DomainEvent::from_envelope(&event).ok().flatten() else {
///             return Ok(());
///         };
///         self.router.route(event).await
///     }
///
///     fn name(&self) -> &'static str {
///         "MessageBusHub"
///     }
/// }
/// ```
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Process one envelope.
    async fn handle(&self, event: EventEnvelope) -> Result<(), DomainError>;

    /// Handler name for logging.
    fn name(&self) -> &'static str;
}

/// Port for subscribing to bus messages by event type.
///
/// # Example
///
/// ```ignore
/// subscriber.subscribe("plan.changed.v1", hub.clone());
/// subscriber.subscribe_all(&DomainEvent::EVENT_TYPES, hub);
/// ```
pub trait EventSubscriber: Send + Sync {
    /// Subscribe handler to a specific event type.
    fn subscribe(&self, event_type: &str, handler: Arc<dyn EventHandler>);

    /// Subscribe handler to multiple event types.
    fn subscribe_all(&self, event_types: &[&str], handler: Arc<dyn EventHandler>) {
        for event_type in event_types {
            self.subscribe(event_type, Arc::clone(&handler));
        }
    }
}

/// Combined trait for bus implementations that publish and subscribe.
pub trait EventBus: super::EventPublisher + EventSubscriber {}

impl<T: super::EventPublisher + EventSubscriber> EventBus for T {}
