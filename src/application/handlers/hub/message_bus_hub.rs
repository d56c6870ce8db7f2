//! MessageBusHub - Bridges the message bus to the event router.
//!
//! Subscribes once per routed event type at startup, decodes each envelope
//! into a typed `DomainEvent` and hands it to the router.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::domain::foundation::{DomainError, EventEnvelope};
use crate::domain::messaging::DomainEvent;
use crate::ports::{EventHandler, EventSubscriber};

use super::EventRouter;

/// Bus-facing entry point of the hub.
pub struct MessageBusHub {
    router: EventRouter,
}

impl MessageBusHub {
    pub fn new(router: EventRouter) -> Self {
        Self { router }
    }

    /// Convenience for wiring: builds the hub behind an `Arc`.
    pub fn new_shared(router: EventRouter) -> Arc<Self> {
        Arc::new(Self::new(router))
    }

    /// Subscribes the hub to every routed event type.
    ///
    /// Subscriptions live for the lifetime of the subscriber.
    pub fn register(self: &Arc<Self>, subscriber: &dyn EventSubscriber) {
        subscriber.subscribe_all(&DomainEvent::EVENT_TYPES, Arc::clone(self) as Arc<dyn EventHandler>);
        debug!(event_types = ?DomainEvent::EVENT_TYPES, "MessageBusHub subscribed");
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }
}

#[async_trait]
impl EventHandler for MessageBusHub {
    async fn handle(&self, envelope: EventEnvelope) -> Result<(), DomainError> {
        let event = match DomainEvent::from_envelope(&envelope) {
            Ok(Some(event)) => event,
            Ok(None) => {
                debug!(
                    event_id = %envelope.event_id,
                    event_type = %envelope.event_type,
                    "Ignoring unrouted event type"
                );
                return Ok(());
            }
            Err(err) => {
                debug!(
                    event_id = %envelope.event_id,
                    event_type = %envelope.event_type,
                    error = %err,
                    "Dropping undecodable event"
                );
                return Ok(());
            }
        };

        self.router.route(&event).await.map_err(|err| {
            DomainError::from(err)
                .with_detail("event_id", envelope.event_id.as_str())
                .with_detail("event_type", envelope.event_type.as_str())
        })
    }

    fn name(&self) -> &'static str {
        "MessageBusHub"
    }
}
