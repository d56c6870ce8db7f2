//! EventPublisher port - Interface for putting messages on the bus.
//!
//! Producers elsewhere in the process publish entity, plan and membership
//! notifications; the hub consumes them through `EventSubscriber`.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, EventEnvelope};

/// Port for publishing bus messages.
///
/// Implementations must deliver at-least-once (handlers may see
/// duplicates) and propagate handler or transport errors to the caller.
///
/// # Example
///
/// ```ignore
/// let envelope = PlanChanged { organization_id }.to_envelope()?;
/// publisher.publish(envelope).await?;
/// ```
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a single envelope.
    async fn publish(&self, event: EventEnvelope) -> Result<(), DomainError>;

    /// Publish several envelopes in order.
    async fn publish_all(&self, events: Vec<EventEnvelope>) -> Result<(), DomainError> {
        for event in events {
            self.publish(event).await?;
        }
        Ok(())
    }
}
