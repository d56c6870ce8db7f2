//! In-process event bus.
//!
//! Delivers each published envelope to the handlers subscribed to its event
//! type, in subscription order, before `publish` returns. Keeps a bounded
//! history of recent envelopes for inspection.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{trace, warn};

use crate::domain::foundation::{DomainError, ErrorCode, EventEnvelope};
use crate::ports::{EventHandler, EventPublisher, EventSubscriber};

/// Default number of envelopes kept in the history.
pub const DEFAULT_HISTORY_CAPACITY: usize = 256;

/// Process-local event bus.
///
/// Features:
/// - Synchronous delivery (deterministic ordering per publisher)
/// - Handler registration per event type
/// - Bounded history of published envelopes
///
/// # Example
///
/// ```ignore
/// let bus = Arc::new(InMemoryEventBus::new());
/// hub.register(bus.as_ref());
///
/// bus.publish(PlanChanged { organization_id }.to_envelope()?).await?;
///
/// assert!(bus.has_event("plan.changed.v1"));
/// ```
pub struct InMemoryEventBus {
    handlers: DashMap<String, Vec<Arc<dyn EventHandler>>>,
    history: Mutex<VecDeque<EventEnvelope>>,
    history_capacity: usize,
}

impl InMemoryEventBus {
    /// Creates a new bus with the default history capacity.
    pub fn new() -> Self {
        Self::with_history_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// Creates a new bus keeping at most `capacity` recent envelopes.
    pub fn with_history_capacity(capacity: usize) -> Self {
        Self {
            handlers: DashMap::new(),
            history: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            history_capacity: capacity,
        }
    }

    /// Returns the recent published envelopes, oldest first.
    pub fn published_events(&self) -> Vec<EventEnvelope> {
        self.history().iter().cloned().collect()
    }

    /// Returns recent envelopes of a specific type.
    pub fn events_of_type(&self, event_type: &str) -> Vec<EventEnvelope> {
        self.history()
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    /// Clears the history.
    pub fn clear(&self) {
        self.history().clear();
    }

    /// Returns the number of envelopes in the history.
    pub fn event_count(&self) -> usize {
        self.history().len()
    }

    /// Checks if an envelope of the given type is in the history.
    pub fn has_event(&self, event_type: &str) -> bool {
        self.history().iter().any(|e| e.event_type == event_type)
    }

    /// Number of handlers subscribed to an event type.
    pub fn handler_count(&self, event_type: &str) -> usize {
        self.handlers
            .get(event_type)
            .map(|handlers| handlers.len())
            .unwrap_or(0)
    }

    fn history(&self) -> MutexGuard<'_, VecDeque<EventEnvelope>> {
        // History is append/clear only; a panic mid-push leaves it usable.
        self.history.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, event: &EventEnvelope) {
        if self.history_capacity == 0 {
            return;
        }
        let mut history = self.history();
        while history.len() >= self.history_capacity {
            history.pop_front();
        }
        history.push_back(event.clone());
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, event: EventEnvelope) -> Result<(), DomainError> {
        self.record(&event);

        // Clone handlers to release the shard lock before await points
        let type_handlers: Vec<Arc<dyn EventHandler>> = self
            .handlers
            .get(&event.event_type)
            .map(|handlers| handlers.clone())
            .unwrap_or_default();

        trace!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            handlers = type_handlers.len(),
            "Publishing event"
        );

        let mut errors = Vec::new();
        let mut codes = Vec::new();
        for handler in type_handlers {
            if let Err(e) = handler.handle(event.clone()).await {
                warn!(
                    handler = handler.name(),
                    event_id = %event.event_id,
                    error = %e,
                    "Event handler failed"
                );
                errors.push(format!("{}: {}", handler.name(), e));
                codes.push(e.code);
            }
        }

        let Some(&first_code) = codes.first() else {
            return Ok(());
        };
        // Handlers failing for the same reason keep their code; mixed
        // failures collapse to an internal error.
        let code = if codes.iter().all(|code| *code == first_code) {
            first_code
        } else {
            ErrorCode::InternalError
        };

        Err(DomainError::new(code, format!("Handler errors: {}", errors.join(", ")))
            .with_detail("event_id", event.event_id.as_str()))
    }

    async fn publish_all(&self, events: Vec<EventEnvelope>) -> Result<(), DomainError> {
        for event in events {
            self.publish(event).await?;
        }
        Ok(())
    }
}

impl EventSubscriber for InMemoryEventBus {
    fn subscribe(&self, event_type: &str, handler: Arc<dyn EventHandler>) {
        self.handlers
            .entry(event_type.to_string())
            .or_default()
            .push(handler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn envelope(event_type: &str, aggregate_id: &str) -> EventEnvelope {
        EventEnvelope::new(event_type, aggregate_id, "Organization", json!({}))
    }

    struct CountingHandler(Arc<AtomicUsize>);

    #[async_trait]
    impl EventHandler for CountingHandler {
        async fn handle(&self, _: EventEnvelope) -> Result<(), DomainError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn name(&self) -> &'static str {
            "CountingHandler"
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl EventHandler for FailingHandler {
        async fn handle(&self, _: EventEnvelope) -> Result<(), DomainError> {
            Err(DomainError::new(ErrorCode::TransportFailed, "Handler failed"))
        }
        fn name(&self) -> &'static str {
            "FailingHandler"
        }
    }

    #[tokio::test]
    async fn publish_records_event() {
        let bus = InMemoryEventBus::new();

        bus.publish(envelope("plan.changed.v1", "o1")).await.unwrap();

        assert_eq!(bus.event_count(), 1);
        assert!(bus.has_event("plan.changed.v1"));
        assert_eq!(bus.events_of_type("plan.overage.v1").len(), 0);
    }

    #[tokio::test]
    async fn history_is_bounded() {
        let bus = InMemoryEventBus::with_history_capacity(2);

        for id in ["o1", "o2", "o3"] {
            bus.publish(envelope("plan.changed.v1", id)).await.unwrap();
        }

        let ids: Vec<String> = bus
            .published_events()
            .into_iter()
            .map(|e| e.aggregate_id)
            .collect();
        assert_eq!(ids, vec!["o2", "o3"]);
    }

    #[tokio::test]
    async fn zero_capacity_keeps_no_history_but_still_delivers() {
        let bus = InMemoryEventBus::with_history_capacity(0);
        let counter = Arc::new(AtomicUsize::new(0));
        bus.subscribe("plan.changed.v1", Arc::new(CountingHandler(counter.clone())));

        bus.publish(envelope("plan.changed.v1", "o1")).await.unwrap();

        assert_eq!(bus.event_count(), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn every_subscribed_handler_is_invoked() {
        let bus = InMemoryEventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));

        bus.subscribe("plan.changed.v1", Arc::new(CountingHandler(counter.clone())));
        bus.subscribe("plan.changed.v1", Arc::new(CountingHandler(counter.clone())));

        bus.publish(envelope("plan.changed.v1", "o1")).await.unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(bus.handler_count("plan.changed.v1"), 2);
    }

    #[tokio::test]
    async fn subscribe_all_registers_for_multiple_types() {
        let bus = InMemoryEventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));

        bus.subscribe_all(
            &["plan.changed.v1", "plan.overage.v1"],
            Arc::new(CountingHandler(counter.clone())),
        );

        bus.publish(envelope("plan.changed.v1", "o1")).await.unwrap();
        bus.publish(envelope("plan.overage.v1", "o1")).await.unwrap();
        bus.publish(envelope("entity.changed.v1", "p1")).await.unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn handler_error_is_reported_after_all_handlers_run() {
        let bus = InMemoryEventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        bus.subscribe("plan.changed.v1", Arc::new(FailingHandler));
        bus.subscribe("plan.changed.v1", Arc::new(CountingHandler(counter.clone())));

        let result = bus.publish(envelope("plan.changed.v1", "o1")).await;

        let err = result.unwrap_err();
        assert!(err.message.contains("FailingHandler"));
        assert_eq!(err.code, ErrorCode::TransportFailed);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    struct BrokenHandler;

    #[async_trait]
    impl EventHandler for BrokenHandler {
        async fn handle(&self, _: EventEnvelope) -> Result<(), DomainError> {
            Err(DomainError::new(ErrorCode::InternalError, "Handler broke"))
        }
        fn name(&self) -> &'static str {
            "BrokenHandler"
        }
    }

    #[tokio::test]
    async fn mixed_handler_failures_report_internal_error() {
        let bus = InMemoryEventBus::new();
        bus.subscribe("plan.changed.v1", Arc::new(FailingHandler));
        bus.subscribe("plan.changed.v1", Arc::new(BrokenHandler));

        let err = bus
            .publish(envelope("plan.changed.v1", "o1"))
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::InternalError);
        assert!(err.message.contains("FailingHandler"));
        assert!(err.message.contains("BrokenHandler"));
    }

    #[tokio::test]
    async fn publish_all_stops_at_first_failure() {
        let bus = InMemoryEventBus::new();
        bus.subscribe("plan.overage.v1", Arc::new(FailingHandler));

        let result = bus
            .publish_all(vec![
                envelope("plan.changed.v1", "o1"),
                envelope("plan.overage.v1", "o1"),
                envelope("plan.changed.v1", "o2"),
            ])
            .await;

        assert!(result.is_err());
        assert_eq!(bus.event_count(), 2);
    }

    #[tokio::test]
    async fn clear_empties_history() {
        let bus = InMemoryEventBus::new();
        bus.publish(envelope("plan.changed.v1", "o1")).await.unwrap();

        bus.clear();

        assert_eq!(bus.event_count(), 0);
    }
}
