//! Application layer - Handlers that coordinate between ports.
//!
//! The hub reacts to two streams: bus events (routed to clients) and
//! transport lifecycle callbacks (kept in the connection registry).

pub mod handlers;

pub use handlers::{ConnectionLifecycle, EventRouter, MessageBusHub, RoutingError};
