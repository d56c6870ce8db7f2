//! Application handlers.
//!
//! Event handlers and lifecycle callbacks that orchestrate the hub.

pub mod hub;

pub use hub::{ConnectionLifecycle, EventRouter, MessageBusHub, RoutingError};
