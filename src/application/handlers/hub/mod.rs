//! Hub handlers - routing of bus events and connection lifecycle.

mod lifecycle;
mod message_bus_hub;
mod router;

pub use lifecycle::ConnectionLifecycle;
pub use message_bus_hub::MessageBusHub;
pub use router::{EventRouter, RoutingError};
