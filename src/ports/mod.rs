//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the hub core and its collaborators. Adapters implement these ports.
//!
//! ## Bus Ports
//!
//! - `EventPublisher` - Put messages on the process-wide bus
//! - `EventSubscriber` - Register handlers per event type
//! - `EventHandler` - Handler invoked for each delivered envelope
//!
//! ## Connection Ports
//!
//! - `ConnectionRegistry` - User → live connections multimap
//! - `GroupMembership` - Transport join/leave-group primitive
//! - `HubTransport` - Transport send primitives
//! - `IdentityResolver` - Token → user and organizations

mod connection_registry;
mod event_publisher;
mod event_subscriber;
mod hub_transport;
mod identity_resolver;

pub use connection_registry::ConnectionRegistry;
pub use event_publisher::EventPublisher;
pub use event_subscriber::{EventBus, EventHandler, EventSubscriber};
pub use hub_transport::{GroupMembership, HubTransport, TransportError};
pub use identity_resolver::IdentityResolver;
