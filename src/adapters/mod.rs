//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the hub core to its collaborators:
//! - `auth` - Identity resolution (static token table)
//! - `events` - Event bus implementations (in-memory)
//! - `http` - Internal REST endpoints (health, publish)
//! - `registry` - Connection registry (in-memory)
//! - `transport` - Protocol-agnostic transports (recording)
//! - `websocket` - WebSocket transport and upgrade handler

pub mod auth;
pub mod events;
pub mod http;
pub mod registry;
pub mod transport;
pub mod websocket;

pub use auth::StaticIdentityResolver;
pub use events::InMemoryEventBus;
pub use registry::InMemoryConnectionRegistry;
pub use transport::{RecordingTransport, TransportCall};
pub use websocket::WebSocketTransport;
