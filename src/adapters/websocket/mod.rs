//! WebSocket adapters for the real-time hub.
//!
//! Pushes routed hub events to connected clients over WebSocket.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         Event Bus                                    │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                     │ delivers
//!                                     ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                 MessageBusHub → EventRouter                          │
//! │   - Decodes envelopes into domain events                             │
//! │   - Picks user connections or an organization group                  │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                     │ sends
//!                                     ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                      WebSocketTransport                              │
//! │   Group: org-1         Group: org-2         Outbound queues          │
//! │   ├── conn-a           ├── conn-a           conn-a, conn-b, ...      │
//! │   └── conn-b           └── conn-d                                    │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`messages`] - WebSocket message protocol types
//! - [`transport`] - Outbound queues and organization groups
//! - [`handler`] - Axum WebSocket upgrade handler driving the lifecycle

pub mod handler;
pub mod messages;
pub mod transport;

pub use handler::{websocket_router, ws_handler, HubQuery, WebSocketState};
pub use messages::{
    ClientMessage, ConnectedMessage, ErrorMessage, EventMessage, PongMessage, ServerMessage,
};
pub use transport::{Attachment, WebSocketTransport};
