//! WebSocket message types for the hub protocol.
//!
//! Defines the protocol between server and connected clients:
//! - Server → Client: connection acknowledgement, pushed events, errors, pongs
//! - Client → Server: pings

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::domain::foundation::Timestamp;

// ============================================
// Server → Client Messages
// ============================================

/// All message types that can be sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection established and registered.
    Connected(ConnectedMessage),

    /// A routed hub event (`entityChanged`, `planChanged`, ...).
    Event(EventMessage),

    /// Error occurred.
    Error(ErrorMessage),

    /// Heartbeat response.
    Pong(PongMessage),
}

impl ServerMessage {
    /// Builds an event push with the current timestamp.
    pub fn event(name: impl Into<String>, data: JsonValue) -> Self {
        Self::Event(EventMessage {
            event: name.into(),
            data,
            timestamp: Timestamp::now().to_rfc3339(),
        })
    }

    /// Builds a pong with the current timestamp.
    pub fn pong() -> Self {
        Self::Pong(PongMessage {
            timestamp: Timestamp::now().to_rfc3339(),
        })
    }
}

/// Sent once when a client connects.
///
/// Clients keep `connection_id` and present it when reconnecting so the hub
/// can resume the same logical connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedMessage {
    pub connection_id: String,
    pub user_id: String,
    pub resumed: bool,
    pub timestamp: String,
}

/// Pushed event with its payload passed through verbatim.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventMessage {
    pub event: String,
    pub data: JsonValue,
    pub timestamp: String,
}

/// Error message sent to client (also used as HTTP error body).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorMessage {
    pub code: String,
    pub message: String,
    pub timestamp: String,
}

impl ErrorMessage {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            timestamp: Timestamp::now().to_rfc3339(),
        }
    }
}

/// Heartbeat response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PongMessage {
    pub timestamp: String,
}

// ============================================
// Client → Server Messages
// ============================================

/// All message types that can be received from client.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Heartbeat request.
    Ping,
}
