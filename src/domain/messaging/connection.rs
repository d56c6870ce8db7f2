//! Per-connection lifecycle state.

use serde::Serialize;

use crate::domain::foundation::{ConnectionId, Identity, StateMachine, UserId};

/// Lifecycle state of one physical connection.
///
/// ```text
/// Connecting ──connect/reconnect──▶ Connected ──disconnect──▶ Disconnected
///     │                              ▲     │                       ▲
///     │                              └─────┘ reconnect             │
///     └───────────────────────disconnect───────────────────────────┘
/// ```
///
/// `Disconnected` is terminal; a new physical connection starts a new
/// state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
}

impl StateMachine for ConnectionState {
    fn can_transition_to(&self, target: &Self) -> bool {
        use ConnectionState::*;
        matches!(
            (self, target),
            (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connected, Connected)
                | (Connected, Disconnected)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use ConnectionState::*;
        match self {
            Connecting => vec![Connected, Disconnected],
            Connected => vec![Connected, Disconnected],
            Disconnected => vec![],
        }
    }
}

/// What the transport knows about a connection when it invokes a
/// lifecycle callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionContext {
    pub connection_id: ConnectionId,
    pub identity: Identity,
}

impl ConnectionContext {
    pub fn new(connection_id: ConnectionId, identity: Identity) -> Self {
        Self {
            connection_id,
            identity,
        }
    }

    pub fn user_id(&self) -> &UserId {
        &self.identity.user_id
    }
}

/// Why the transport tore a connection down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    /// The client closed the connection.
    ClientClosed,
    /// The server stopped the connection (shutdown, send failure).
    ServerClosed,
    /// The transport failed underneath the connection.
    TransportError,
}

/// A connection's context together with its lifecycle state.
///
/// Owned by the transport task driving the connection; the lifecycle
/// controller advances its state.
#[derive(Debug, Clone)]
pub struct TrackedConnection {
    context: ConnectionContext,
    state: ConnectionState,
}

impl TrackedConnection {
    /// Starts tracking a connection in the `Connecting` state.
    pub fn new(context: ConnectionContext) -> Self {
        Self {
            context,
            state: ConnectionState::Connecting,
        }
    }

    pub fn context(&self) -> &ConnectionContext {
        &self.context
    }

    pub fn connection_id(&self) -> &ConnectionId {
        &self.context.connection_id
    }

    pub fn user_id(&self) -> &UserId {
        self.context.user_id()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
    }
}
