//! Transport ports - Commands the hub issues against live connections.
//!
//! The transport owns physical connections and group membership. The hub
//! never mirrors group state; it only asks the transport to join, leave
//! and send.
//!
//! Groups are keyed by organization: one broadcast group per
//! `OrganizationId`.

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::domain::foundation::{ConnectionId, OrganizationId};

/// Errors a transport can report for a join, leave or send.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The connection id is held by a different user.
    #[error("Connection {0} belongs to another user")]
    NotOwner(ConnectionId),

    /// The transport refused or failed the operation.
    #[error("Transport unavailable: {0}")]
    Unavailable(String),
}

/// Port for the transport's join/leave-group primitive.
///
/// Joining a group the connection is already in, or leaving one it is not
/// in, must succeed without effect.
#[async_trait]
pub trait GroupMembership: Send + Sync {
    /// Add a connection to an organization's group.
    async fn join_group(
        &self,
        connection_id: &ConnectionId,
        organization_id: &OrganizationId,
    ) -> Result<(), TransportError>;

    /// Remove a connection from an organization's group.
    async fn leave_group(
        &self,
        connection_id: &ConnectionId,
        organization_id: &OrganizationId,
    ) -> Result<(), TransportError>;
}

/// Port for pushing named events to clients.
///
/// Sends are fire-and-forget: an empty group or an empty connection list
/// is a no-op, not an error.
///
/// # Example
///
/// ```ignore
/// transport
///     .send_to_group(&organization_id, "planChanged", payload)
///     .await?;
/// ```
#[async_trait]
pub trait HubTransport: GroupMembership {
    /// Push an event to every connection in an organization's group.
    async fn send_to_group(
        &self,
        organization_id: &OrganizationId,
        event_name: &str,
        payload: JsonValue,
    ) -> Result<(), TransportError>;

    /// Push an event to exactly the given connections.
    ///
    /// Used for user-targeted sends, with the targets taken from the
    /// connection registry.
    async fn send_to_connections(
        &self,
        connection_ids: &[ConnectionId],
        event_name: &str,
        payload: JsonValue,
    ) -> Result<(), TransportError>;
}
