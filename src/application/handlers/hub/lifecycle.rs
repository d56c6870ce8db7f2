//! ConnectionLifecycle - Keeps the registry and group membership in step
//! with the live connection set.
//!
//! The transport calls in on connect, reconnect and disconnect. Each call
//! validates the connection's state transition first; a rejected transition
//! has no side effects.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::domain::foundation::{DomainError, StateMachine, ValidationError};
use crate::domain::messaging::{ConnectionState, DisconnectReason, TrackedConnection};
use crate::ports::{ConnectionRegistry, GroupMembership};

/// Handles connection lifecycle callbacks from the transport.
///
/// The only writer of the connection registry.
pub struct ConnectionLifecycle {
    registry: Arc<dyn ConnectionRegistry>,
    groups: Arc<dyn GroupMembership>,
}

impl ConnectionLifecycle {
    pub fn new(registry: Arc<dyn ConnectionRegistry>, groups: Arc<dyn GroupMembership>) -> Self {
        Self { registry, groups }
    }

    /// A new physical connection opened.
    ///
    /// Joins every organization group of the identity, then registers the
    /// connection under its user.
    pub async fn on_connect(&self, connection: &mut TrackedConnection) -> Result<(), DomainError> {
        // Connected → Connected is a reconnect, not a connect.
        if connection.state() != ConnectionState::Connecting {
            return Err(ValidationError::invalid_format(
                "state_transition",
                format!("Cannot connect from {:?}", connection.state()),
            )
            .into());
        }
        let next = connection.state().transition_to(ConnectionState::Connected)?;

        self.join_organizations(connection).await;
        self.registry
            .add(connection.user_id(), connection.connection_id());
        connection.set_state(next);

        debug!(
            connection_id = %connection.connection_id(),
            user_id = %connection.user_id(),
            "Connection registered"
        );
        Ok(())
    }

    /// A client resumed an existing logical connection.
    ///
    /// Re-issues the group joins and registers the connection only if it is
    /// not registered already.
    pub async fn on_reconnect(
        &self,
        connection: &mut TrackedConnection,
    ) -> Result<(), DomainError> {
        let next = connection.state().transition_to(ConnectionState::Connected)?;

        self.join_organizations(connection).await;
        let user_id = connection.user_id();
        let connection_id = connection.connection_id();
        if !self.registry.contains(user_id, connection_id) {
            self.registry.add(user_id, connection_id);
        }
        connection.set_state(next);

        debug!(
            connection_id = %connection.connection_id(),
            user_id = %connection.user_id(),
            "Connection resumed"
        );
        Ok(())
    }

    /// A physical connection closed.
    ///
    /// Group memberships are released by the transport, not here.
    pub async fn on_disconnect(
        &self,
        connection: &mut TrackedConnection,
        reason: DisconnectReason,
    ) -> Result<(), DomainError> {
        let next = connection
            .state()
            .transition_to(ConnectionState::Disconnected)?;

        self.registry
            .remove(connection.user_id(), connection.connection_id());
        connection.set_state(next);

        debug!(
            connection_id = %connection.connection_id(),
            user_id = %connection.user_id(),
            reason = ?reason,
            "Connection unregistered"
        );
        Ok(())
    }

    /// Requests every join concurrently; failures are logged, not returned.
    async fn join_organizations(&self, connection: &TrackedConnection) {
        let connection_id = connection.connection_id();
        let organizations = &connection.context().identity.organization_ids;

        let joins = organizations
            .iter()
            .map(|organization_id| async move {
                (
                    organization_id,
                    self.groups.join_group(connection_id, organization_id).await,
                )
            });

        for (organization_id, result) in join_all(joins).await {
            if let Err(err) = result {
                warn!(
                    connection_id = %connection_id,
                    organization_id = %organization_id,
                    error = %err,
                    "Failed to join organization group"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::registry::InMemoryConnectionRegistry;
    use crate::adapters::transport::{RecordingTransport, TransportCall};
    use crate::domain::foundation::{ConnectionId, ErrorCode, Identity, OrganizationId, UserId};
    use crate::domain::messaging::ConnectionContext;
    use std::collections::HashSet;

    struct Fixture {
        registry: Arc<InMemoryConnectionRegistry>,
        transport: Arc<RecordingTransport>,
        lifecycle: ConnectionLifecycle,
    }

    impl Fixture {
        fn new() -> Self {
            let registry = Arc::new(InMemoryConnectionRegistry::new());
            let transport = Arc::new(RecordingTransport::new());
            let lifecycle = ConnectionLifecycle::new(registry.clone(), transport.clone());
            Self {
                registry,
                transport,
                lifecycle,
            }
        }
    }

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn org(id: &str) -> OrganizationId {
        OrganizationId::new(id).unwrap()
    }

    fn tracked(connection: &str, user_id: &str, organizations: &[&str]) -> TrackedConnection {
        let identity = Identity::new(user(user_id), organizations.iter().map(|o| org(o)).collect());
        TrackedConnection::new(ConnectionContext::new(ConnectionId::from(connection), identity))
    }

    fn joined_organizations(calls: &[TransportCall]) -> HashSet<OrganizationId> {
        calls
            .iter()
            .filter_map(|call| match call {
                TransportCall::JoinGroup {
                    organization_id, ..
                } => Some(organization_id.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn connect_joins_every_organization_and_registers() {
        let fx = Fixture::new();
        let mut connection = tracked("c1", "u1", &["o1", "o2"]);

        fx.lifecycle.on_connect(&mut connection).await.unwrap();

        assert_eq!(connection.state(), ConnectionState::Connected);
        assert!(fx.registry.contains(&user("u1"), &ConnectionId::from("c1")));
        assert_eq!(
            joined_organizations(&fx.transport.calls()),
            [org("o1"), org("o2")].into_iter().collect()
        );
    }

    #[tokio::test]
    async fn connect_without_organizations_only_registers() {
        let fx = Fixture::new();
        let mut connection = tracked("c1", "u1", &[]);

        fx.lifecycle.on_connect(&mut connection).await.unwrap();

        assert!(fx.transport.calls().is_empty());
        assert_eq!(fx.registry.connection_count(), 1);
    }

    #[tokio::test]
    async fn failed_join_does_not_abort_connect() {
        let fx = Fixture::new();
        fx.transport.fail_membership_for(ConnectionId::from("c1"));
        let mut connection = tracked("c1", "u1", &["o1", "o2"]);

        fx.lifecycle.on_connect(&mut connection).await.unwrap();

        // Both joins were requested even though both failed.
        assert_eq!(fx.transport.calls().len(), 2);
        assert!(fx.registry.contains(&user("u1"), &ConnectionId::from("c1")));
        assert_eq!(connection.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn connect_twice_is_rejected_without_side_effects() {
        let fx = Fixture::new();
        let mut connection = tracked("c1", "u1", &["o1"]);
        fx.lifecycle.on_connect(&mut connection).await.unwrap();
        fx.transport.clear_calls();

        let err = fx.lifecycle.on_connect(&mut connection).await.unwrap_err();

        assert_eq!(err.code, ErrorCode::InvalidStateTransition);
        assert!(fx.transport.calls().is_empty());
    }

    #[tokio::test]
    async fn reconnect_rejoins_without_duplicate_registration() {
        let fx = Fixture::new();
        let mut connection = tracked("c1", "u1", &["o1"]);
        fx.lifecycle.on_connect(&mut connection).await.unwrap();

        fx.lifecycle.on_reconnect(&mut connection).await.unwrap();

        assert_eq!(
            fx.registry.connections(&user("u1")),
            [ConnectionId::from("c1")].into_iter().collect()
        );
        assert_eq!(fx.transport.calls().len(), 2);
        assert_eq!(connection.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn reconnect_of_unregistered_connection_registers_it() {
        let fx = Fixture::new();
        let mut connection = tracked("c7", "u1", &["o1"]);

        fx.lifecycle.on_reconnect(&mut connection).await.unwrap();

        assert!(fx.registry.contains(&user("u1"), &ConnectionId::from("c7")));
        assert!(fx.transport.members(&org("o1")).contains(&ConnectionId::from("c7")));
    }

    #[tokio::test]
    async fn disconnect_unregisters_and_leaves_groups_to_transport() {
        let fx = Fixture::new();
        let mut connection = tracked("c1", "u1", &["o1"]);
        fx.lifecycle.on_connect(&mut connection).await.unwrap();
        fx.transport.clear_calls();

        fx.lifecycle
            .on_disconnect(&mut connection, DisconnectReason::ClientClosed)
            .await
            .unwrap();

        assert_eq!(connection.state(), ConnectionState::Disconnected);
        assert_eq!(fx.registry.user_count(), 0);
        assert!(fx.transport.calls().is_empty());
    }

    #[tokio::test]
    async fn disconnected_connection_cannot_come_back() {
        let fx = Fixture::new();
        let mut connection = tracked("c1", "u1", &["o1"]);
        fx.lifecycle.on_connect(&mut connection).await.unwrap();
        fx.lifecycle
            .on_disconnect(&mut connection, DisconnectReason::ServerClosed)
            .await
            .unwrap();
        fx.transport.clear_calls();

        assert!(fx.lifecycle.on_reconnect(&mut connection).await.is_err());
        assert!(fx
            .lifecycle
            .on_disconnect(&mut connection, DisconnectReason::ClientClosed)
            .await
            .is_err());
        assert!(fx.transport.calls().is_empty());
        assert_eq!(fx.registry.connection_count(), 0);
    }

    #[tokio::test]
    async fn disconnect_keeps_other_connections_of_user() {
        let fx = Fixture::new();
        let mut first = tracked("c1", "u1", &[]);
        let mut second = tracked("c2", "u1", &[]);
        fx.lifecycle.on_connect(&mut first).await.unwrap();
        fx.lifecycle.on_connect(&mut second).await.unwrap();

        fx.lifecycle
            .on_disconnect(&mut first, DisconnectReason::TransportError)
            .await
            .unwrap();

        assert_eq!(
            fx.registry.connections(&user("u1")),
            [ConnectionId::from("c2")].into_iter().collect()
        );
    }
}
