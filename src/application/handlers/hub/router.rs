//! EventRouter - Decides who receives each domain event and dispatches it.
//!
//! Targets are resolved per event:
//! - user-entity changes go to that user's live connections,
//! - everything else goes to the organization's group,
//! - events with no resolvable target are dropped.
//!
//! Membership changes additionally move the user's live connections into or
//! out of the organization's group before the broadcast, so the broadcast
//! reaches exactly the post-change membership.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::domain::foundation::{ConnectionId, DomainError, ErrorCode, OrganizationId, UserId};
use crate::domain::messaging::{
    ChangeType, DomainEvent, EntityChanged, PlanChanged, PlanOverage, UserMembershipChanged,
};
use crate::ports::{ConnectionRegistry, HubTransport, TransportError};

/// Errors raised while routing one event.
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    #[error("Transport failed: {0}")]
    Transport(#[from] TransportError),

    #[error("Failed to serialize event payload: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<RoutingError> for DomainError {
    fn from(err: RoutingError) -> Self {
        match err {
            RoutingError::Transport(inner) => {
                DomainError::new(ErrorCode::TransportFailed, inner.to_string())
            }
            RoutingError::Serialization(inner) => {
                DomainError::new(ErrorCode::InternalError, inner.to_string())
            }
        }
    }
}

/// Routes domain events to user connections or organization groups.
///
/// Reads the connection registry but never writes it. Safe to call
/// concurrently from any number of bus deliveries.
pub struct EventRouter {
    registry: Arc<dyn ConnectionRegistry>,
    transport: Arc<dyn HubTransport>,
}

impl EventRouter {
    pub fn new(registry: Arc<dyn ConnectionRegistry>, transport: Arc<dyn HubTransport>) -> Self {
        Self {
            registry,
            transport,
        }
    }

    /// Dispatches a decoded event to its entry point.
    pub async fn route(&self, event: &DomainEvent) -> Result<(), RoutingError> {
        match event {
            DomainEvent::EntityChanged(inner) => self.on_entity_changed(Some(inner)).await,
            DomainEvent::PlanChanged(inner) => self.on_plan_changed(Some(inner)).await,
            DomainEvent::PlanOverage(inner) => self.on_plan_overage(Some(inner)).await,
            DomainEvent::UserMembershipChanged(inner) => {
                self.on_user_membership_changed(Some(inner)).await
            }
        }
    }

    /// Pushes an entity change to the affected user or organization.
    ///
    /// A change to a user with live connections goes only to that user,
    /// never to the organization as well.
    pub async fn on_entity_changed(
        &self,
        event: Option<&EntityChanged>,
    ) -> Result<(), RoutingError> {
        let Some(event) = event else {
            return Ok(());
        };

        if event.is_user_entity() {
            if let Ok(user_id) = UserId::new(event.id.as_str()) {
                let targets: Vec<ConnectionId> =
                    self.registry.connections(&user_id).into_iter().collect();
                if !targets.is_empty() {
                    debug!(
                        user_id = %user_id,
                        connections = targets.len(),
                        "Routing entity change to user"
                    );
                    let payload = serde_json::to_value(event)?;
                    self.transport
                        .send_to_connections(&targets, EntityChanged::CLIENT_EVENT, payload)
                        .await?;
                    return Ok(());
                }
            }
        }

        match &event.organization_id {
            Some(organization_id) => {
                self.broadcast(organization_id, EntityChanged::CLIENT_EVENT, event)
                    .await
            }
            None => {
                debug!(
                    entity_type = %event.entity_type,
                    entity_id = %event.id,
                    "Entity change has no routable target, dropping"
                );
                Ok(())
            }
        }
    }

    /// Broadcasts a plan change to the organization.
    pub async fn on_plan_changed(&self, event: Option<&PlanChanged>) -> Result<(), RoutingError> {
        let Some(event) = event else {
            return Ok(());
        };
        self.broadcast(&event.organization_id, PlanChanged::CLIENT_EVENT, event)
            .await
    }

    /// Broadcasts a plan overage to the organization.
    pub async fn on_plan_overage(&self, event: Option<&PlanOverage>) -> Result<(), RoutingError> {
        let Some(event) = event else {
            return Ok(());
        };
        self.broadcast(&event.organization_id, PlanOverage::CLIENT_EVENT, event)
            .await
    }

    /// Syncs the user's live connections with the organization's group,
    /// then broadcasts the change to the group.
    ///
    /// Each join/leave completes before the next one starts. The first
    /// failure stops the fan-out and is returned; nothing is broadcast.
    pub async fn on_user_membership_changed(
        &self,
        event: Option<&UserMembershipChanged>,
    ) -> Result<(), RoutingError> {
        let Some(event) = event else {
            return Ok(());
        };
        let Some(organization_id) = &event.organization_id else {
            debug!(user_id = %event.user_id, "Membership change without organization, dropping");
            return Ok(());
        };

        let connections = self.registry.connections(&event.user_id);
        for connection_id in &connections {
            match event.change_type {
                ChangeType::Added => {
                    self.transport
                        .join_group(connection_id, organization_id)
                        .await?;
                }
                ChangeType::Removed => {
                    self.transport
                        .leave_group(connection_id, organization_id)
                        .await?;
                }
                ChangeType::Saved => {}
            }
        }
        debug!(
            user_id = %event.user_id,
            organization_id = %organization_id,
            change_type = ?event.change_type,
            connections = connections.len(),
            "Synced group membership"
        );

        self.broadcast(organization_id, UserMembershipChanged::CLIENT_EVENT, event)
            .await
    }

    async fn broadcast<T: Serialize>(
        &self,
        organization_id: &OrganizationId,
        event_name: &str,
        event: &T,
    ) -> Result<(), RoutingError> {
        let payload = serde_json::to_value(event)?;
        debug!(organization_id = %organization_id, event = event_name, "Broadcasting to organization");
        self.transport
            .send_to_group(organization_id, event_name, payload)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::registry::InMemoryConnectionRegistry;
    use crate::adapters::transport::{RecordingTransport, TransportCall};
    use crate::ports::GroupMembership;
    use serde_json::{json, Map};
    use std::collections::BTreeSet;

    struct Fixture {
        registry: Arc<InMemoryConnectionRegistry>,
        transport: Arc<RecordingTransport>,
        router: EventRouter,
    }

    impl Fixture {
        /// u1 → {c1, c2}, u2 → {c3}
        fn new() -> Self {
            let registry = Arc::new(InMemoryConnectionRegistry::new());
            registry.add(&user("u1"), &conn("c1"));
            registry.add(&user("u1"), &conn("c2"));
            registry.add(&user("u2"), &conn("c3"));
            let transport = Arc::new(RecordingTransport::new());
            let router = EventRouter::new(registry.clone(), transport.clone());
            Self {
                registry,
                transport,
                router,
            }
        }
    }

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn conn(id: &str) -> ConnectionId {
        ConnectionId::from(id)
    }

    fn org(id: &str) -> OrganizationId {
        OrganizationId::new(id).unwrap()
    }

    fn conns(ids: &[&str]) -> BTreeSet<ConnectionId> {
        ids.iter().map(|id| conn(id)).collect()
    }

    fn entity(entity_type: &str, id: &str, organization: Option<&str>) -> EntityChanged {
        EntityChanged {
            entity_type: entity_type.to_string(),
            id: id.to_string(),
            organization_id: OrganizationId::from_optional(organization),
            project_id: None,
            stack_id: None,
            change_type: ChangeType::Saved,
            data: Map::new(),
        }
    }

    fn membership(change_type: ChangeType, user_id: &str, organization: &str) -> UserMembershipChanged {
        UserMembershipChanged {
            change_type,
            user_id: user(user_id),
            organization_id: OrganizationId::from_optional(Some(organization)),
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Entity changes
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn user_entity_goes_only_to_user_connections() {
        let fx = Fixture::new();
        let event = entity("User", "u1", Some(""));

        fx.router.on_entity_changed(Some(&event)).await.unwrap();

        let calls = fx.transport.calls();
        assert_eq!(calls.len(), 1);
        match &calls[0] {
            TransportCall::SendToConnections {
                connection_ids,
                event_name,
                payload,
            } => {
                assert_eq!(connection_ids, &conns(&["c1", "c2"]));
                assert_eq!(event_name, "entityChanged");
                assert_eq!(payload["id"], "u1");
            }
            other => panic!("unexpected call {:?}", other),
        }
        assert!(fx.transport.group_sends().is_empty());
    }

    #[tokio::test]
    async fn user_entity_with_connections_skips_organization_broadcast() {
        let fx = Fixture::new();
        let event = entity("User", "u2", Some("o1"));

        fx.router.on_entity_changed(Some(&event)).await.unwrap();

        assert!(fx.transport.group_sends().is_empty());
        assert_eq!(
            fx.transport.sends(),
            vec![TransportCall::SendToConnections {
                connection_ids: conns(&["c3"]),
                event_name: "entityChanged".to_string(),
                payload: serde_json::to_value(&event).unwrap(),
            }]
        );
    }

    #[tokio::test]
    async fn offline_user_entity_falls_back_to_organization() {
        let fx = Fixture::new();
        let event = entity("User", "u9", Some("o1"));

        fx.router.on_entity_changed(Some(&event)).await.unwrap();

        let sends = fx.transport.group_sends();
        assert_eq!(sends.len(), 1);
        assert!(matches!(
            &sends[0],
            TransportCall::SendToGroup { organization_id, event_name, .. }
                if organization_id == &org("o1") && event_name == "entityChanged"
        ));
    }

    #[tokio::test]
    async fn non_user_entity_broadcasts_even_if_id_matches_a_user() {
        let fx = Fixture::new();
        let event = entity("Project", "u1", Some("o1"));

        fx.router.on_entity_changed(Some(&event)).await.unwrap();

        assert_eq!(fx.transport.group_sends().len(), 1);
        assert_eq!(fx.transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn entity_without_target_is_dropped() {
        let fx = Fixture::new();

        fx.router
            .on_entity_changed(Some(&entity("Project", "p1", None)))
            .await
            .unwrap();
        fx.router
            .on_entity_changed(Some(&entity("User", "offline", Some(""))))
            .await
            .unwrap();

        assert!(fx.transport.calls().is_empty());
    }

    #[tokio::test]
    async fn entity_change_payload_is_camel_case() {
        let fx = Fixture::new();
        let mut event = entity("Stack", "s1", Some("o1"));
        event.project_id = Some("p1".to_string());

        fx.router.on_entity_changed(Some(&event)).await.unwrap();

        match &fx.transport.group_sends()[0] {
            TransportCall::SendToGroup { payload, .. } => {
                assert_eq!(
                    payload,
                    &json!({
                        "type": "Stack",
                        "id": "s1",
                        "organizationId": "o1",
                        "projectId": "p1",
                        "changeType": "Saved"
                    })
                );
            }
            other => panic!("unexpected call {:?}", other),
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Plan events
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn plan_changed_broadcasts_to_organization() {
        let fx = Fixture::new();
        let event = PlanChanged {
            organization_id: org("o1"),
        };

        fx.router.on_plan_changed(Some(&event)).await.unwrap();

        assert_eq!(
            fx.transport.calls(),
            vec![TransportCall::SendToGroup {
                organization_id: org("o1"),
                event_name: "planChanged".to_string(),
                payload: json!({"organizationId": "o1"}),
                recipients: BTreeSet::new(),
            }]
        );
    }

    #[tokio::test]
    async fn plan_overage_broadcasts_to_organization() {
        let fx = Fixture::new();
        fx.transport.join_group(&conn("c3"), &org("o2")).await.unwrap();
        fx.transport.clear_calls();
        let event = PlanOverage {
            organization_id: org("o2"),
            is_hourly: true,
        };

        fx.router.on_plan_overage(Some(&event)).await.unwrap();

        match &fx.transport.calls()[0] {
            TransportCall::SendToGroup {
                event_name,
                payload,
                recipients,
                ..
            } => {
                assert_eq!(event_name, "planOverage");
                assert_eq!(payload["isHourly"], true);
                assert_eq!(recipients, &conns(&["c3"]));
            }
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[tokio::test]
    async fn absent_events_are_noops() {
        let fx = Fixture::new();

        fx.router.on_entity_changed(None).await.unwrap();
        fx.router.on_plan_changed(None).await.unwrap();
        fx.router.on_plan_overage(None).await.unwrap();
        fx.router.on_user_membership_changed(None).await.unwrap();

        assert!(fx.transport.calls().is_empty());
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Membership changes
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn added_membership_joins_every_connection_before_broadcast() {
        let fx = Fixture::new();

        fx.router
            .on_user_membership_changed(Some(&membership(ChangeType::Added, "u1", "o1")))
            .await
            .unwrap();

        let calls = fx.transport.calls();
        assert_eq!(calls.len(), 3);
        let joined: BTreeSet<ConnectionId> = calls[..2]
            .iter()
            .map(|call| match call {
                TransportCall::JoinGroup {
                    connection_id,
                    organization_id,
                } => {
                    assert_eq!(organization_id, &org("o1"));
                    connection_id.clone()
                }
                other => panic!("expected join, got {:?}", other),
            })
            .collect();
        assert_eq!(joined, conns(&["c1", "c2"]));

        match &calls[2] {
            TransportCall::SendToGroup {
                event_name,
                recipients,
                ..
            } => {
                assert_eq!(event_name, "userMembershipChanged");
                assert_eq!(recipients, &conns(&["c1", "c2"]));
            }
            other => panic!("expected broadcast, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn removed_membership_leaves_before_broadcast() {
        let fx = Fixture::new();
        for id in ["c1", "c2", "c3"] {
            fx.transport.join_group(&conn(id), &org("o1")).await.unwrap();
        }
        fx.transport.clear_calls();

        fx.router
            .on_user_membership_changed(Some(&membership(ChangeType::Removed, "u1", "o1")))
            .await
            .unwrap();

        let calls = fx.transport.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls[..2]
            .iter()
            .all(|call| matches!(call, TransportCall::LeaveGroup { .. })));
        match &calls[2] {
            TransportCall::SendToGroup { recipients, .. } => {
                assert_eq!(recipients, &conns(&["c3"]));
            }
            other => panic!("expected broadcast, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn membership_change_for_offline_user_only_broadcasts() {
        let fx = Fixture::new();

        fx.router
            .on_user_membership_changed(Some(&membership(ChangeType::Added, "u9", "o1")))
            .await
            .unwrap();

        let calls = fx.transport.calls();
        assert_eq!(calls.len(), 1);
        assert!(matches!(calls[0], TransportCall::SendToGroup { .. }));
    }

    #[tokio::test]
    async fn saved_membership_broadcasts_without_group_changes() {
        let fx = Fixture::new();

        fx.router
            .on_user_membership_changed(Some(&membership(ChangeType::Saved, "u1", "o1")))
            .await
            .unwrap();

        let calls = fx.transport.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].is_send());
    }

    #[tokio::test]
    async fn membership_change_without_organization_is_noop() {
        let fx = Fixture::new();

        fx.router
            .on_user_membership_changed(Some(&membership(ChangeType::Added, "u1", "")))
            .await
            .unwrap();

        assert!(fx.transport.calls().is_empty());
    }

    #[tokio::test]
    async fn join_failure_aborts_fan_out_without_broadcast() {
        let registry = Arc::new(InMemoryConnectionRegistry::new());
        registry.add(&user("u1"), &conn("c1"));
        let transport = Arc::new(RecordingTransport::new());
        transport.fail_membership_for(conn("c1"));
        let router = EventRouter::new(registry, transport.clone());

        let result = router
            .on_user_membership_changed(Some(&membership(ChangeType::Added, "u1", "o1")))
            .await;

        assert!(matches!(
            result,
            Err(RoutingError::Transport(TransportError::Unavailable(_)))
        ));
        assert!(transport.sends().is_empty());
    }

    #[tokio::test]
    async fn route_dispatches_by_variant() {
        let fx = Fixture::new();

        fx.router
            .route(&DomainEvent::PlanChanged(PlanChanged {
                organization_id: org("o1"),
            }))
            .await
            .unwrap();
        fx.router
            .route(&DomainEvent::EntityChanged(entity("User", "u2", None)))
            .await
            .unwrap();

        let calls = fx.transport.calls();
        assert!(matches!(&calls[0], TransportCall::SendToGroup { event_name, .. } if event_name == "planChanged"));
        assert!(matches!(&calls[1], TransportCall::SendToConnections { connection_ids, .. } if connection_ids == &conns(&["c3"])));
        assert_eq!(fx.registry.connection_count(), 3);
    }

    #[test]
    fn routing_error_maps_to_domain_error_codes() {
        let err: DomainError =
            RoutingError::Transport(TransportError::Unavailable("down".to_string())).into();
        assert_eq!(err.code, ErrorCode::TransportFailed);
    }
}
