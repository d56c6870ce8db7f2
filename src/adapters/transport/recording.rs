//! Recording transport for testing.
//!
//! Implements the transport ports in memory and records every call in the
//! order it was issued, so tests can assert on routing targets and on the
//! ordering of group changes relative to broadcasts.
//!
//! # Security Note
//!
//! This adapter is for **testing only**. It uses `.expect()` on lock
//! operations which will panic if locks are poisoned.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::domain::foundation::{ConnectionId, OrganizationId};
use crate::ports::{GroupMembership, HubTransport, TransportError};

/// One call made against the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    JoinGroup {
        connection_id: ConnectionId,
        organization_id: OrganizationId,
    },
    LeaveGroup {
        connection_id: ConnectionId,
        organization_id: OrganizationId,
    },
    SendToGroup {
        organization_id: OrganizationId,
        event_name: String,
        payload: JsonValue,
        /// Group members at the moment of the send.
        recipients: BTreeSet<ConnectionId>,
    },
    SendToConnections {
        connection_ids: BTreeSet<ConnectionId>,
        event_name: String,
        payload: JsonValue,
    },
}

impl TransportCall {
    /// Returns true for join/leave calls.
    pub fn is_membership_change(&self) -> bool {
        matches!(self, Self::JoinGroup { .. } | Self::LeaveGroup { .. })
    }

    /// Returns true for either kind of send.
    pub fn is_send(&self) -> bool {
        !self.is_membership_change()
    }
}

/// In-memory transport that records calls and tracks group membership.
///
/// # Example
///
/// ```ignore
/// let transport = Arc::new(RecordingTransport::new());
/// let router = EventRouter::new(registry, transport.clone());
///
/// router.on_plan_changed(Some(&event)).await?;
///
/// assert_eq!(transport.group_sends().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct RecordingTransport {
    calls: Mutex<Vec<TransportCall>>,
    groups: Mutex<HashMap<OrganizationId, HashSet<ConnectionId>>>,
    failing_connections: Mutex<HashSet<ConnectionId>>,
}

impl RecordingTransport {
    /// Creates a new transport with no groups and no recorded calls.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every join/leave for `connection_id` fail.
    pub fn fail_membership_for(&self, connection_id: ConnectionId) {
        self.failing_connections
            .lock()
            .expect("RecordingTransport: failure lock poisoned")
            .insert(connection_id);
    }

    /// Returns all recorded calls in order.
    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls
            .lock()
            .expect("RecordingTransport: calls lock poisoned")
            .clone()
    }

    /// Returns only the send calls, in order.
    pub fn sends(&self) -> Vec<TransportCall> {
        self.calls().into_iter().filter(TransportCall::is_send).collect()
    }

    /// Returns only the group broadcasts, in order.
    pub fn group_sends(&self) -> Vec<TransportCall> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, TransportCall::SendToGroup { .. }))
            .collect()
    }

    /// Returns the current members of an organization's group.
    pub fn members(&self, organization_id: &OrganizationId) -> HashSet<ConnectionId> {
        self.groups
            .lock()
            .expect("RecordingTransport: groups lock poisoned")
            .get(organization_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Forgets recorded calls, keeping group membership.
    pub fn clear_calls(&self) {
        self.calls
            .lock()
            .expect("RecordingTransport: calls lock poisoned")
            .clear();
    }

    fn record(&self, call: TransportCall) {
        self.calls
            .lock()
            .expect("RecordingTransport: calls lock poisoned")
            .push(call);
    }

    fn check_failure(&self, connection_id: &ConnectionId) -> Result<(), TransportError> {
        let failing = self
            .failing_connections
            .lock()
            .expect("RecordingTransport: failure lock poisoned");
        if failing.contains(connection_id) {
            return Err(TransportError::Unavailable(format!(
                "membership change rejected for {}",
                connection_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl GroupMembership for RecordingTransport {
    async fn join_group(
        &self,
        connection_id: &ConnectionId,
        organization_id: &OrganizationId,
    ) -> Result<(), TransportError> {
        self.record(TransportCall::JoinGroup {
            connection_id: connection_id.clone(),
            organization_id: organization_id.clone(),
        });
        self.check_failure(connection_id)?;

        self.groups
            .lock()
            .expect("RecordingTransport: groups lock poisoned")
            .entry(organization_id.clone())
            .or_default()
            .insert(connection_id.clone());
        Ok(())
    }

    async fn leave_group(
        &self,
        connection_id: &ConnectionId,
        organization_id: &OrganizationId,
    ) -> Result<(), TransportError> {
        self.record(TransportCall::LeaveGroup {
            connection_id: connection_id.clone(),
            organization_id: organization_id.clone(),
        });
        self.check_failure(connection_id)?;

        if let Some(members) = self
            .groups
            .lock()
            .expect("RecordingTransport: groups lock poisoned")
            .get_mut(organization_id)
        {
            members.remove(connection_id);
        }
        Ok(())
    }
}

#[async_trait]
impl HubTransport for RecordingTransport {
    async fn send_to_group(
        &self,
        organization_id: &OrganizationId,
        event_name: &str,
        payload: JsonValue,
    ) -> Result<(), TransportError> {
        let recipients = self.members(organization_id).into_iter().collect();
        self.record(TransportCall::SendToGroup {
            organization_id: organization_id.clone(),
            event_name: event_name.to_string(),
            payload,
            recipients,
        });
        Ok(())
    }

    async fn send_to_connections(
        &self,
        connection_ids: &[ConnectionId],
        event_name: &str,
        payload: JsonValue,
    ) -> Result<(), TransportError> {
        self.record(TransportCall::SendToConnections {
            connection_ids: connection_ids.iter().cloned().collect(),
            event_name: event_name.to_string(),
            payload,
        });
        Ok(())
    }
}
