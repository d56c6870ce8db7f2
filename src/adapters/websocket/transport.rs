//! In-process WebSocket transport with organization groups.
//!
//! Each attached connection owns a bounded outbound channel drained by its
//! socket task. Groups are sets of connection ids keyed by organization.
//!
//! # Architecture
//!
//! ```text
//! Group: org-1          Group: org-2
//! ├── conn-a            ├── conn-a
//! ├── conn-b            └── conn-d
//! └── conn-c
//! ```
//!
//! A broadcast to org-1 reaches a, b and c; a connection may sit in several
//! groups at once.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use serde_json::Value as JsonValue;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

use crate::domain::foundation::{ConnectionId, OrganizationId, UserId};
use crate::ports::{GroupMembership, HubTransport, TransportError};

use super::messages::ServerMessage;

/// Outbound half of one attached connection.
#[derive(Debug)]
struct Outbound {
    generation: u64,
    owner: UserId,
    sender: mpsc::Sender<ServerMessage>,
}

/// Receiving half handed to the socket task on attach.
#[derive(Debug)]
pub struct Attachment {
    pub connection_id: ConnectionId,
    /// Distinguishes this attachment from a later one for the same id.
    pub generation: u64,
    pub receiver: mpsc::Receiver<ServerMessage>,
}

#[derive(Debug, Default)]
struct GroupTable {
    /// organization → member connections
    members: HashMap<OrganizationId, HashSet<ConnectionId>>,
    /// connection → organizations it joined, for O(1) cleanup on detach
    memberships: HashMap<ConnectionId, HashSet<OrganizationId>>,
}

/// WebSocket-backed implementation of the transport ports.
///
/// # Thread Safety
///
/// Outbound channels live in a sharded map so sends to different
/// connections don't contend. The group table sits behind one `RwLock`
/// since broadcasts (reads) vastly outnumber joins/leaves (writes), and the
/// two indexes inside it must change together.
pub struct WebSocketTransport {
    connections: DashMap<ConnectionId, Outbound>,
    groups: RwLock<GroupTable>,
    next_generation: AtomicU64,
    channel_capacity: usize,
}

impl WebSocketTransport {
    /// Create a transport whose per-connection queues hold `channel_capacity`
    /// messages. Slow clients that fill their queue miss further pushes.
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            connections: DashMap::new(),
            groups: RwLock::new(GroupTable::default()),
            next_generation: AtomicU64::new(1),
            channel_capacity: channel_capacity.max(1),
        }
    }

    /// Create with default capacity (128 messages).
    pub fn with_default_capacity() -> Self {
        Self::new(128)
    }

    /// Attach a socket owned by `owner` to `connection_id` and return its
    /// outbound queue.
    ///
    /// Attaching an id the same user already holds (a client resuming its
    /// connection on a new socket) replaces the previous queue; the old
    /// socket task sees its queue close. An id held by another user is
    /// refused and the existing attachment is left untouched.
    pub fn attach(
        &self,
        connection_id: ConnectionId,
        owner: UserId,
    ) -> Result<Attachment, TransportError> {
        let (sender, receiver) = mpsc::channel(self.channel_capacity);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let outbound = Outbound {
            generation,
            owner,
            sender,
        };

        let replaced = match self.connections.entry(connection_id.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().owner != outbound.owner {
                    warn!(
                        connection_id = %connection_id,
                        "Refused attach to a connection held by another user"
                    );
                    return Err(TransportError::NotOwner(connection_id));
                }
                entry.insert(outbound);
                true
            }
            Entry::Vacant(entry) => {
                entry.insert(outbound);
                false
            }
        };
        debug!(connection_id = %connection_id, generation, replaced, "Attached connection");

        Ok(Attachment {
            connection_id,
            generation,
            receiver,
        })
    }

    /// User holding the connection, if it is attached.
    pub fn owner_of(&self, connection_id: &ConnectionId) -> Option<UserId> {
        self.connections
            .get(connection_id)
            .map(|outbound| outbound.owner.clone())
    }

    /// Detach a socket and release all its group memberships.
    ///
    /// Only the attachment that is still current is removed; returns false
    /// if a newer attachment superseded this one, in which case nothing
    /// changes.
    pub async fn detach(&self, connection_id: &ConnectionId, generation: u64) -> bool {
        let removed = self
            .connections
            .remove_if(connection_id, |_, outbound| outbound.generation == generation)
            .is_some();
        if !removed {
            return false;
        }

        let mut groups = self.groups.write().await;
        if let Some(organizations) = groups.memberships.remove(connection_id) {
            for organization_id in organizations {
                let now_empty = match groups.members.get_mut(&organization_id) {
                    Some(members) => {
                        members.remove(connection_id);
                        members.is_empty()
                    }
                    None => false,
                };
                if now_empty {
                    groups.members.remove(&organization_id);
                }
            }
        }
        debug!(connection_id = %connection_id, generation, "Detached connection");
        true
    }

    /// Queue a message for one connection.
    ///
    /// Returns false if the connection is not attached or its queue is full
    /// or closed.
    pub fn push(&self, connection_id: &ConnectionId, message: ServerMessage) -> bool {
        let Some(outbound) = self.connections.get(connection_id) else {
            return false;
        };
        match outbound.sender.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(connection_id = %connection_id, "Outbound queue full, dropping message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Check whether a connection currently has a socket attached.
    pub fn is_attached(&self, connection_id: &ConnectionId) -> bool {
        self.connections.contains_key(connection_id)
    }

    /// Number of attached connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Current members of an organization's group (for monitoring/tests).
    pub async fn group_members(&self, organization_id: &OrganizationId) -> HashSet<ConnectionId> {
        self.groups
            .read()
            .await
            .members
            .get(organization_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Organizations with at least one member.
    pub async fn active_groups(&self) -> Vec<OrganizationId> {
        self.groups.read().await.members.keys().cloned().collect()
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[async_trait]
impl GroupMembership for WebSocketTransport {
    async fn join_group(
        &self,
        connection_id: &ConnectionId,
        organization_id: &OrganizationId,
    ) -> Result<(), TransportError> {
        // A socket torn down after the targets were resolved has nothing to
        // join; its groups were released on detach.
        if !self.is_attached(connection_id) {
            debug!(
                connection_id = %connection_id,
                organization_id = %organization_id,
                "Skipping join for detached connection"
            );
            return Ok(());
        }

        let mut groups = self.groups.write().await;
        groups
            .members
            .entry(organization_id.clone())
            .or_default()
            .insert(connection_id.clone());
        groups
            .memberships
            .entry(connection_id.clone())
            .or_default()
            .insert(organization_id.clone());
        Ok(())
    }

    async fn leave_group(
        &self,
        connection_id: &ConnectionId,
        organization_id: &OrganizationId,
    ) -> Result<(), TransportError> {
        let mut groups = self.groups.write().await;

        let now_empty = match groups.members.get_mut(organization_id) {
            Some(members) => {
                members.remove(connection_id);
                members.is_empty()
            }
            None => false,
        };
        if now_empty {
            groups.members.remove(organization_id);
        }

        if let Some(organizations) = groups.memberships.get_mut(connection_id) {
            organizations.remove(organization_id);
            if organizations.is_empty() {
                groups.memberships.remove(connection_id);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl HubTransport for WebSocketTransport {
    async fn send_to_group(
        &self,
        organization_id: &OrganizationId,
        event_name: &str,
        payload: JsonValue,
    ) -> Result<(), TransportError> {
        let members: Vec<ConnectionId> = {
            let groups = self.groups.read().await;
            match groups.members.get(organization_id) {
                Some(members) => members.iter().cloned().collect(),
                None => return Ok(()),
            }
        };

        self.send_to_connections(&members, event_name, payload).await
    }

    async fn send_to_connections(
        &self,
        connection_ids: &[ConnectionId],
        event_name: &str,
        payload: JsonValue,
    ) -> Result<(), TransportError> {
        let message = ServerMessage::event(event_name, payload);
        for connection_id in connection_ids {
            // Missing or closed queues are connections torn down after the
            // targets were resolved.
            self.push(connection_id, message.clone());
        }
        Ok(())
    }
}
