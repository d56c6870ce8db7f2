//! In-process connection registry.
//!
//! Backed by a sharded concurrent map so that users on different shards
//! never contend, while every mutation of one user's set happens under
//! that shard's lock.

use std::collections::HashSet;

use dashmap::DashMap;
use tracing::trace;

use crate::domain::foundation::{ConnectionId, UserId};
use crate::ports::ConnectionRegistry;

/// Registry of live connections per user, held in memory.
///
/// Connection state is not persisted; a restarted process starts empty and
/// clients re-register as they reconnect.
#[derive(Debug, Default)]
pub struct InMemoryConnectionRegistry {
    users: DashMap<UserId, HashSet<ConnectionId>>,
}

impl InMemoryConnectionRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConnectionRegistry for InMemoryConnectionRegistry {
    fn add(&self, user_id: &UserId, connection_id: &ConnectionId) {
        let inserted = self
            .users
            .entry(user_id.clone())
            .or_default()
            .insert(connection_id.clone());
        trace!(user_id = %user_id, connection_id = %connection_id, inserted, "Registry add");
    }

    fn remove(&self, user_id: &UserId, connection_id: &ConnectionId) {
        // Removing the entry in the same critical section keeps "empty set"
        // and "absent user" indistinguishable to readers.
        let emptied = self
            .users
            .remove_if_mut(user_id, |_, connections| {
                connections.remove(connection_id);
                connections.is_empty()
            })
            .is_some();
        trace!(user_id = %user_id, connection_id = %connection_id, emptied, "Registry remove");
    }

    fn connections(&self, user_id: &UserId) -> HashSet<ConnectionId> {
        self.users
            .get(user_id)
            .map(|connections| connections.value().clone())
            .unwrap_or_default()
    }

    fn contains(&self, user_id: &UserId, connection_id: &ConnectionId) -> bool {
        self.users
            .get(user_id)
            .map(|connections| connections.contains(connection_id))
            .unwrap_or(false)
    }

    fn user_count(&self) -> usize {
        self.users.len()
    }

    fn connection_count(&self) -> usize {
        self.users.iter().map(|entry| entry.value().len()).sum()
    }
}
