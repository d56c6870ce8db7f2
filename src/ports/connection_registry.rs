//! ConnectionRegistry port - Which live connections belong to which user.
//!
//! A user may hold several connections at once (browser tabs, devices).
//! The lifecycle controller is the only writer; the router reads
//! snapshots to resolve user-targeted sends.
//!
//! ## Contract
//!
//! - `add` is idempotent and cannot fail
//! - `remove` is a no-op for unknown users or connections
//! - `connections` returns a point-in-time copy, never a live view
//! - each add/remove is atomic with respect to readers of the same user

use std::collections::HashSet;

use crate::domain::foundation::{ConnectionId, UserId};

/// Port for tracking a user's live connections.
///
/// # Example
///
/// ```ignore
/// // Transport on connect:
/// registry.add(&user_id, &connection_id);
///
/// // Router resolving a user-targeted send:
/// let targets = registry.connections(&user_id);
///
/// // Transport on disconnect:
/// registry.remove(&user_id, &connection_id);
/// ```
pub trait ConnectionRegistry: Send + Sync {
    /// Record that `connection_id` belongs to `user_id`.
    fn add(&self, user_id: &UserId, connection_id: &ConnectionId);

    /// Forget `connection_id` for `user_id`.
    ///
    /// When the user's last connection goes, the user is forgotten too.
    fn remove(&self, user_id: &UserId, connection_id: &ConnectionId);

    /// Snapshot of the user's live connections; empty if none.
    fn connections(&self, user_id: &UserId) -> HashSet<ConnectionId>;

    /// Check whether this exact (user, connection) pair is registered.
    fn contains(&self, user_id: &UserId, connection_id: &ConnectionId) -> bool {
        self.connections(user_id).contains(connection_id)
    }

    /// Number of users with at least one live connection.
    fn user_count(&self) -> usize;

    /// Total live connections across all users.
    fn connection_count(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time check that trait is object-safe
    #[allow(dead_code)]
    fn assert_object_safe(_: &dyn ConnectionRegistry) {}
}
