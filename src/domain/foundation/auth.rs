//! Authentication types for the domain layer.
//!
//! `Identity` is what the identity collaborator hands back for an
//! authenticated connection: who the user is and which organizations they
//! currently belong to. Any auth provider can populate it via the
//! `IdentityResolver` port.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{OrganizationId, UserId};

/// Authenticated principal behind a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// The unique user identifier from the auth provider.
    pub user_id: UserId,

    /// Organizations the user is a member of at resolution time.
    #[serde(default)]
    pub organization_ids: Vec<OrganizationId>,
}

impl Identity {
    /// Creates a new identity.
    pub fn new(user_id: UserId, organization_ids: Vec<OrganizationId>) -> Self {
        Self {
            user_id,
            organization_ids,
        }
    }

    /// Returns true if the identity belongs to the given organization.
    pub fn is_member_of(&self, organization_id: &OrganizationId) -> bool {
        self.organization_ids.contains(organization_id)
    }
}

/// Authentication errors that can occur while resolving a connection's identity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No credentials were presented.
    #[error("Missing credentials")]
    MissingCredentials,

    /// The token is malformed, unknown or revoked.
    #[error("Invalid or expired token")]
    InvalidToken,

    /// The identity source is unavailable (network, config, etc.).
    #[error("Identity service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl AuthError {
    /// Creates a service unavailable error with a message.
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable(message.into())
    }

    /// Returns true if this is a transient error that may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::ServiceUnavailable(_))
    }
}
