//! IdentityResolver port - Who is behind a connection.
//!
//! Authentication happens upstream; the hub only needs the user id and
//! the organizations the user belongs to at connect time.

use async_trait::async_trait;

use crate::domain::foundation::{AuthError, Identity};

/// Resolves a bearer token presented by a connecting client.
///
/// # Contract
///
/// Implementations must:
/// - Return the identity with its current organization memberships
/// - Return `AuthError::InvalidToken` for unknown or expired tokens
/// - Return `AuthError::ServiceUnavailable` for transient errors
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, token: &str) -> Result<Identity, AuthError>;
}
