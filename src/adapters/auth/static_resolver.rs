//! Static identity resolver.
//!
//! Maps opaque bearer tokens to identities held in memory, optionally
//! loaded from a JSON file of the form:
//!
//! ```json
//! {
//!   "token-abc": { "user_id": "u1", "organization_ids": ["o1", "o2"] },
//!   "token-def": { "user_id": "u2" }
//! }
//! ```
//!
//! # Example
//!
//! ```ignore
//! let resolver = StaticIdentityResolver::new()
//!     .with_identity("token-abc", Identity::new(user_id, vec![org_id]));
//!
//! let identity = resolver.resolve("token-abc").await?;
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tracing::info;

use crate::domain::foundation::{AuthError, Identity};
use crate::ports::IdentityResolver;

/// Errors loading an identities file.
#[derive(Debug, Error)]
pub enum IdentityFileError {
    #[error("Failed to read identities file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse identities file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid identity for token entry {index}: {reason}")]
    Invalid { index: usize, reason: String },
}

/// Token → identity lookup held in memory.
#[derive(Debug, Default)]
pub struct StaticIdentityResolver {
    identities: DashMap<String, Identity>,
    unavailable: RwLock<Option<String>>,
}

impl StaticIdentityResolver {
    /// Creates a resolver that accepts no tokens.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a token that resolves to `identity`.
    pub fn with_identity(self, token: impl Into<String>, identity: Identity) -> Self {
        self.add_identity(token, identity);
        self
    }

    /// Adds or replaces a token at runtime.
    pub fn add_identity(&self, token: impl Into<String>, identity: Identity) {
        self.identities.insert(token.into(), identity);
    }

    /// Revokes a token. Returns true if it was known.
    pub fn remove_token(&self, token: &str) -> bool {
        self.identities.remove(token).is_some()
    }

    /// Makes every resolution fail with `ServiceUnavailable`.
    pub fn set_unavailable(&self, reason: impl Into<String>) {
        *self
            .unavailable
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(reason.into());
    }

    /// Restores normal resolution after `set_unavailable`.
    pub fn set_available(&self) {
        *self
            .unavailable
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }

    /// Number of known tokens.
    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// Loads tokens from a JSON identities file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, IdentityFileError> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        let raw = std::fs::read_to_string(path).map_err(|source| IdentityFileError::Io {
            path: path_str.clone(),
            source,
        })?;
        let entries: HashMap<String, Identity> =
            serde_json::from_str(&raw).map_err(|source| IdentityFileError::Parse {
                path: path_str.clone(),
                source,
            })?;

        let resolver = Self::new();
        for (index, (token, identity)) in entries.into_iter().enumerate() {
            if token.trim().is_empty() {
                return Err(IdentityFileError::Invalid {
                    index,
                    reason: "token is empty".to_string(),
                });
            }
            resolver.add_identity(token, identity);
        }

        info!(path = %path_str, tokens = resolver.len(), "Loaded identities file");
        Ok(resolver)
    }
}

#[async_trait]
impl IdentityResolver for StaticIdentityResolver {
    async fn resolve(&self, token: &str) -> Result<Identity, AuthError> {
        let unavailable = self
            .unavailable
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        if let Some(reason) = unavailable {
            return Err(AuthError::service_unavailable(reason));
        }
        if token.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        self.identities
            .get(token)
            .map(|identity| identity.value().clone())
            .ok_or(AuthError::InvalidToken)
    }
}
