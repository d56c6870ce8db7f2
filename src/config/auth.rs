//! Authentication configuration

use serde::Deserialize;

use super::error::ValidationError;
use super::server::Environment;

/// Identity resolution configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// JSON file mapping bearer tokens to identities
    pub identities_file: Option<String>,
}

impl AuthConfig {
    /// Validate authentication configuration
    ///
    /// In production an identities file is required; in development an
    /// absent file means no client can authenticate until tokens are added.
    pub fn validate(&self, environment: &Environment) -> Result<(), ValidationError> {
        let configured = self
            .identities_file
            .as_deref()
            .is_some_and(|path| !path.trim().is_empty());

        if *environment == Environment::Production && !configured {
            return Err(ValidationError::MissingRequired("AUTH__IDENTITIES_FILE"));
        }
        Ok(())
    }
}
