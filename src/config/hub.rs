//! Hub configuration

use serde::Deserialize;

use super::error::ValidationError;
use super::server::Environment;

/// Largest accepted per-connection outbound queue.
const MAX_OUTBOUND_BUFFER: usize = 65_536;

/// Hub endpoint and transport configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    /// Path of the WebSocket endpoint
    #[serde(default = "default_path")]
    pub path: String,

    /// Messages queued per connection before pushes are dropped
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,

    /// Path of the internal publish endpoint
    #[serde(default = "default_publish_path")]
    pub publish_path: String,

    /// Bearer token required by the publish endpoint
    pub publish_token: Option<String>,
}

impl HubConfig {
    /// Validate hub configuration
    ///
    /// In production, the publish endpoint must be protected by a token.
    pub fn validate(&self, environment: &Environment) -> Result<(), ValidationError> {
        if !is_valid_path(&self.path) || !is_valid_path(&self.publish_path) {
            return Err(ValidationError::InvalidHubPath);
        }
        if self.path == self.publish_path {
            return Err(ValidationError::ConflictingPaths);
        }
        if self.outbound_buffer == 0 || self.outbound_buffer > MAX_OUTBOUND_BUFFER {
            return Err(ValidationError::InvalidOutboundBuffer);
        }
        let has_token = self
            .publish_token
            .as_deref()
            .is_some_and(|token| !token.trim().is_empty());
        if *environment == Environment::Production && !has_token {
            return Err(ValidationError::MissingRequired("HUB__PUBLISH_TOKEN"));
        }
        Ok(())
    }
}

fn is_valid_path(path: &str) -> bool {
    path.starts_with('/') && !path.chars().any(char::is_whitespace)
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            outbound_buffer: default_outbound_buffer(),
            publish_path: default_publish_path(),
            publish_token: None,
        }
    }
}

fn default_path() -> String {
    "/hub".to_string()
}

fn default_outbound_buffer() -> usize {
    128
}

fn default_publish_path() -> String {
    "/internal/events".to_string()
}
