//! Request/response types for the hub HTTP endpoints.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Body of `POST {hub.publish_path}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishEventRequest {
    /// Bus event type, e.g. `plan.changed.v1`.
    pub event_type: String,

    /// Id of the aggregate that emitted the event.
    #[serde(default)]
    pub aggregate_id: Option<String>,

    /// Type of that aggregate.
    #[serde(default)]
    pub aggregate_type: Option<String>,

    /// Event payload, camelCase as clients receive it.
    pub payload: JsonValue,

    #[serde(default)]
    pub correlation_id: Option<String>,
}

/// Response for an accepted publish.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishEventResponse {
    pub event_id: String,
    pub event_type: String,
}

/// Response for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub users: usize,
    pub connections: usize,
}

/// Error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<JsonValue>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("BAD_REQUEST", message)
    }

    pub fn unauthorized() -> Self {
        Self::new("UNAUTHORIZED", "Missing or invalid publish token")
    }

    pub fn with_details(mut self, details: JsonValue) -> Self {
        self.details = Some(details);
        self
    }
}
