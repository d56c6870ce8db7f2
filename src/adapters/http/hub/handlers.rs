//! HTTP handlers for the hub's internal endpoints.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::domain::foundation::{DomainError, ErrorCode, EventEnvelope};
use crate::domain::messaging::DomainEvent;
use crate::ports::{ConnectionRegistry, EventPublisher};

use super::dto::{ErrorResponse, HealthResponse, PublishEventRequest, PublishEventResponse};

// ════════════════════════════════════════════════════════════════════════════
// Handler state
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct HubHttpState {
    publisher: Arc<dyn EventPublisher>,
    registry: Arc<dyn ConnectionRegistry>,
    publish_token: Option<Arc<SecretString>>,
}

impl HubHttpState {
    pub fn new(publisher: Arc<dyn EventPublisher>, registry: Arc<dyn ConnectionRegistry>) -> Self {
        Self {
            publisher,
            registry,
            publish_token: None,
        }
    }

    /// Requires `Authorization: Bearer <token>` on the publish endpoint.
    pub fn with_publish_token(mut self, token: SecretString) -> Self {
        self.publish_token = Some(Arc::new(token));
        self
    }

    fn is_authorized(&self, headers: &HeaderMap) -> bool {
        let Some(expected) = &self.publish_token else {
            return true;
        };
        let provided = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .unwrap_or("");
        expected
            .expose_secret()
            .as_bytes()
            .ct_eq(provided.as_bytes())
            .into()
    }
}

// ════════════════════════════════════════════════════════════════════════════
// HTTP handlers
// ════════════════════════════════════════════════════════════════════════════

/// GET /health - Liveness plus registry counts
pub async fn health(State(state): State<HubHttpState>) -> Response {
    let response = HealthResponse {
        status: "ok".to_string(),
        users: state.registry.user_count(),
        connections: state.registry.connection_count(),
    };
    (StatusCode::OK, Json(response)).into_response()
}

/// POST {hub.publish_path} - Put an event on the bus
///
/// Payloads for event types the hub routes are checked against their
/// schema before publishing; other event types pass through untouched.
pub async fn publish_event(
    State(state): State<HubHttpState>,
    headers: HeaderMap,
    Json(req): Json<PublishEventRequest>,
) -> Response {
    if !state.is_authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(ErrorResponse::unauthorized())).into_response();
    }

    if req.event_type.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::bad_request("eventType must not be empty")),
        )
            .into_response();
    }

    let mut envelope = EventEnvelope::new(
        req.event_type,
        req.aggregate_id.unwrap_or_default(),
        req.aggregate_type.unwrap_or_else(|| "External".to_string()),
        req.payload,
    );
    if let Some(correlation_id) = req.correlation_id {
        envelope = envelope.with_correlation_id(correlation_id);
    }

    if let Err(e) = DomainEvent::from_envelope(&envelope) {
        return (
            StatusCode::BAD_REQUEST,
            Json(
                ErrorResponse::bad_request(format!(
                    "Payload does not match {}",
                    envelope.event_type
                ))
                .with_details(serde_json::json!({ "error": e.to_string() })),
            ),
        )
            .into_response();
    }

    let response = PublishEventResponse {
        event_id: envelope.event_id.to_string(),
        event_type: envelope.event_type.clone(),
    };

    match state.publisher.publish(envelope).await {
        Ok(()) => {
            debug!(event_id = %response.event_id, event_type = %response.event_type, "Event published");
            (StatusCode::ACCEPTED, Json(response)).into_response()
        }
        Err(e) => handle_publish_error(e),
    }
}

fn handle_publish_error(error: DomainError) -> Response {
    warn!(error = %error, "Publish failed");
    let status = match error.code {
        ErrorCode::TransportFailed => StatusCode::BAD_GATEWAY,
        ErrorCode::ValidationFailed | ErrorCode::InvalidStateTransition => StatusCode::BAD_REQUEST,
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorResponse::new(error.code.to_string(), error.message))).into_response()
}
