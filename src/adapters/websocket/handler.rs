//! WebSocket upgrade handler for hub connections.
//!
//! Handles the HTTP → WebSocket upgrade and drives the connection lifecycle:
//! 1. Resolve the bearer token to an identity
//! 2. Upgrade to WebSocket
//! 3. Attach to the transport and run connect (or reconnect)
//! 4. Send/receive messages until disconnect
//! 5. Detach and run disconnect

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, trace, warn};

use crate::application::ConnectionLifecycle;
use crate::domain::foundation::{AuthError, ConnectionId, Identity, Timestamp};
use crate::domain::messaging::{ConnectionContext, DisconnectReason, TrackedConnection};
use crate::ports::IdentityResolver;

use super::{
    messages::{ClientMessage, ConnectedMessage, ErrorMessage, ServerMessage},
    transport::{Attachment, WebSocketTransport},
};

/// State required for WebSocket handling.
#[derive(Clone)]
pub struct WebSocketState {
    pub transport: Arc<WebSocketTransport>,
    pub lifecycle: Arc<ConnectionLifecycle>,
    pub identity: Arc<dyn IdentityResolver>,
}

impl WebSocketState {
    pub fn new(
        transport: Arc<WebSocketTransport>,
        lifecycle: Arc<ConnectionLifecycle>,
        identity: Arc<dyn IdentityResolver>,
    ) -> Self {
        Self {
            transport,
            lifecycle,
            identity,
        }
    }
}

/// Query parameters accepted on the upgrade request.
#[derive(Debug, Default, Deserialize)]
pub struct HubQuery {
    /// Bearer token for clients that cannot set headers (browsers).
    pub access_token: Option<String>,
    /// Id from a previous `connected` message; resumes that connection.
    pub connection_id: Option<String>,
}

/// Handle WebSocket upgrade requests for the hub.
///
/// Route: `GET {hub.path}`
///
/// Responds 401 if the token is missing or rejected, 503 if the identity
/// source is unavailable, 403 if `connection_id` is held by another user
/// and 400 if the request is not a WebSocket upgrade.
pub async fn ws_handler(
    State(state): State<WebSocketState>,
    Query(query): Query<HubQuery>,
    headers: HeaderMap,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    let Some(token) = bearer_token(&headers).or(query.access_token) else {
        return auth_error_response(AuthError::MissingCredentials);
    };

    let identity = match state.identity.resolve(&token).await {
        Ok(identity) => identity,
        Err(err) => return auth_error_response(err),
    };

    let resume = match query.connection_id.as_deref().map(str::parse::<ConnectionId>) {
        None => None,
        Some(Ok(connection_id)) => Some(connection_id),
        Some(Err(err)) => {
            return error_response(StatusCode::BAD_REQUEST, "INVALID_CONNECTION_ID", err.to_string())
        }
    };

    if let Some(connection_id) = &resume {
        if let Some(owner) = state.transport.owner_of(connection_id) {
            if owner != identity.user_id {
                warn!(
                    connection_id = %connection_id,
                    user_id = %identity.user_id,
                    "Rejected resume of a connection held by another user"
                );
                return error_response(
                    StatusCode::FORBIDDEN,
                    "CONNECTION_NOT_OWNED",
                    "Connection belongs to another user",
                );
            }
        }
    }

    let Some(ws) = ws else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "UPGRADE_REQUIRED",
            "Expected a WebSocket upgrade request",
        );
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, identity, resume))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

fn auth_error_response(err: AuthError) -> Response {
    let status = if err.is_transient() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::UNAUTHORIZED
    };
    let code = if err.is_transient() {
        "SERVICE_UNAVAILABLE"
    } else {
        "UNAUTHORIZED"
    };
    error_response(status, code, err.to_string())
}

fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (status, Json(ErrorMessage::new(code, message))).into_response()
}

/// Handle an established WebSocket connection.
///
/// Runs for the lifetime of the socket. If a newer socket resumes the same
/// connection id, this socket's queue closes and it exits without touching
/// the registry.
async fn handle_socket(
    socket: WebSocket,
    state: WebSocketState,
    identity: Identity,
    resume: Option<ConnectionId>,
) {
    let resumed = resume.is_some();
    let connection_id = resume.unwrap_or_default();

    // Ownership can change between the handshake check and the upgrade.
    let Attachment {
        generation,
        mut receiver,
        ..
    } = match state
        .transport
        .attach(connection_id.clone(), identity.user_id.clone())
    {
        Ok(attachment) => attachment,
        Err(err) => {
            warn!(connection_id = %connection_id, error = %err, "Attach refused");
            return;
        }
    };

    let mut connection =
        TrackedConnection::new(ConnectionContext::new(connection_id.clone(), identity));
    let started = if resumed {
        state.lifecycle.on_reconnect(&mut connection).await
    } else {
        state.lifecycle.on_connect(&mut connection).await
    };
    if let Err(err) = started {
        warn!(connection_id = %connection_id, error = %err, "Connection rejected by lifecycle");
        state.transport.detach(&connection_id, generation).await;
        return;
    }

    let (mut sender, mut incoming) = socket.split();

    let connected = ServerMessage::Connected(ConnectedMessage {
        connection_id: connection_id.to_string(),
        user_id: connection.user_id().to_string(),
        resumed,
        timestamp: Timestamp::now().to_rfc3339(),
    });
    let greeted = send_message(&mut sender, &connected).await;

    let reason = match greeted {
        Err(e) => {
            debug!(connection_id = %connection_id, "Failed to send connected message: {}", e);
            DisconnectReason::TransportError
        }
        Ok(()) => {
            // Forward queued pushes to the client
            let mut send_task = {
                let connection_id = connection_id.clone();
                tokio::spawn(async move {
                    while let Some(message) = receiver.recv().await {
                        if let Err(e) = send_message(&mut sender, &message).await {
                            debug!(
                                connection_id = %connection_id,
                                "Send error, closing connection: {}",
                                e
                            );
                            return DisconnectReason::TransportError;
                        }
                    }
                    // Queue closed: detached or superseded
                    let _ = sender.close().await;
                    DisconnectReason::ServerClosed
                })
            };

            // Handle incoming messages from the client
            let mut recv_task = {
                let connection_id = connection_id.clone();
                let transport = Arc::clone(&state.transport);
                tokio::spawn(async move {
                    while let Some(result) = incoming.next().await {
                        match result {
                            Ok(Message::Text(text)) => {
                                let reply = match serde_json::from_str::<ClientMessage>(&text) {
                                    Ok(ClientMessage::Ping) => {
                                        trace!(connection_id = %connection_id, "Received ping");
                                        ServerMessage::pong()
                                    }
                                    Err(e) => ServerMessage::Error(ErrorMessage::new(
                                        "INVALID_MESSAGE",
                                        e.to_string(),
                                    )),
                                };
                                transport.push(&connection_id, reply);
                            }
                            Ok(Message::Binary(_)) => {
                                warn!(
                                    connection_id = %connection_id,
                                    "Received unsupported binary message"
                                );
                            }
                            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                                // Protocol-level frames are handled by axum
                            }
                            Ok(Message::Close(_)) => {
                                debug!(connection_id = %connection_id, "Client sent close frame");
                                return DisconnectReason::ClientClosed;
                            }
                            Err(e) => {
                                debug!(connection_id = %connection_id, "Receive error: {}", e);
                                return DisconnectReason::TransportError;
                            }
                        }
                    }
                    DisconnectReason::ClientClosed
                })
            };

            // Wait for either task to finish
            tokio::select! {
                result = &mut send_task => {
                    recv_task.abort();
                    result.unwrap_or(DisconnectReason::TransportError)
                }
                result = &mut recv_task => {
                    send_task.abort();
                    result.unwrap_or(DisconnectReason::TransportError)
                }
            }
        }
    };

    if state.transport.detach(&connection_id, generation).await {
        if let Err(err) = state.lifecycle.on_disconnect(&mut connection, reason).await {
            warn!(connection_id = %connection_id, error = %err, "Disconnect rejected by lifecycle");
        }
    } else {
        debug!(connection_id = %connection_id, "Socket superseded by a resumed connection");
    }
}

/// Send a JSON message over the WebSocket.
async fn send_message(
    sender: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(msg).map_err(axum::Error::new)?;
    sender.send(Message::Text(json)).await
}

/// Create axum router for the WebSocket endpoint at `path`.
///
/// # Example
///
/// ```ignore
/// let app = Router::new()
///     .merge(websocket_router("/hub").with_state(ws_state));
/// ```
pub fn websocket_router(path: &str) -> axum::Router<WebSocketState> {
    use axum::routing::get;

    axum::Router::new().route(path, get(ws_handler))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::auth::StaticIdentityResolver;
    use crate::adapters::registry::InMemoryConnectionRegistry;
    use crate::domain::foundation::UserId;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn state_with(resolver: StaticIdentityResolver) -> WebSocketState {
        let transport = Arc::new(WebSocketTransport::default());
        let lifecycle = Arc::new(ConnectionLifecycle::new(
            Arc::new(InMemoryConnectionRegistry::new()),
            transport.clone(),
        ));
        WebSocketState::new(transport, lifecycle, Arc::new(resolver))
    }

    fn resolver() -> StaticIdentityResolver {
        StaticIdentityResolver::new().with_identity(
            "good-token",
            Identity::new(UserId::new("u1").unwrap(), vec![]),
        )
    }

    async fn status_for(state: WebSocketState, request: Request<Body>) -> StatusCode {
        websocket_router("/hub")
            .with_state(state)
            .oneshot(request)
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn missing_token_is_unauthorized() {
        let request = Request::get("/hub").body(Body::empty()).unwrap();
        assert_eq!(status_for(state_with(resolver()), request).await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_token_is_unauthorized() {
        let request = Request::get("/hub")
            .header(AUTHORIZATION, "Bearer bad-token")
            .body(Body::empty())
            .unwrap();
        assert_eq!(status_for(state_with(resolver()), request).await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unavailable_identity_source_is_503() {
        let resolver = resolver();
        resolver.set_unavailable("offline");
        let request = Request::get("/hub?access_token=good-token")
            .body(Body::empty())
            .unwrap();
        assert_eq!(
            status_for(state_with(resolver), request).await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn valid_token_without_upgrade_is_bad_request() {
        let request = Request::get("/hub")
            .header(AUTHORIZATION, "Bearer good-token")
            .body(Body::empty())
            .unwrap();
        assert_eq!(status_for(state_with(resolver()), request).await, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn query_token_is_accepted() {
        let request = Request::get("/hub?access_token=good-token")
            .body(Body::empty())
            .unwrap();
        // Authenticated, so it fails only on the missing upgrade.
        assert_eq!(status_for(state_with(resolver()), request).await, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn resuming_another_users_connection_is_forbidden() {
        let resolver = resolver().with_identity(
            "other-token",
            Identity::new(UserId::new("u2").unwrap(), vec![]),
        );
        let state = state_with(resolver);
        let _held = state
            .transport
            .attach(ConnectionId::from("c1"), UserId::new("u1").unwrap())
            .unwrap();

        let request = Request::get("/hub?access_token=other-token&connection_id=c1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(status_for(state.clone(), request).await, StatusCode::FORBIDDEN);
        assert_eq!(
            state.transport.owner_of(&ConnectionId::from("c1")),
            Some(UserId::new("u1").unwrap())
        );
    }

    #[tokio::test]
    async fn resuming_own_connection_passes_ownership_check() {
        let state = state_with(resolver());
        let _held = state
            .transport
            .attach(ConnectionId::from("c1"), UserId::new("u1").unwrap())
            .unwrap();

        let request = Request::get("/hub?access_token=good-token&connection_id=c1")
            .body(Body::empty())
            .unwrap();
        // Owner matches, so it fails only on the missing upgrade.
        assert_eq!(status_for(state, request).await, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn blank_connection_id_is_rejected() {
        let request = Request::get("/hub?access_token=good-token&connection_id=%20")
            .body(Body::empty())
            .unwrap();
        assert_eq!(status_for(state_with(resolver()), request).await, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn bearer_token_requires_scheme_and_value() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc".to_string()));

        headers.insert(AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, "Bearer ".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }
}
