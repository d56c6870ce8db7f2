//! HTTP routes for the hub's internal endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{health, publish_event, HubHttpState};

/// Creates the router with the health and publish endpoints.
pub fn hub_http_routes(publish_path: &str, state: HubHttpState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(publish_path, post(publish_event))
        .with_state(state)
}
