//! HTTP adapter for the hub's internal endpoints.
//!
//! - `GET /health` - Liveness and registry counts
//! - `POST {hub.publish_path}` - Publish an event onto the bus

pub mod dto;
pub mod handlers;
pub mod routes;

pub use dto::*;
pub use handlers::HubHttpState;
pub use routes::hub_http_routes;
