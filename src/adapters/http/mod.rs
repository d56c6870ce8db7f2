//! HTTP adapters - REST endpoints next to the WebSocket hub.

pub mod hub;

pub use hub::{hub_http_routes, HubHttpState};
