//! Foundation module - Shared domain primitives.
//!
//! Contains identifiers, timestamps, the bus envelope, identity and error
//! types that form the vocabulary of the hub.

mod auth;
mod errors;
mod events;
mod ids;
mod state_machine;
mod timestamp;

pub use auth::{AuthError, Identity};
pub use errors::{DomainError, ErrorCode, ValidationError};
pub use events::{BusEvent, EventEnvelope, EventId, EventMetadata};
pub use ids::{ConnectionId, OrganizationId, UserId};
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
