//! Messaging module - bus messages and connection lifecycle types.
//!
//! - `events` - The four notifications the hub routes and their wire format
//! - `connection` - Per-connection context and lifecycle state machine

mod connection;
mod events;

pub use connection::{ConnectionContext, ConnectionState, DisconnectReason, TrackedConnection};
pub use events::{
    ChangeType, DomainEvent, EntityChanged, PlanChanged, PlanOverage, UserMembershipChanged,
    USER_ENTITY_TYPE,
};
