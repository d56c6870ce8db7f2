//! Domain layer containing hub vocabulary and message types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared primitives (IDs, timestamps, envelope, identity, errors)
//! - `messaging` - Routed bus messages and connection lifecycle state

pub mod foundation;
pub mod messaging;
