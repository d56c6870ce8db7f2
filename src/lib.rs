//! Realtime Hub - Real-time event distribution
//!
//! Receives domain change notifications from a process-wide message bus and
//! fans them out to live client connections, scoped to a single user or to
//! every member of an organization.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
