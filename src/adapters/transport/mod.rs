//! Transport adapters that are not tied to a wire protocol.
//!
//! - `RecordingTransport` - In-memory transport that records every call

mod recording;

pub use recording::{RecordingTransport, TransportCall};
