//! Authentication adapters.
//!
//! Implementations of the `IdentityResolver` port:
//!
//! - `static_resolver` - Token table held in memory, loadable from JSON

mod static_resolver;

pub use static_resolver::{IdentityFileError, StaticIdentityResolver};
