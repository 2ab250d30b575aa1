//! Common types, protocol definitions, and errors shared across `gatekeeper` crates.

pub mod error;
pub mod protocol;

pub use error::GateError;
pub use protocol::{LoginForm, Session};
