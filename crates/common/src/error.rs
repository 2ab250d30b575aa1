//! Common error types shared across crates.

use thiserror::Error;

/// Request-level error type.
///
/// Variants map to HTTP status codes returned to clients:
/// - [`GateError::MethodNotAllowed`] → 405
/// - [`GateError::BadGateway`] → 502
/// - [`GateError::Internal`] → 500
///
/// The `Display` output may carry detail for logs. Clients only ever see
/// [`GateError::public_message`].
#[derive(Debug, Error)]
pub enum GateError {
    /// The route exists but does not accept this HTTP method.
    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    /// The backend could not be reached or failed mid-response.
    #[error("bad gateway: {0}")]
    BadGateway(String),

    /// An unexpected internal error occurred (e.g. sealing a session failed).
    #[error("internal error: {0}")]
    Internal(String),
}

impl GateError {
    /// Returns the HTTP status code that should be sent for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            GateError::MethodNotAllowed(_) => 405,
            GateError::BadGateway(_) => 502,
            GateError::Internal(_) => 500,
        }
    }

    /// Generic, detail-free body text safe to expose to clients.
    pub fn public_message(&self) -> &'static str {
        match self {
            GateError::MethodNotAllowed(_) => "Method Not Allowed",
            GateError::BadGateway(_) => "Bad Gateway",
            GateError::Internal(_) => "Internal Server Error",
        }
    }
}
