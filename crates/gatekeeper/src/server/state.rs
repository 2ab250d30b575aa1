//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use crate::auth::CredentialTable;
use crate::proxy::ProxyPipeline;
use crate::session::SessionCodec;

/// Application state shared across all request handlers.
///
/// Everything here is read-only after startup. All fields are cheaply
/// cloneable so that Axum can clone the state for each request.
#[derive(Clone)]
pub struct AppState {
    /// Seals and opens the session cookie with the process-lifetime keys.
    pub codec: Arc<SessionCodec>,
    /// The single accepted username/password pair.
    pub credentials: Arc<CredentialTable>,
    /// Relay to the backend.
    pub pipeline: ProxyPipeline,
}

impl AppState {
    pub fn new(
        codec: SessionCodec,
        credentials: CredentialTable,
        pipeline: ProxyPipeline,
    ) -> Self {
        Self {
            codec: Arc::new(codec),
            credentials: Arc::new(credentials),
            pipeline,
        }
    }
}
