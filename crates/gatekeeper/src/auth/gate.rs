//! The gate in front of the backend.
//!
//! A request is either `Authenticated` (its session says so) and allowed
//! through unchanged, or `Unauthenticated` and bounced to the login form with
//! its URI remembered in the session. The decision is a function of the
//! decoded session alone.

use axum::http::Uri;
use common::Session;

/// Outcome of [`decide`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Forward the request to the backend.
    Allow,
    /// Do not forward; reseal this session and redirect to the login form.
    Redirect(Session),
}

/// Decide whether a request carrying `session` for `request_uri` may pass.
pub fn decide(session: Session, request_uri: &str) -> GateDecision {
    if session.authenticated {
        return GateDecision::Allow;
    }
    GateDecision::Redirect(Session {
        original_url: Some(request_uri.to_owned()),
        ..session
    })
}

/// Path and query of `uri`, as remembered for the post-login redirect.
pub fn request_uri(uri: &Uri) -> String {
    uri.path_and_query()
        .map(|pq| pq.as_str().to_owned())
        .unwrap_or_else(|| "/".to_owned())
}
