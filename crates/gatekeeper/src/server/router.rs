//! Axum router construction.

use std::time::Duration;

use axum::{
    routing::{any, get},
    Router,
};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use super::{handlers, state::AppState};
use crate::auth::{LOGIN_PATH, LOGOUT_PATH};

/// Build the application [`Router`] with all routes and middleware attached.
///
/// `request_timeout` bounds how long a request may take to produce a
/// response head; expiry answers `408 Request Timeout`.
pub fn build(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route(
            LOGIN_PATH,
            get(handlers::login_form)
                .post(handlers::login_submit)
                .fallback(handlers::login_method_not_allowed),
        )
        .route(LOGOUT_PATH, any(handlers::logout))
        .fallback(handlers::gated_proxy)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}
