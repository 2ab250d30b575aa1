//! Axum request handlers for all service endpoints.

use std::net::SocketAddr;

use axum::{
    extract::{rejection::FormRejection, ConnectInfo, Request, State},
    http::{header, Method, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use axum_extra::extract::cookie::CookieJar;
use common::{GateError, LoginForm, Session};
use tracing::{debug, error, info};

use super::state::AppState;
use crate::auth::gate::{self, GateDecision};
use crate::auth::{login, LOGIN_PATH};

/// The static login page.
pub const LOGIN_PAGE: &str = include_str!("../../assets/login.html");

/// `GET /login`: render the login form. Does not read the session.
pub async fn login_form() -> Response {
    ([(header::CACHE_CONTROL, "no-store")], Html(LOGIN_PAGE)).into_response()
}

/// `POST /login`: validate submitted credentials.
///
/// Success redirects to the remembered `original_url` (if it is a safe
/// relative reference) or `/`. Failure of any kind, including an unreadable
/// form body, silently redirects back to the form.
pub async fn login_submit(
    State(state): State<AppState>,
    jar: CookieJar,
    form: Result<Form<LoginForm>, FormRejection>,
) -> Response {
    let form = match form {
        Ok(Form(form)) => form,
        Err(rejection) => {
            debug!(%rejection, "unreadable login form");
            LoginForm::default()
        }
    };

    let outcome = login::submit(&state.credentials, &form, state.codec.from_jar(&jar));
    if outcome.accepted {
        info!("login succeeded");
    } else {
        info!("login rejected");
    }
    redirect_with_session(&state, jar, &outcome.session, &outcome.redirect_to)
}

/// Any method other than GET/POST on `/login`.
pub async fn login_method_not_allowed(method: Method) -> Response {
    let mut resp = error_response(&GateError::MethodNotAllowed(method.to_string()));
    resp.headers_mut()
        .insert(header::ALLOW, header::HeaderValue::from_static("GET, POST"));
    resp
}

/// `/logout` (any method): clear authentication and return to the form.
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> Response {
    let session = login::logout(state.codec.from_jar(&jar));
    info!("logout");
    redirect_with_session(&state, jar, &session, LOGIN_PATH)
}

/// Catch-all: the gate in front of the backend.
///
/// Unauthenticated requests remember their URI in the session and are
/// redirected to the login form; nothing is forwarded. Authenticated
/// requests are relayed unchanged.
pub async fn gated_proxy(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    jar: CookieJar,
    req: Request,
) -> Response {
    let session = state.codec.from_jar(&jar);
    match gate::decide(session, &gate::request_uri(req.uri())) {
        GateDecision::Allow => {
            let client = connect_info.map(|ConnectInfo(addr)| addr);
            match state.pipeline.forward(client, req).await {
                Ok(resp) => resp,
                Err(e) => error_response(&e),
            }
        }
        GateDecision::Redirect(session) => {
            debug!(uri = %req.uri(), "unauthenticated request redirected to login");
            redirect_with_session(&state, jar, &session, LOGIN_PATH)
        }
    }
}

/// Reseal `session` into the cookie jar and answer `303 See Other` to `target`.
fn redirect_with_session(
    state: &AppState,
    jar: CookieJar,
    session: &Session,
    target: &str,
) -> Response {
    match state.codec.write(jar, session) {
        Ok(jar) => (jar, Redirect::to(target)).into_response(),
        Err(e) => {
            error!(error = %e, "failed to seal session");
            error_response(&GateError::Internal(e.to_string()))
        }
    }
}

/// Convert a [`GateError`] into a detail-free response.
pub fn error_response(err: &GateError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, err.public_message()).into_response()
}
