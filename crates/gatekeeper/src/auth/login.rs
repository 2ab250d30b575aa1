//! Login and logout state transitions.

use common::{LoginForm, Session};

use super::redirect::redirect_target;
use super::{CredentialTable, LOGIN_PATH};

/// Result of a credential submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    /// Session to seal into the response cookie.
    pub session: Session,
    /// Where to redirect the client.
    pub redirect_to: String,
    /// Whether the credentials matched.
    pub accepted: bool,
}

/// Validate `form` against `table` and compute the next session.
///
/// On success the session becomes authenticated, `original_url` is consumed,
/// and the redirect goes to it if it passes the open-redirect guard. On
/// failure the session is unauthenticated (an already-authenticated session
/// is demoted) and the client goes back to the form.
pub fn submit(table: &CredentialTable, form: &LoginForm, current: Session) -> LoginOutcome {
    if !table.verify(&form.username, &form.password) {
        return LoginOutcome {
            session: Session {
                authenticated: false,
                ..current
            },
            redirect_to: LOGIN_PATH.to_owned(),
            accepted: false,
        };
    }

    let redirect_to = redirect_target(current.original_url.as_deref()).to_owned();
    LoginOutcome {
        session: Session {
            authenticated: true,
            original_url: None,
        },
        redirect_to,
        accepted: true,
    }
}

/// Clear authentication. Other fields are kept.
pub fn logout(current: Session) -> Session {
    Session {
        authenticated: false,
        ..current
    }
}
