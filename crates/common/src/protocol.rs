//! Records exchanged between the client and the gate.
//!
//! [`Session`] is the plaintext shape sealed into the `session` cookie;
//! [`LoginForm`] is the form-encoded body of `POST /login`.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Client-held authentication state.
///
/// Only meaningful after the sealed cookie carrying it has been verified and
/// decrypted. The `Default` value is the empty, unauthenticated session that
/// every decoding failure collapses to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Whether this session has completed login.
    #[serde(default)]
    pub authenticated: bool,

    /// Request URI the client attempted before being sent to the login form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_url: Option<String>,
}

impl Session {
    /// A session that has completed login.
    pub fn authenticated() -> Self {
        Self {
            authenticated: true,
            original_url: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Login form
// ---------------------------------------------------------------------------

/// Body of `POST /login`.
///
/// Missing fields decode as empty strings, which never match a credential.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoginForm {
    /// Submitted username.
    #[serde(default)]
    pub username: String,
    /// Submitted password.
    #[serde(default)]
    pub password: String,
}
