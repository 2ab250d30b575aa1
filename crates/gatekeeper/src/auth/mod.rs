//! Authentication decisions.
//!
//! Everything here is pure: no I/O, no HTTP types beyond the request URI. The
//! server layer feeds decoded sessions in and writes the results out.
//!
//! - [`CredentialTable`]: the single accepted username/password pair.
//! - [`gate`]: decides whether a request may reach the backend.
//! - [`login`]: credential submission and logout transitions.
//! - [`redirect`]: the post-login open-redirect guard.

pub mod gate;
pub mod login;
pub mod redirect;

use std::fmt;

use sha2::{Digest, Sha256};
use subtle::{Choice, ConstantTimeEq};

/// Path of the login form; the target of every gate redirect.
pub const LOGIN_PATH: &str = "/login";

/// Path that clears authentication.
pub const LOGOUT_PATH: &str = "/logout";

/// Fixed mapping from exactly one username to one password.
///
/// Built once at startup; immutable for the process lifetime.
#[derive(Clone)]
pub struct CredentialTable {
    username: String,
    password: String,
}

impl CredentialTable {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Exact match on both fields. An empty username never matches.
    pub fn verify(&self, username: &str, password: &str) -> bool {
        if username.is_empty() {
            return false;
        }
        // Non-short-circuiting so a wrong username costs the same as a wrong password.
        let matches = digest_eq(username, &self.username) & digest_eq(password, &self.password);
        matches.into()
    }
}

impl fmt::Debug for CredentialTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialTable")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Compare fixed-length digests so neither content nor length leaks via timing.
fn digest_eq(candidate: &str, expected: &str) -> Choice {
    Sha256::digest(candidate.as_bytes())
        .as_slice()
        .ct_eq(Sha256::digest(expected.as_bytes()).as_slice())
}
