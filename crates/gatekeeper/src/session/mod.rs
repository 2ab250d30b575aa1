//! Sealed, client-held session state carried in the `session` cookie.
//!
//! # Token format
//!
//! ```text
//! v1.<issued-at unix secs>.<base64url(nonce || ciphertext+tag)>.<base64url(hmac)>
//! ```
//!
//! The [`Session`] record is serialised as JSON, encrypted with AES-256-GCM-SIV
//! under the encryption key, then authenticated with HMAC-SHA256 under the
//! authentication key over `session|v1|<issued-at>|<payload>`.
//!
//! # Invariants
//!
//! - [`SessionCodec::open`] is total: a missing, malformed, tampered, expired
//!   or stale-key token yields [`Session::default`], never an error.
//! - No session contents are ever logged.

pub mod keys;

pub use keys::SessionKeys;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use common::Session;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;

use crate::crypto::{cipher, CipherError};

/// Name of the session cookie. Also bound into the MAC and AEAD.
pub const SESSION_COOKIE: &str = "session";

/// Prefix that appears at the start of every sealed session token.
pub const TOKEN_VERSION: &str = "v1";

/// Tokens issued further than this in the future are rejected.
const MAX_CLOCK_SKEW_SECS: u64 = 60;

type HmacSha256 = Hmac<Sha256>;

/// Seals and opens [`Session`] records with the process-lifetime keys.
#[derive(Debug)]
pub struct SessionCodec {
    keys: SessionKeys,
    max_age: Duration,
}

impl SessionCodec {
    pub fn new(keys: SessionKeys, max_age: Duration) -> Self {
        Self { keys, max_age }
    }

    /// Decode a token. Absent or unverifiable input yields the empty session.
    pub fn open(&self, token: Option<&str>) -> Session {
        self.open_at(token, unix_now())
    }

    /// Encode a session into a cookie value.
    ///
    /// # Errors
    ///
    /// Returns a [`CipherError`] only if the random source or AEAD fails.
    pub fn seal(&self, session: &Session) -> Result<String, CipherError> {
        self.seal_at(session, unix_now())
    }

    /// Decode the session carried by the request's cookie jar.
    pub fn from_jar(&self, jar: &CookieJar) -> Session {
        self.open(jar.get(SESSION_COOKIE).map(Cookie::value))
    }

    /// Seal `session` and add it to `jar` with the session cookie attributes.
    ///
    /// # Errors
    ///
    /// See [`SessionCodec::seal`].
    pub fn write(&self, jar: CookieJar, session: &Session) -> Result<CookieJar, CipherError> {
        let token = self.seal(session)?;
        let max_age = i64::try_from(self.max_age.as_secs()).unwrap_or(i64::MAX);
        let cookie = Cookie::build((SESSION_COOKIE, token))
            .path("/")
            .http_only(true)
            .secure(true)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::seconds(max_age));
        Ok(jar.add(cookie))
    }

    fn seal_at(&self, session: &Session, issued_at: u64) -> Result<String, CipherError> {
        let plaintext = serde_json::to_vec(session).map_err(|_| CipherError::AeadFailure)?;
        let sealed = cipher::seal(&plaintext, self.keys.enc(), SESSION_COOKIE.as_bytes())?;

        let issued_at = issued_at.to_string();
        let payload = URL_SAFE_NO_PAD.encode(sealed);
        let tag = self
            .mac(&issued_at, &payload)
            .ok_or(CipherError::InvalidKeyLength)?
            .finalize()
            .into_bytes();

        Ok(format!(
            "{TOKEN_VERSION}.{issued_at}.{payload}.{}",
            URL_SAFE_NO_PAD.encode(tag)
        ))
    }

    fn open_at(&self, token: Option<&str>, now: u64) -> Session {
        let Some(token) = token else {
            return Session::default();
        };
        match self.verify_and_decrypt(token, now) {
            Some(session) => session,
            None => {
                debug!("discarding unverifiable session cookie");
                Session::default()
            }
        }
    }

    fn verify_and_decrypt(&self, token: &str, now: u64) -> Option<Session> {
        let mut parts = token.split('.');
        let (version, issued_at, payload, tag) =
            (parts.next()?, parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() || version != TOKEN_VERSION {
            return None;
        }

        // Authenticate before touching the ciphertext.
        let tag = URL_SAFE_NO_PAD.decode(tag).ok()?;
        self.mac(issued_at, payload)?.verify_slice(&tag).ok()?;

        if !issued_at.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let issued_at: u64 = issued_at.parse().ok()?;
        if issued_at > now.saturating_add(MAX_CLOCK_SKEW_SECS)
            || now.saturating_sub(issued_at) > self.max_age.as_secs()
        {
            return None;
        }

        let sealed = URL_SAFE_NO_PAD.decode(payload).ok()?;
        let plaintext = cipher::open(&sealed, self.keys.enc(), SESSION_COOKIE.as_bytes()).ok()?;
        serde_json::from_slice(&plaintext).ok()
    }

    fn mac(&self, issued_at: &str, payload: &str) -> Option<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.keys.auth()).ok()?;
        for part in [SESSION_COOKIE, TOKEN_VERSION, issued_at, payload] {
            mac.update(part.as_bytes());
            mac.update(b"|");
        }
        Some(mac)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
