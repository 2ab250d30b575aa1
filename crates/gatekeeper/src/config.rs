//! Configuration loading and validation for the gatekeeper service.
//!
//! All values are read from environment variables at startup. The process will
//! exit with a clear error message if any required variable is missing or invalid.

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::http::Uri;
use serde::Deserialize;

/// Validated gatekeeper configuration.
#[derive(Clone, Deserialize)]
pub struct Config {
    /// The single accepted username (`USER`). **Required.**
    pub user: String,

    /// The single accepted password (`PASS`). **Required.**
    pub pass: String,

    /// Port the TLS listener binds on all interfaces.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Absolute `http://` URL of the backend every authenticated request is
    /// forwarded to. May carry a base path.
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    /// Upper bound (seconds) on producing a response head for one request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Lifetime (seconds) of a sealed session cookie.
    #[serde(default = "default_session_max_age")]
    pub session_max_age_secs: u64,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_listen_port() -> u16 {
    3001
}
fn default_backend_url() -> String {
    "http://vscode:3000".into()
}
fn default_request_timeout() -> u64 {
    60
}
fn default_session_max_age() -> u64 {
    86_400 * 30
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any required variable is absent or cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Parsed form of [`Config::backend_url`]. Only valid after [`Config::validate`].
    pub fn backend_uri(&self) -> Result<Uri> {
        parse_backend_url(&self.backend_url)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn session_max_age(&self) -> Duration {
        Duration::from_secs(self.session_max_age_secs)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        ensure_non_empty(&self.user, "USER")?;
        ensure_non_empty(&self.pass, "PASS")?;

        if self.listen_port == 0 {
            anyhow::bail!("LISTEN_PORT must be a non-zero port");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("REQUEST_TIMEOUT_SECS must be > 0");
        }
        if self.session_max_age_secs == 0 {
            anyhow::bail!("SESSION_MAX_AGE_SECS must be > 0");
        }
        parse_backend_url(&self.backend_url)?;
        Ok(())
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("user", &self.user)
            .field("pass", &"[REDACTED]")
            .field("listen_port", &self.listen_port)
            .field("backend_url", &self.backend_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("session_max_age_secs", &self.session_max_age_secs)
            .field("log_level", &self.log_level)
            .finish()
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} is required and must not be empty");
    }
    Ok(())
}

fn parse_backend_url(raw: &str) -> Result<Uri> {
    let uri: Uri = raw
        .trim()
        .parse()
        .with_context(|| format!("BACKEND_URL is not a valid URL: {raw:?}"))?;
    if uri.scheme_str() != Some("http") {
        anyhow::bail!("BACKEND_URL must use the http scheme");
    }
    if uri.host().map_or(true, str::is_empty) {
        anyhow::bail!("BACKEND_URL must include a host");
    }
    Ok(uri)
}
