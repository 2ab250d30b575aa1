//! `gatekeeper`: single-user TLS login gate in front of one HTTP backend.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Initialise structured logging.
//! 3. Provision a fresh self-signed TLS identity and build the rustls config.
//! 4. Generate the session keys and build the credential table.
//! 5. Build the backend relay.
//! 6. Build the Axum router, bind the listener and serve until Ctrl-C.
//!
//! Any failure before step 6 starts serving is fatal.

mod auth;
mod config;
mod crypto;
mod identity;
mod proxy;
mod server;
mod session;
mod telemetry;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};

use auth::CredentialTable;
use config::Config;
use identity::CertificateProvisioner;
use proxy::ProxyPipeline;
use server::state::AppState;
use session::{SessionCodec, SessionKeys};

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e:#}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init_telemetry(&cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen_port = cfg.listen_port,
        backend = %cfg.backend_url,
        "gatekeeper starting"
    );

    // -----------------------------------------------------------------------
    // 3. TLS identity
    // -----------------------------------------------------------------------
    let identity = CertificateProvisioner::default()
        .provision()
        .context("failed to provision TLS identity")?;
    info!(
        serial = %identity.serial_hex(),
        serial_len = identity.serial().len(),
        sha256 = %identity.fingerprint(),
        not_before = %identity.not_before(),
        not_after = %identity.not_after(),
        "self-signed server certificate provisioned"
    );
    let tls = server::tls::from_identity(&identity)?;

    // -----------------------------------------------------------------------
    // 4. Session keys and credentials
    // -----------------------------------------------------------------------
    let keys = SessionKeys::generate().context("failed to generate session keys")?;
    let codec = SessionCodec::new(keys, cfg.session_max_age());
    let credentials = CredentialTable::new(cfg.user.clone(), cfg.pass.clone());

    // -----------------------------------------------------------------------
    // 5. Backend relay
    // -----------------------------------------------------------------------
    let pipeline = ProxyPipeline::new(&cfg.backend_uri()?)?;

    // -----------------------------------------------------------------------
    // 6. HTTPS server
    // -----------------------------------------------------------------------
    let state = AppState::new(codec, credentials, pipeline);
    let router = server::router::build(state, cfg.request_timeout());

    let addr: SocketAddr = ([0, 0, 0, 0], cfg.listen_port).into();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %addr, "listening");

    server::listener::serve(listener, tls, router, shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl-C; serving until killed");
        std::future::pending::<()>().await;
    }
}
