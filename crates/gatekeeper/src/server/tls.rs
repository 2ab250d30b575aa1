//! Hardened rustls server configuration.
//!
//! - TLS 1.3 only.
//! - Key exchange groups: X25519, then secp256r1.
//! - Cipher suites, in server preference order: AES-128-GCM-SHA256,
//!   AES-256-GCM-SHA384, CHACHA20-POLY1305-SHA256, and
//!   ECDHE-ECDSA-AES-128-GCM-SHA256 (inert while only TLS 1.3 is enabled).
//! - The server's suite order wins over the client's.

use std::sync::Arc;

use anyhow::{Context, Result};
use rustls::crypto::ring::{cipher_suite, default_provider, kx_group};
use rustls::crypto::CryptoProvider;
use rustls::ServerConfig;

use crate::identity::ServerIdentity;

/// Build the [`ServerConfig`] for a freshly provisioned identity.
///
/// # Errors
///
/// See [`build_server_config`].
pub fn from_identity(identity: &ServerIdentity) -> Result<Arc<ServerConfig>> {
    build_server_config(identity.cert_pem().as_bytes(), identity.key_pem().as_bytes())
}

/// Build a [`rustls::ServerConfig`] from PEM-encoded certificate and private key bytes.
///
/// # Errors
///
/// Returns an error if the certificate or key cannot be parsed, or if rustls
/// rejects the configuration.
pub fn build_server_config(cert_pem: &[u8], key_pem: &[u8]) -> Result<Arc<ServerConfig>> {
    let certs = rustls_pemfile::certs(&mut std::io::BufReader::new(cert_pem))
        .collect::<Result<Vec<_>, _>>()
        .context("failed to parse TLS certificate chain")?;
    if certs.is_empty() {
        anyhow::bail!("no certificate found in PEM data");
    }

    let key = rustls_pemfile::private_key(&mut std::io::BufReader::new(key_pem))
        .context("failed to read TLS private key")?
        .context("no private key found in PEM data")?;

    let mut config = ServerConfig::builder_with_provider(Arc::new(hardened_provider()))
        .with_protocol_versions(&[&rustls::version::TLS13])
        .context("failed to restrict TLS protocol versions")?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("failed to build rustls ServerConfig")?;

    config.ignore_client_order = true;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(Arc::new(config))
}

fn hardened_provider() -> CryptoProvider {
    CryptoProvider {
        cipher_suites: vec![
            cipher_suite::TLS13_AES_128_GCM_SHA256,
            cipher_suite::TLS13_AES_256_GCM_SHA384,
            cipher_suite::TLS13_CHACHA20_POLY1305_SHA256,
            cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
        ],
        kx_groups: vec![kx_group::X25519, kx_group::SECP256R1],
        ..default_provider()
    }
}
