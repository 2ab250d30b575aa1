//! Axum HTTPS server, routing, and the TLS accept loop.
//!
//! # Responsibilities
//! - Build the hardened rustls configuration from the generated identity.
//! - Define the Axum router: `/login`, `/logout`, and the gated catch-all.
//! - Inject shared application state (`AppState`) into handlers.
//! - Accept TLS connections and serve HTTP/1.1 and HTTP/2 on them.

pub mod handlers;
pub mod listener;
pub mod router;
pub mod state;
pub mod tls;
