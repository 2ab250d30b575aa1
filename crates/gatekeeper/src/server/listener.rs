//! TLS accept loop.
//!
//! For each accepted TCP connection the listener:
//! 1. Spawns a task so connections never wait on each other.
//! 2. Completes the TLS handshake within [`TLS_HANDSHAKE_TIMEOUT`].
//! 3. Serves HTTP/1.1 or HTTP/2 on the decrypted stream, with upgrade
//!    support, tagging each request with the peer address.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{extract::ConnectInfo, Router};
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto;
use rustls::ServerConfig;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tower::ServiceExt;
use tracing::{debug, error, info};

/// Limit on completing the TLS handshake after accept.
pub const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Limit on receiving a complete HTTP/1 request head.
pub const HEADER_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Pause after a failed accept so a persistent error (e.g. out of file
/// descriptors) does not spin the loop.
pub const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Accept TLS connections on `listener` and serve `router` on each one.
///
/// Runs until `shutdown` resolves. Connections already accepted keep running
/// in their own tasks.
///
/// # Errors
///
/// Currently never returns an error; accept failures are logged and skipped.
pub async fn serve(
    listener: TcpListener,
    tls: Arc<ServerConfig>,
    router: Router,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let acceptor = TlsAcceptor::from(tls);
    let mut builder = auto::Builder::new(TokioExecutor::new());
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(HEADER_READ_TIMEOUT);

    tokio::pin!(shutdown);
    loop {
        let (tcp, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    accept_backoff(&e).await;
                    continue;
                }
            },
            () = &mut shutdown => {
                info!("shutdown requested; no longer accepting connections");
                return Ok(());
            }
        };

        let acceptor = acceptor.clone();
        let builder = builder.clone();
        let router = router.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(tcp, peer, acceptor, builder, router).await {
                debug!(%peer, error = %e, "connection closed with error");
            }
        });
    }
}

async fn accept_backoff(err: &std::io::Error) {
    error!(error = %err, "accept error");
    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
}

/// Handshake and serve a single connection.
async fn handle_connection(
    tcp: TcpStream,
    peer: SocketAddr,
    acceptor: TlsAcceptor,
    builder: auto::Builder<TokioExecutor>,
    router: Router,
) -> Result<()> {
    let tls = tokio::time::timeout(TLS_HANDSHAKE_TIMEOUT, acceptor.accept(tcp))
        .await
        .context("TLS handshake timed out")?
        .context("TLS handshake failed")?;

    let service = hyper::service::service_fn(move |mut req: hyper::Request<Incoming>| {
        req.extensions_mut().insert(ConnectInfo(peer));
        router.clone().oneshot(req)
    });

    builder
        .serve_connection_with_upgrades(TokioIo::new(tls), service)
        .await
        .map_err(|e| anyhow::anyhow!("http connection error: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    use axum::{http::StatusCode, routing::get};
    use common::Session;
    use rustls::pki_types::ServerName;
    use rustls::{ClientConfig, ProtocolVersion, RootCertStore};
    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
    use tokio::sync::oneshot;
    use tokio_rustls::TlsConnector;

    use crate::auth::CredentialTable;
    use crate::crypto::KEY_LEN;
    use crate::identity::{CertificateProvisioner, ServerIdentity};
    use crate::proxy::ProxyPipeline;
    use crate::server::{router, state::AppState, tls};
    use crate::session::{SessionCodec, SessionKeys, SESSION_COOKIE};

    fn app() -> Router {
        Router::new()
            .route("/login", get(|| async { "login form" }))
            .fallback(|ConnectInfo(peer): ConnectInfo<SocketAddr>| async move {
                (StatusCode::IM_A_TEAPOT, peer.ip().to_string())
            })
    }

    async fn start(identity: &ServerIdentity) -> (SocketAddr, oneshot::Sender<()>) {
        start_with(identity, app()).await
    }

    async fn start_with(
        identity: &ServerIdentity,
        router: Router,
    ) -> (SocketAddr, oneshot::Sender<()>) {
        let config = tls::from_identity(identity).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        tokio::spawn(serve(listener, config, router, async {
            let _ = stopped.await;
        }));
        (addr, stop)
    }

    /// Read up to and including the blank line that ends an HTTP head.
    async fn read_head<S: AsyncRead + Unpin>(stream: &mut S) -> String {
        let mut head = Vec::new();
        let mut byte = [0u8; 1];
        while !head.ends_with(b"\r\n\r\n") {
            if stream.read(&mut byte).await.unwrap() == 0 {
                break;
            }
            head.push(byte[0]);
        }
        String::from_utf8_lossy(&head).into_owned()
    }

    /// Backend that answers one upgrade request with `101` and then echoes
    /// raw bytes. The request head it saw is sent back on the channel.
    async fn spawn_upgrade_echo_backend() -> (SocketAddr, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (seen_tx, seen_rx) = oneshot::channel();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let head = read_head(&mut sock).await;
            let _ = seen_tx.send(head);
            sock.write_all(
                b"HTTP/1.1 101 Switching Protocols\r\nConnection: upgrade\r\nUpgrade: echo\r\n\r\n",
            )
            .await
            .unwrap();
            let mut buf = [0u8; 1024];
            loop {
                match sock.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if sock.write_all(&buf[..n]).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });
        (addr, seen_rx)
    }

    fn client_config(
        identity: &ServerIdentity,
        versions: &[&'static rustls::SupportedProtocolVersion],
    ) -> ClientConfig {
        let mut roots = RootCertStore::empty();
        roots.add(identity.certificate().clone()).unwrap();
        ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_protocol_versions(versions)
            .unwrap()
            .with_root_certificates(roots)
            .with_no_client_auth()
    }

    /// Send one HTTP/1.1 request over TLS and return the raw response text.
    async fn exchange(
        connector: &TlsConnector,
        addr: SocketAddr,
        path: &str,
    ) -> (Option<ProtocolVersion>, String) {
        let tcp = TcpStream::connect(addr).await.unwrap();
        let name = ServerName::from(IpAddr::V4(Ipv4Addr::LOCALHOST));
        let mut stream = connector.connect(name, tcp).await.unwrap();
        let version = stream.get_ref().1.protocol_version();

        let request =
            format!("GET {path} HTTP/1.1\r\nHost: 127.0.0.1\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            match stream.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
            }
        }
        (version, String::from_utf8_lossy(&buf).into_owned())
    }

    #[tokio::test]
    async fn serves_http_over_tls13_with_generated_identity() {
        let identity = CertificateProvisioner::default().provision().unwrap();
        let (addr, _stop) = start(&identity).await;
        let connector = TlsConnector::from(Arc::new(client_config(
            &identity,
            rustls::DEFAULT_VERSIONS,
        )));

        let (version, text) = exchange(&connector, addr, "/login").await;
        assert_eq!(version, Some(ProtocolVersion::TLSv1_3));
        assert!(text.starts_with("HTTP/1.1 200"), "{text}");
        assert!(text.ends_with("login form"), "{text}");
    }

    #[tokio::test]
    async fn requests_carry_peer_address() {
        let identity = CertificateProvisioner::default().provision().unwrap();
        let (addr, _stop) = start(&identity).await;
        let connector = TlsConnector::from(Arc::new(client_config(
            &identity,
            rustls::DEFAULT_VERSIONS,
        )));

        let (_, text) = exchange(&connector, addr, "/anything").await;
        assert!(text.starts_with("HTTP/1.1 418"), "{text}");
        assert!(text.ends_with("127.0.0.1"), "{text}");
    }

    #[tokio::test]
    async fn authenticated_upgrade_is_spliced_to_backend() {
        let (backend, seen) = spawn_upgrade_echo_backend().await;
        let codec = SessionCodec::new(
            SessionKeys::from_bytes([0x01; KEY_LEN], [0x02; KEY_LEN]),
            Duration::from_secs(3600),
        );
        let backend_uri: axum::http::Uri = format!("http://{backend}").parse().unwrap();
        let state = AppState::new(
            codec,
            CredentialTable::new("operator", "hunter2"),
            ProxyPipeline::new(&backend_uri).unwrap(),
        );
        let token = state.codec.seal(&Session::authenticated()).unwrap();
        let app = router::build(state, Duration::from_secs(5));

        let identity = CertificateProvisioner::default().provision().unwrap();
        let (addr, _stop) = start_with(&identity, app).await;
        let connector = TlsConnector::from(Arc::new(client_config(
            &identity,
            rustls::DEFAULT_VERSIONS,
        )));
        let tcp = TcpStream::connect(addr).await.unwrap();
        let name = ServerName::from(IpAddr::V4(Ipv4Addr::LOCALHOST));
        let mut stream = connector.connect(name, tcp).await.unwrap();

        let request = format!(
            "GET /ws HTTP/1.1\r\nHost: 127.0.0.1\r\nCookie: {SESSION_COOKIE}={token}\r\n\
             Connection: Upgrade\r\nUpgrade: echo\r\n\r\n"
        );
        stream.write_all(request.as_bytes()).await.unwrap();
        let head = read_head(&mut stream).await;
        assert!(head.starts_with("HTTP/1.1 101"), "{head}");

        let backend_head = seen.await.unwrap().to_ascii_lowercase();
        assert!(backend_head.starts_with("get /ws http/1.1"), "{backend_head}");
        assert!(backend_head.contains("connection: upgrade"), "{backend_head}");
        assert!(backend_head.contains("upgrade: echo"), "{backend_head}");
        assert!(backend_head.contains("x-forwarded-for: 127.0.0.1"), "{backend_head}");

        stream.write_all(b"ping-pong").await.unwrap();
        let mut echoed = [0u8; 9];
        tokio::time::timeout(Duration::from_secs(5), stream.read_exact(&mut echoed))
            .await
            .expect("echo arrives")
            .unwrap();
        assert_eq!(&echoed, b"ping-pong");
    }

    #[tokio::test]
    async fn tls12_only_client_is_refused() {
        let identity = CertificateProvisioner::default().provision().unwrap();
        let (addr, _stop) = start(&identity).await;
        let connector = TlsConnector::from(Arc::new(client_config(
            &identity,
            &[&rustls::version::TLS12],
        )));

        let tcp = TcpStream::connect(addr).await.unwrap();
        let name = ServerName::from(IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert!(connector.connect(name, tcp).await.is_err());
    }

    #[tokio::test]
    async fn untrusted_identity_is_refused_by_client() {
        let served = CertificateProvisioner::default().provision().unwrap();
        let other = CertificateProvisioner::default().provision().unwrap();
        let (addr, _stop) = start(&served).await;
        let connector = TlsConnector::from(Arc::new(client_config(
            &other,
            rustls::DEFAULT_VERSIONS,
        )));

        let tcp = TcpStream::connect(addr).await.unwrap();
        let name = ServerName::from(IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert!(connector.connect(name, tcp).await.is_err());
    }

    #[tokio::test]
    async fn accept_errors_back_off_before_retrying() {
        let started = std::time::Instant::now();
        accept_backoff(&std::io::Error::from_raw_os_error(24)).await;
        assert!(started.elapsed() >= ACCEPT_ERROR_BACKOFF);
    }

    #[tokio::test]
    async fn shutdown_stops_accept_loop() {
        let identity = CertificateProvisioner::default().provision().unwrap();
        let config = tls::from_identity(&identity).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let handle = tokio::spawn(serve(listener, config, app(), async {}));
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("serve returns once shutdown resolves");
        assert!(result.unwrap().is_ok());
    }
}
