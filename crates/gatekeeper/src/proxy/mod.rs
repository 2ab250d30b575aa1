//! Transparent relay of authenticated requests to the backend.
//!
//! For each request the pipeline:
//! 1. Logs the client address, method and URI.
//! 2. Rewrites the URI onto the backend (base path joined, queries merged).
//! 3. Strips hop-by-hop headers and appends `X-Forwarded-For`.
//! 4. Sends it over HTTP/1.1 with the shared pooled client.
//! 5. Logs the status and relays the response head and body as-is.
//!
//! A `101 Switching Protocols` answer to a client upgrade request splices the
//! two upgraded connections together. Backend failures are returned as
//! [`GateError::BadGateway`]; there is no retry.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::http::{
    header,
    uri::{Authority, Scheme},
    HeaderMap, HeaderName, HeaderValue, Request, Response, StatusCode, Uri, Version,
};
use common::GateError;
use hyper::upgrade::OnUpgrade;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use tracing::{debug, info, warn};

/// Limit on establishing a TCP connection to the backend.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Idle pooled backend connections are closed after this long.
pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Headers that describe a single transport hop and are never forwarded.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Forwards requests to one fixed backend.
///
/// Cheap to clone; all clones share the connection pool.
#[derive(Clone)]
pub struct ProxyPipeline {
    client: Client<HttpConnector, Body>,
    backend: Arc<Backend>,
}

#[derive(Debug)]
struct Backend {
    scheme: Scheme,
    authority: Authority,
    path: String,
    query: String,
}

impl ProxyPipeline {
    /// Build a pipeline targeting `backend` (an absolute `http://` URL).
    ///
    /// # Errors
    ///
    /// Returns an error if `backend` lacks a scheme or authority.
    pub fn new(backend: &Uri) -> Result<Self> {
        let backend = Backend {
            scheme: backend.scheme().cloned().context("backend URL has no scheme")?,
            authority: backend
                .authority()
                .cloned()
                .context("backend URL has no host")?,
            path: backend.path().to_owned(),
            query: backend.query().unwrap_or_default().to_owned(),
        };

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(CONNECT_TIMEOUT));
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .pool_timer(TokioTimer::new())
            .build(connector);

        Ok(Self {
            client,
            backend: Arc::new(backend),
        })
    }

    /// Relay `req` to the backend and return its response.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::BadGateway`] if the backend cannot be reached or
    /// answers with an unsolicited protocol switch.
    pub async fn forward(
        &self,
        client: Option<SocketAddr>,
        req: Request<Body>,
    ) -> Result<Response<Body>, GateError> {
        let client_label = client.map_or_else(|| "-".to_owned(), |a| a.to_string());
        info!(
            client = %client_label,
            method = %req.method(),
            uri = %req.uri(),
            "request received"
        );

        match self.relay(client.map(|a| a.ip()), req).await {
            Ok(resp) => {
                info!(client = %client_label, status = resp.status().as_u16(), "response produced");
                Ok(resp)
            }
            Err(e) => {
                warn!(client = %client_label, error = %e, "backend request failed");
                Err(e)
            }
        }
    }

    async fn relay(
        &self,
        client_ip: Option<IpAddr>,
        mut req: Request<Body>,
    ) -> Result<Response<Body>, GateError> {
        let upgrade = upgrade_protocol(req.headers());
        let client_upgrade = upgrade.as_ref().map(|_| hyper::upgrade::on(&mut req));

        *req.uri_mut() = self.backend.target_uri(req.uri())?;
        // The inbound request may be HTTP/2; the backend is spoken to over HTTP/1.1.
        *req.version_mut() = Version::HTTP_11;

        let headers = req.headers_mut();
        strip_hop_by_hop(headers);
        if let Some(protocol) = upgrade {
            headers.insert(header::CONNECTION, HeaderValue::from_static("upgrade"));
            headers.insert(header::UPGRADE, protocol);
        }
        if let Some(ip) = client_ip {
            append_forwarded_for(headers, ip);
        }

        let mut resp = self
            .client
            .request(req)
            .await
            .map_err(|e| GateError::BadGateway(e.to_string()))?;

        if resp.status() == StatusCode::SWITCHING_PROTOCOLS {
            let Some(client_upgrade) = client_upgrade else {
                return Err(GateError::BadGateway(
                    "backend switched protocols without an upgrade request".into(),
                ));
            };
            let backend_upgrade = hyper::upgrade::on(&mut resp);
            tokio::spawn(splice(client_upgrade, backend_upgrade));
        } else {
            strip_hop_by_hop(resp.headers_mut());
        }

        let (parts, body) = resp.into_parts();
        Ok(Response::from_parts(parts, Body::new(body)))
    }
}

impl Backend {
    /// Map an inbound request URI onto the backend.
    fn target_uri(&self, incoming: &Uri) -> Result<Uri, GateError> {
        let path = join_paths(&self.path, incoming.path());
        let query = join_queries(&self.query, incoming.query().unwrap_or_default());
        let path_and_query = if query.is_empty() {
            path
        } else {
            format!("{path}?{query}")
        };

        Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
            .map_err(|e| GateError::Internal(format!("invalid backend URI: {e}")))
    }
}

/// Join two path segments with exactly one `/` between them.
fn join_paths(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{base}{}", &path[1..]),
        (false, false) => format!("{base}/{path}"),
        _ => format!("{base}{path}"),
    }
}

fn join_queries(base: &str, query: &str) -> String {
    if base.is_empty() || query.is_empty() {
        format!("{base}{query}")
    } else {
        format!("{base}&{query}")
    }
}

/// The requested `Upgrade` protocol, if the request asks to switch protocols.
fn upgrade_protocol(headers: &HeaderMap) -> Option<HeaderValue> {
    let wants_upgrade = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));
    if !wants_upgrade {
        return None;
    }
    headers.get(header::UPGRADE).cloned()
}

/// Remove hop-by-hop headers, including any named in `Connection`.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect();
    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Append the client IP to any `X-Forwarded-For` chain already present.
fn append_forwarded_for(headers: &mut HeaderMap, ip: IpAddr) {
    let prior: Vec<&str> = headers
        .get_all(&X_FORWARDED_FOR)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();
    let chain = if prior.is_empty() {
        ip.to_string()
    } else {
        format!("{}, {ip}", prior.join(", "))
    };
    if let Ok(value) = HeaderValue::from_str(&chain) {
        headers.insert(X_FORWARDED_FOR.clone(), value);
    }
}

/// Copy bytes both ways between two upgraded connections until either closes.
async fn splice(client: OnUpgrade, backend: OnUpgrade) {
    let (client, backend) = match tokio::try_join!(client, backend) {
        Ok(pair) => pair,
        Err(e) => {
            warn!(error = %e, "protocol upgrade failed");
            return;
        }
    };
    let mut client = TokioIo::new(client);
    let mut backend = TokioIo::new(backend);
    match tokio::io::copy_bidirectional(&mut client, &mut backend).await {
        Ok((to_backend, to_client)) => {
            debug!(to_backend, to_client, "upgraded connection closed");
        }
        Err(e) => debug!(error = %e, "upgraded connection aborted"),
    }
}
