//! HTTP client forwarding requests to the backend origin

use std::net::SocketAddr;
use std::time::Duration;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{self, HeaderValue};
use hyper::http::request::Parts;
use hyper::{Request, Response, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::{debug, warn};

use super::http::strip_hop_by_hop;
use crate::{ChameleonError, Result};

/// Pooled client bound to a single backend origin
#[derive(Clone)]
pub struct UpstreamClient {
    client: Client<HttpConnector, Full<Bytes>>,
    backend: Uri,
}

impl UpstreamClient {
    /// Create a client for `backend`
    #[must_use]
    pub fn new(backend: Uri) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_millis(super::CONNECT_TIMEOUT_MS)));

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build(connector);

        Self { client, backend }
    }

    /// Rewrite an inbound request so it targets the backend
    ///
    /// # Errors
    ///
    /// Returns error if the target URI or request cannot be built
    pub fn build_request(
        &self,
        mut parts: Parts,
        body: Bytes,
        client_addr: Option<SocketAddr>,
    ) -> Result<Request<Full<Bytes>>> {
        let path_and_query = parts
            .uri
            .path_and_query()
            .map_or("/", |pq| pq.as_str());
        parts.uri = join_uri(&self.backend, path_and_query)?;

        strip_hop_by_hop(&mut parts.headers);

        if let Some(authority) = self.backend.authority() {
            let host = HeaderValue::from_str(authority.as_str())
                .map_err(|e| ChameleonError::Other(format!("invalid backend host: {e}")))?;
            parts.headers.insert(header::HOST, host);
        }

        if let Some(addr) = client_addr {
            let ip = addr.ip().to_string();
            let forwarded = match parts
                .headers
                .get("x-forwarded-for")
                .and_then(|value| value.to_str().ok())
            {
                Some(prior) => format!("{prior}, {ip}"),
                None => ip,
            };
            if let Ok(value) = HeaderValue::from_str(&forwarded) {
                parts.headers.insert("x-forwarded-for", value);
            }
        }

        Ok(Request::from_parts(parts, Full::new(body)))
    }

    /// Send a request to the backend and return the response head with a
    /// streaming body
    ///
    /// # Errors
    ///
    /// Returns [`ChameleonError::Upstream`] if the backend cannot be reached
    pub async fn send(&self, request: Request<Full<Bytes>>) -> Result<Response<Incoming>> {
        debug!("Forwarding {} to {}", request.method(), request.uri());

        self.client.request(request).await.map_err(|e| {
            warn!("Request failed: {e}");
            ChameleonError::Upstream(format!("backend request failed: {e}"))
        })
    }
}

/// Append a request's path and query to the backend origin, keeping any
/// base path the backend URL carries
fn join_uri(backend: &Uri, path_and_query: &str) -> Result<Uri> {
    let base = backend.path().trim_end_matches('/');
    let target = format!("{base}{path_and_query}");

    let mut builder = Uri::builder().path_and_query(target.as_str());
    if let Some(scheme) = backend.scheme() {
        builder = builder.scheme(scheme.clone());
    }
    if let Some(authority) = backend.authority() {
        builder = builder.authority(authority.clone());
    }

    builder
        .build()
        .map_err(|e| ChameleonError::Other(format!("Invalid URI '{target}': {e}")))
}
