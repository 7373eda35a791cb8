//! HTTP proxy dispatching each request to the configured mode

use std::net::SocketAddr;
use std::time::Instant;

use hyper::body::Bytes;
use hyper::http::request::Parts;
use hyper::{Request, Response};
use tracing::{debug, info};

use super::sink::{relay, ClientSink, ResponseSink};
use crate::config::{Config, LimitsConfig, Mode};
use crate::fingerprint::{fingerprint_request, Fingerprint};
use crate::network::{HttpHandler, ProxyBody, UpstreamClient};
use crate::recording::RecordingEngine;
use crate::replay::ReplayEngine;
use crate::storage::RecordStore;
use crate::Result;

/// Inbound request with its body fully buffered
pub struct ProxyRequest {
    /// Method, URI, headers
    pub parts: Parts,
    /// Request body
    pub body: Bytes,
    /// Address of the connecting client
    pub client_addr: Option<SocketAddr>,
}

impl ProxyRequest {
    /// Fingerprint over method, path (query excluded) and body
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        fingerprint_request(self.parts.method.as_str(), self.parts.uri.path(), &self.body)
    }
}

/// Request handling strategy, chosen once from the configured mode
pub enum Strategy {
    /// Forward, capture and persist
    Record(RecordingEngine),
    /// Serve from the store only
    Replay(ReplayEngine),
    /// Forward without capture
    Passthrough(UpstreamClient),
}

/// HTTP proxy that handles record, replay and passthrough
pub struct HttpProxy {
    strategy: Strategy,
    limits: LimitsConfig,
}

impl HttpProxy {
    /// Build the strategy for `config.mode`
    ///
    /// Replay mode never creates a backend client.
    ///
    /// # Errors
    ///
    /// Returns error if the backend URL is invalid or the store directory
    /// cannot be created
    pub fn new(config: &Config) -> Result<Self> {
        let strategy = match config.mode {
            Mode::Record => Strategy::Record(RecordingEngine::new(
                UpstreamClient::new(config.backend_uri()?),
                RecordStore::open(&config.storage_dir)?,
                config.limits.max_response_size,
            )),
            Mode::Replay => Strategy::Replay(ReplayEngine::new(RecordStore::open(
                &config.storage_dir,
            )?)),
            Mode::Passthrough => Strategy::Passthrough(UpstreamClient::new(config.backend_uri()?)),
        };

        Ok(Self::with_strategy(strategy, config.limits.clone()))
    }

    /// Wrap an already-built strategy
    #[must_use]
    pub fn with_strategy(strategy: Strategy, limits: LimitsConfig) -> Self {
        Self { strategy, limits }
    }

    /// Active mode
    #[must_use]
    pub fn mode(&self) -> Mode {
        match self.strategy {
            Strategy::Record(_) => Mode::Record,
            Strategy::Replay(_) => Mode::Replay,
            Strategy::Passthrough(_) => Mode::Passthrough,
        }
    }

    /// Handle one request; failures become plain-text error responses
    pub async fn handle<B>(&self, request: Request<B>, client_addr: Option<SocketAddr>) -> Response<ProxyBody>
    where
        B: hyper::body::Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let start = Instant::now();
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        let response = match self.dispatch(request, client_addr).await {
            Ok(response) => response,
            Err(e) => {
                debug!("[{}] {} {} failed: {}", self.mode(), method, path, e);
                HttpHandler::error_response(&e)
            }
        };

        info!(
            "[{}] {} {} | Status: {} | {:?}",
            self.mode(),
            method,
            path,
            response.status().as_u16(),
            start.elapsed()
        );

        response
    }

    async fn dispatch<B>(&self, request: Request<B>, client_addr: Option<SocketAddr>) -> Result<Response<ProxyBody>>
    where
        B: hyper::body::Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        HttpHandler::validate_request(&request, self.limits.max_request_size, self.limits.max_headers)?;

        let (parts, body) = request.into_parts();
        let body = HttpHandler::read_body(body, self.limits.max_request_size).await?;
        let request = ProxyRequest {
            parts,
            body,
            client_addr,
        };

        match &self.strategy {
            Strategy::Record(engine) => {
                let fingerprint = request.fingerprint();
                debug!("[RECORD] Hash: {}", fingerprint.short());
                engine.record(request, fingerprint).await
            }
            Strategy::Replay(engine) => {
                let fingerprint = request.fingerprint();
                debug!("[REPLAY] Hash: {}", fingerprint.short());
                engine.replay(fingerprint).await
            }
            Strategy::Passthrough(upstream) => passthrough(upstream, request).await,
        }
    }
}

/// Forward and relay with no fingerprinting, capture or storage
async fn passthrough(upstream: &UpstreamClient, request: ProxyRequest) -> Result<Response<ProxyBody>> {
    let outbound = upstream.build_request(request.parts, request.body, request.client_addr)?;
    let (mut client, pending) = ClientSink::channel();
    let upstream = upstream.clone();

    tokio::spawn(async move {
        match upstream.send(outbound).await {
            Ok(response) => {
                if let Err(e) = relay(response, &mut client).await {
                    debug!("[PASSTHROUGH] {}", e);
                }
            }
            Err(e) => client.abort(&e.to_string()).await,
        }
    });

    pending.into_response().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Body, HeaderMultiMap, ResponseRecord};
    use http_body_util::{BodyExt, Full};
    use hyper::StatusCode;
    use tempfile::TempDir;

    fn create_test_config(mode: Mode, temp_dir: &TempDir) -> Config {
        Config {
            mode,
            // Nothing listens on port 1
            backend_url: "http://127.0.0.1:1".to_string(),
            storage_dir: temp_dir.path().to_path_buf(),
            ..Config::default()
        }
    }

    fn get(path: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .uri(path)
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_proxy_modes() {
        let temp_dir = TempDir::new().unwrap();
        for mode in [Mode::Record, Mode::Replay, Mode::Passthrough] {
            let proxy = HttpProxy::new(&create_test_config(mode, &temp_dir)).unwrap();
            assert_eq!(proxy.mode(), mode);
        }
    }

    #[tokio::test]
    async fn test_replay_miss_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let proxy = HttpProxy::new(&create_test_config(Mode::Replay, &temp_dir)).unwrap();

        let response = proxy.handle(get("/nonexistent"), None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let expected = fingerprint_request("GET", "/nonexistent", b"").to_hex();
        assert!(String::from_utf8_lossy(&body).contains(&expected));
    }

    #[tokio::test]
    async fn test_replay_ignores_query_string() {
        let temp_dir = TempDir::new().unwrap();
        let store = RecordStore::open(temp_dir.path()).unwrap();
        let record = ResponseRecord {
            method: "GET".to_string(),
            path: "/search".to_string(),
            status_code: 200,
            headers: HeaderMultiMap::new(),
            body: Body::from_bytes(b"results"),
        };
        store
            .save(&fingerprint_request("GET", "/search", b""), &record)
            .unwrap();

        let proxy = HttpProxy::new(&create_test_config(Mode::Replay, &temp_dir)).unwrap();
        let response = proxy.handle(get("/search?q=anything"), None).await;

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_record_unreachable_backend() {
        let temp_dir = TempDir::new().unwrap();
        let proxy = HttpProxy::new(&create_test_config(Mode::Record, &temp_dir)).unwrap();

        let response = proxy.handle(get("/api"), None).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let store = RecordStore::open(temp_dir.path()).unwrap();
        assert!(store.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_passthrough_unreachable_backend() {
        let temp_dir = TempDir::new().unwrap();
        let proxy = HttpProxy::new(&create_test_config(Mode::Passthrough, &temp_dir)).unwrap();

        let response = proxy.handle(get("/api"), None).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_oversized_request_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = create_test_config(Mode::Replay, &temp_dir);
        config.limits.max_request_size = 4;
        let proxy = HttpProxy::new(&config).unwrap();

        let request = Request::builder()
            .method("POST")
            .uri("/upload")
            .body(Full::new(Bytes::from_static(b"too many bytes")))
            .unwrap();

        let response = proxy.handle(request, None).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
