//! Recording engine for capturing backend traffic

use hyper::Response;
use tracing::{debug, error, info, warn};

use super::capture::CapturingSink;
use super::conditional::strip_conditional_headers;
use crate::fingerprint::Fingerprint;
use crate::network::{ProxyBody, UpstreamClient};
use crate::proxy::{relay, ClientSink, ProxyRequest, ResponseSink};
use crate::storage::{RecordStore, ResponseRecord};
use crate::{ChameleonError, Result};

/// Forwards requests to the backend and stores every complete response
pub struct RecordingEngine {
    upstream: UpstreamClient,
    store: RecordStore,
    max_response_size: usize,
}

impl RecordingEngine {
    /// Create a new recording engine
    #[must_use]
    pub fn new(upstream: UpstreamClient, store: RecordStore, max_response_size: usize) -> Self {
        Self {
            upstream,
            store,
            max_response_size,
        }
    }

    /// Forward `request`, stream the answer back and persist it under
    /// `fingerprint`
    ///
    /// The returned response is available as soon as the backend commits its
    /// status; its body streams while the capture runs. The backend's
    /// `Content-Length` is not relayed, so the client body ends only once the
    /// record has been written (or the write has failed).
    ///
    /// # Errors
    ///
    /// Returns error if the outbound request cannot be built
    pub async fn record(
        &self,
        request: ProxyRequest,
        fingerprint: Fingerprint,
    ) -> Result<Response<ProxyBody>> {
        let method = request.parts.method.to_string();
        let path = request.parts.uri.path().to_string();

        let mut parts = request.parts;
        if strip_conditional_headers(&mut parts.headers) {
            info!("[RECORD] Stripped conditional headers to force full response");
        }

        let outbound = self
            .upstream
            .build_request(parts, request.body, request.client_addr)?;

        let (client, pending) = ClientSink::channel();
        let client = client.unframed();
        let upstream = self.upstream.clone();
        let store = self.store.clone();
        let max_response_size = self.max_response_size;

        tokio::spawn(async move {
            let mut sink = CapturingSink::new(client, max_response_size);

            match upstream.send(outbound).await {
                Ok(response) => {
                    if let Err(e) = relay(response, &mut sink).await {
                        warn!("[RECORD] {}", e);
                    }
                }
                Err(e) => sink.abort(&e.to_string()).await,
            }

            let (record, client) = sink.into_parts(&method, &path);
            match record {
                Some(record) => persist(store, fingerprint, record).await,
                None => debug!("[RECORD] Nothing to save for {}", fingerprint.short()),
            }
            drop(client);
        });

        pending.into_response().await
    }
}

/// Write a captured record; failures are logged and never reach the client
async fn persist(store: RecordStore, fingerprint: Fingerprint, record: ResponseRecord) {
    let summary = format!(
        "{} {} | Status: {} | Hash: {}",
        record.method,
        record.path,
        record.status_code,
        fingerprint.short()
    );

    let result = tokio::task::spawn_blocking(move || store.save(&fingerprint, &record))
        .await
        .unwrap_or_else(|e| Err(ChameleonError::Other(format!("save task failed: {e}"))));

    match result {
        Ok(()) => info!("[RECORD] Saved response: {}", summary),
        Err(e) => error!("[ERROR] Failed to save cached response: {}", e),
    }
}
