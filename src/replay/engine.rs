//! Replay engine for serving recorded responses

use hyper::header::{self, HeaderMap, HeaderName, HeaderValue};
use hyper::{Response, StatusCode};
use tracing::{debug, warn};

use crate::fingerprint::Fingerprint;
use crate::network::{empty_body, full_body, ProxyBody, HOP_BY_HOP_HEADERS};
use crate::storage::{RecordStore, ResponseRecord};
use crate::{ChameleonError, Result};

/// Serves responses from the record store
pub struct ReplayEngine {
    store: RecordStore,
}

impl ReplayEngine {
    /// Create a new replay engine
    #[must_use]
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    /// Re-emit the record stored under `fingerprint`
    ///
    /// # Errors
    ///
    /// Returns [`ChameleonError::RecordingNotFound`] on a miss and
    /// [`ChameleonError::CorruptRecord`] if the record cannot be decoded
    pub async fn replay(&self, fingerprint: Fingerprint) -> Result<Response<ProxyBody>> {
        let store = self.store.clone();
        let loaded = tokio::task::spawn_blocking(move || store.load(&fingerprint))
            .await
            .map_err(|e| ChameleonError::Other(format!("load task failed: {e}")))?;

        let record = match loaded {
            Ok(record) => record,
            Err(ChameleonError::RecordingNotFound(hash)) => {
                warn!("[REPLAY] No cached response found for hash: {}", hash);
                return Err(ChameleonError::RecordingNotFound(hash));
            }
            Err(e) => {
                warn!("[REPLAY] Failed to load cached response: {}", e);
                return Err(e);
            }
        };

        debug!(
            "[REPLAY] Serving cached response: {} {} | Status: {} | Hash: {}",
            record.method,
            record.path,
            record.status_code,
            fingerprint.short()
        );

        build_response(&record).map_err(|reason| ChameleonError::CorruptRecord {
            path: self.store.path_for(&fingerprint),
            reason,
        })
    }
}

/// Rebuild a response from a stored record
///
/// `Content-Length` and hop-by-hop headers are dropped; the transport derives
/// the length from the emitted body. The body is omitted for statuses that
/// forbid one (1xx, 204, 304) even when the record holds bytes.
///
/// # Errors
///
/// Returns a description of the problem if the stored status is not a valid
/// HTTP status code
pub fn build_response(record: &ResponseRecord) -> std::result::Result<Response<ProxyBody>, String> {
    let status = StatusCode::from_u16(record.status_code)
        .map_err(|_| format!("invalid status code {}", record.status_code))?;

    let mut headers = HeaderMap::new();
    for (name, values) in &record.headers {
        if name.eq_ignore_ascii_case(header::CONTENT_LENGTH.as_str())
            || HOP_BY_HOP_HEADERS
                .iter()
                .any(|hop| name.eq_ignore_ascii_case(hop))
        {
            continue;
        }

        let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) else {
            warn!("[REPLAY] Skipping invalid header name {:?}", name);
            continue;
        };

        let mut values = values.iter().filter_map(|value| match HeaderValue::from_str(value) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("[REPLAY] Skipping invalid value for header {}", name);
                None
            }
        });

        if let Some(first) = values.next() {
            headers.insert(header_name.clone(), first);
            for value in values {
                headers.append(header_name.clone(), value);
            }
        }
    }

    let bytes = record.body.to_bytes();
    let body = if record.body_allowed() && !bytes.is_empty() {
        full_body(bytes)
    } else {
        empty_body()
    };

    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}
