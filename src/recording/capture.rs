//! Capturing response sink

use hyper::body::Bytes;
use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use hyper::StatusCode;
use tracing::warn;

use crate::proxy::ResponseSink;
use crate::storage::{Body, HeaderMultiMap, ResponseRecord};

/// Sink that relays everything to `inner` while keeping a copy of the
/// status, the headers as committed, and the full body
pub struct CapturingSink<S> {
    inner: S,
    status: Option<StatusCode>,
    headers: HeaderMultiMap,
    body: Vec<u8>,
    max_body: usize,
    overflowed: bool,
    aborted: bool,
}

impl<S: ResponseSink> CapturingSink<S> {
    /// Wrap `inner`, buffering at most `max_body` body bytes
    pub fn new(inner: S, max_body: usize) -> Self {
        Self {
            inner,
            status: None,
            headers: HeaderMultiMap::new(),
            body: Vec::new(),
            max_body,
            overflowed: false,
            aborted: false,
        }
    }

    /// Split into the captured record and the wrapped sink
    ///
    /// The record is `None` when the response was aborted, never committed,
    /// or outgrew the capture limit.
    pub fn into_parts(self, method: &str, path: &str) -> (Option<ResponseRecord>, S) {
        let record = match self.status {
            Some(status) if !self.aborted && !self.overflowed => Some(ResponseRecord {
                method: method.to_string(),
                path: path.to_string(),
                status_code: status.as_u16(),
                headers: self.headers,
                body: Body::from_bytes(&self.body),
            }),
            _ => None,
        };

        (record, self.inner)
    }
}

/// Copy committed headers into the record form
///
/// Values carrying bytes outside visible ASCII are stored lossily
/// (invalid UTF-8 becomes U+FFFD) and replay differently.
fn snapshot(headers: &HeaderMap) -> HeaderMultiMap {
    let mut captured = HeaderMultiMap::new();
    for (name, value) in headers {
        let value = match value.to_str() {
            Ok(text) => text.to_string(),
            Err(_) => {
                let text = String::from_utf8_lossy(value.as_bytes()).into_owned();
                warn!(
                    "Header {} holds non-ASCII bytes, recording it as {:?}",
                    name, text
                );
                text
            }
        };
        captured
            .entry(name.as_str().to_string())
            .or_default()
            .push(value);
    }
    captured
}

impl<S: ResponseSink> ResponseSink for CapturingSink<S> {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn append_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.inner.append_header(name, value);
    }

    fn write_status(&mut self, status: StatusCode) {
        if self.status.is_none() {
            self.headers = snapshot(self.inner.headers());
            self.status = Some(status);
        }
        self.inner.write_status(status);
    }

    async fn write_chunk(&mut self, chunk: Bytes) {
        if self.status.is_none() {
            self.write_status(StatusCode::OK);
        }

        if !self.overflowed {
            if self.body.len() + chunk.len() > self.max_body {
                warn!(
                    "Response body exceeds {} bytes, it will not be recorded",
                    self.max_body
                );
                self.overflowed = true;
                self.body = Vec::new();
            } else {
                self.body.extend_from_slice(&chunk);
            }
        }

        self.inner.write_chunk(chunk).await;
    }

    async fn abort(&mut self, reason: &str) {
        self.aborted = true;
        self.inner.abort(reason).await;
    }

    fn finish(&mut self) {
        if self.status.is_none() {
            self.write_status(StatusCode::OK);
        }
        self.inner.finish();
    }
}
