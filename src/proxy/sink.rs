//! Response sinks
//!
//! A [`ResponseSink`] receives a response piecewise (headers, then the
//! status commit, then body chunks). [`ClientSink`] relays those pieces to
//! the waiting client as they arrive; decorators such as the recorder's
//! capturing sink observe them on the way through. Body writes wait while
//! the client is [`BODY_CHANNEL_CAPACITY`] frames behind.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use http_body_util::BodyExt;
use hyper::body::{Body, Bytes, Frame, Incoming};
use hyper::header::{self, HeaderMap, HeaderName, HeaderValue};
use hyper::{Response, StatusCode};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::network::{is_hop_by_hop, HttpHandler, ProxyBody};
use crate::{ChameleonError, Result};

type BodyFrame = std::result::Result<Frame<Bytes>, io::Error>;

/// Body frames buffered between a [`ClientSink`] and the client connection
pub const BODY_CHANNEL_CAPACITY: usize = 16;

/// Destination of a response produced piece by piece
pub trait ResponseSink: Send {
    /// Headers set so far
    fn headers(&self) -> &HeaderMap;

    /// Add a header value; only meaningful before [`write_status`](Self::write_status)
    fn append_header(&mut self, name: HeaderName, value: HeaderValue);

    /// Commit the status and the headers set so far
    fn write_status(&mut self, status: StatusCode);

    /// Emit a body chunk, committing `200 OK` first if no status was written
    fn write_chunk(&mut self, chunk: Bytes) -> impl Future<Output = ()> + Send;

    /// Mark the response as failed
    fn abort(&mut self, reason: &str) -> impl Future<Output = ()> + Send;

    /// Mark the response as complete, committing `200 OK` if nothing was written
    fn finish(&mut self);
}

/// Sink relaying straight to the client connection
pub struct ClientSink {
    headers: HeaderMap,
    head: Option<oneshot::Sender<Response<ProxyBody>>>,
    body_rx: Option<mpsc::Receiver<BodyFrame>>,
    body_tx: mpsc::Sender<BodyFrame>,
    unframed: bool,
    client_gone: bool,
}

/// Client side of a [`ClientSink`]: resolves once the status is committed
pub struct PendingResponse {
    head: oneshot::Receiver<Response<ProxyBody>>,
}

impl ClientSink {
    /// Create a connected sink and pending response pair
    #[must_use]
    pub fn channel() -> (Self, PendingResponse) {
        let (head_tx, head_rx) = oneshot::channel();
        let (body_tx, body_rx) = mpsc::channel(BODY_CHANNEL_CAPACITY);

        let sink = Self {
            headers: HeaderMap::new(),
            head: Some(head_tx),
            body_rx: Some(body_rx),
            body_tx,
            unframed: false,
            client_gone: false,
        };

        (sink, PendingResponse { head: head_rx })
    }

    /// Drop `Content-Length` on commit, so the client sees the end of the
    /// body only when this sink is dropped
    #[must_use]
    pub fn unframed(mut self) -> Self {
        self.unframed = true;
        self
    }

    fn committed(&self) -> bool {
        self.head.is_none()
    }
}

impl ResponseSink for ClientSink {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn append_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.append(name, value);
    }

    fn write_status(&mut self, status: StatusCode) {
        let (Some(head), Some(body_rx)) = (self.head.take(), self.body_rx.take()) else {
            debug!("Superfluous status write ignored: {}", status);
            return;
        };

        let mut response = Response::new(ChannelBody { rx: body_rx }.boxed());
        *response.status_mut() = status;
        *response.headers_mut() = self.headers.clone();
        if self.unframed {
            response.headers_mut().remove(header::CONTENT_LENGTH);
        }

        if head.send(response).is_err() {
            self.client_gone = true;
        }
    }

    async fn write_chunk(&mut self, chunk: Bytes) {
        if !self.committed() {
            self.write_status(StatusCode::OK);
        }

        if self.client_gone {
            return;
        }

        if self.body_tx.send(Ok(Frame::data(chunk))).await.is_err() {
            debug!("Client disconnected, dropping remaining body");
            self.client_gone = true;
        }
    }

    async fn abort(&mut self, reason: &str) {
        if let Some(head) = self.head.take() {
            self.body_rx = None;
            let error = ChameleonError::Upstream(reason.to_string());
            let _ = head.send(HttpHandler::error_response(&error));
            return;
        }

        if !self.client_gone {
            let _ = self
                .body_tx
                .send(Err(io::Error::other(reason.to_string())))
                .await;
        }
    }

    fn finish(&mut self) {
        if !self.committed() {
            self.write_status(StatusCode::OK);
        }
    }
}

impl PendingResponse {
    /// Wait for the status commit and return the streaming response
    ///
    /// # Errors
    ///
    /// Returns [`ChameleonError::Upstream`] if the sink was dropped without
    /// ever committing a response
    pub async fn into_response(self) -> Result<Response<ProxyBody>> {
        self.head.await.map_err(|_| {
            ChameleonError::Upstream("backend produced no response".to_string())
        })
    }
}

/// Body fed by a [`ClientSink`]; ends when the sink is dropped
struct ChannelBody {
    rx: mpsc::Receiver<BodyFrame>,
}

impl Body for ChannelBody {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<std::result::Result<Frame<Bytes>, io::Error>>> {
        self.rx.poll_recv(cx)
    }
}

/// Feed a backend response into `sink`: end-to-end headers, status, then
/// every body chunk as it arrives
///
/// # Errors
///
/// Returns [`ChameleonError::Upstream`] if the backend body fails midway;
/// the sink has been aborted by then
pub async fn relay<S: ResponseSink>(response: Response<Incoming>, sink: &mut S) -> Result<()> {
    let (parts, mut body) = response.into_parts();

    for (name, value) in &parts.headers {
        if !is_hop_by_hop(name, &parts.headers) {
            sink.append_header(name.clone(), value.clone());
        }
    }
    sink.write_status(parts.status);

    while let Some(frame) = body.frame().await {
        match frame {
            Ok(frame) => {
                // Trailers are not relayed
                if let Ok(data) = frame.into_data() {
                    if !data.is_empty() {
                        sink.write_chunk(data).await;
                    }
                }
            }
            Err(e) => {
                let reason = format!("backend response body failed: {e}");
                sink.abort(&reason).await;
                return Err(ChameleonError::Upstream(reason));
            }
        }
    }

    sink.finish();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_client_sink_streams_response() {
        let (mut sink, pending) = ClientSink::channel();

        sink.append_header(
            HeaderName::from_static("content-type"),
            HeaderValue::from_static("text/plain"),
        );
        sink.write_status(StatusCode::CREATED);
        sink.write_chunk(Bytes::from_static(b"hello ")).await;
        sink.write_chunk(Bytes::from_static(b"world")).await;
        sink.finish();
        drop(sink);

        let response = pending.into_response().await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["content-type"], "text/plain");

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, Bytes::from_static(b"hello world"));
    }

    #[tokio::test]
    async fn test_head_available_before_body_ends() {
        let (mut sink, pending) = ClientSink::channel();
        sink.write_status(StatusCode::OK);

        let response = pending.into_response().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        sink.write_chunk(Bytes::from_static(b"late")).await;
        drop(sink);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, Bytes::from_static(b"late"));
    }

    #[tokio::test]
    async fn test_chunk_without_status_defaults_to_ok() {
        let (mut sink, pending) = ClientSink::channel();
        sink.write_chunk(Bytes::from_static(b"x")).await;
        drop(sink);

        assert_eq!(pending.into_response().await.unwrap().status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_headers_after_commit_not_sent() {
        let (mut sink, pending) = ClientSink::channel();
        sink.write_status(StatusCode::OK);
        sink.append_header(
            HeaderName::from_static("x-late"),
            HeaderValue::from_static("1"),
        );
        drop(sink);

        let response = pending.into_response().await.unwrap();
        assert!(response.headers().get("x-late").is_none());
    }

    #[tokio::test]
    async fn test_abort_before_commit_is_bad_gateway() {
        let (mut sink, pending) = ClientSink::channel();
        sink.abort("connection refused").await;

        let response = pending.into_response().await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_abort_after_commit_fails_body() {
        let (mut sink, pending) = ClientSink::channel();
        sink.write_status(StatusCode::OK);
        sink.write_chunk(Bytes::from_static(b"partial")).await;
        sink.abort("reset").await;
        drop(sink);

        let response = pending.into_response().await.unwrap();
        assert!(response.into_body().collect().await.is_err());
    }

    #[tokio::test]
    async fn test_write_waits_for_slow_client() {
        let (mut sink, pending) = ClientSink::channel();
        sink.write_status(StatusCode::OK);
        for _ in 0..BODY_CHANNEL_CAPACITY {
            sink.write_chunk(Bytes::from_static(b"x")).await;
        }

        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            sink.write_chunk(Bytes::from_static(b"y")),
        )
        .await;
        assert!(blocked.is_err(), "write must wait while the client is behind");

        let response = pending.into_response().await.unwrap();
        let reader =
            tokio::spawn(async move { response.into_body().collect().await.unwrap().to_bytes() });
        sink.write_chunk(Bytes::from_static(b"y")).await;
        drop(sink);

        assert_eq!(reader.await.unwrap().len(), BODY_CHANNEL_CAPACITY + 1);
    }

    #[tokio::test]
    async fn test_unframed_sink_drops_content_length() {
        let (sink, pending) = ClientSink::channel();
        let mut sink = sink.unframed();
        sink.append_header(header::CONTENT_LENGTH, HeaderValue::from_static("5"));
        sink.append_header(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        sink.write_status(StatusCode::OK);
        sink.write_chunk(Bytes::from_static(b"hello")).await;
        drop(sink);

        let response = pending.into_response().await.unwrap();
        assert!(response.headers().get(header::CONTENT_LENGTH).is_none());
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
    }

    #[tokio::test]
    async fn test_dropped_sink_is_upstream_error() {
        let (sink, pending) = ClientSink::channel();
        drop(sink);

        assert!(matches!(
            pending.into_response().await,
            Err(ChameleonError::Upstream(_))
        ));
    }
}
