//! HTTP helpers shared by the server and the proxy strategies

use std::convert::Infallible;
use std::io;

use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::Bytes;
use hyper::header::{self, HeaderMap, HeaderName, HeaderValue};
use hyper::{Request, Response, StatusCode};

use crate::{ChameleonError, Result};

/// Body type of every response the proxy returns
pub type ProxyBody = BoxBody<Bytes, io::Error>;

/// Hop-by-hop headers, never forwarded in either direction
pub const HOP_BY_HOP_HEADERS: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn never(never: Infallible) -> io::Error {
    match never {}
}

/// Wrap buffered bytes as a [`ProxyBody`]
pub fn full_body(bytes: impl Into<Bytes>) -> ProxyBody {
    Full::new(bytes.into()).map_err(never).boxed()
}

/// An empty [`ProxyBody`]
pub fn empty_body() -> ProxyBody {
    Empty::<Bytes>::new().map_err(never).boxed()
}

/// Whether `name` is hop-by-hop, either by definition or because the
/// message's `Connection` header lists it
pub fn is_hop_by_hop(name: &HeaderName, headers: &HeaderMap) -> bool {
    if HOP_BY_HOP_HEADERS.contains(&name.as_str()) {
        return true;
    }

    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case(name.as_str()))
}

/// Remove hop-by-hop headers in place
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .keys()
        .filter(|name| is_hop_by_hop(name, headers))
        .cloned()
        .collect();

    for name in listed {
        headers.remove(name);
    }
}

/// HTTP helper functions
pub struct HttpHandler;

impl HttpHandler {
    /// Create a plain-text response
    #[must_use]
    pub fn text_response(status: StatusCode, body: &str) -> Response<ProxyBody> {
        let mut response = Response::new(full_body(format!("{body}\n")));
        *response.status_mut() = status;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response.headers_mut().insert(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        );
        response
    }

    /// Status code an error is surfaced with
    #[must_use]
    pub fn error_status(error: &ChameleonError) -> StatusCode {
        match error {
            ChameleonError::RecordingNotFound(_) => StatusCode::NOT_FOUND,
            ChameleonError::DataTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ChameleonError::TooManyHeaders(_) => StatusCode::BAD_REQUEST,
            ChameleonError::Upstream(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Create an error response
    #[must_use]
    pub fn error_response(error: &ChameleonError) -> Response<ProxyBody> {
        Self::text_response(Self::error_status(error), &error.to_string())
    }

    /// Check declared size and header count before reading the body
    ///
    /// # Errors
    ///
    /// Returns error if request is too large or carries too many headers
    pub fn validate_request<B>(request: &Request<B>, max_size: usize, max_headers: usize) -> Result<()> {
        let declared = request
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<usize>().ok());

        if let Some(length) = declared {
            if length > max_size {
                return Err(ChameleonError::DataTooLarge {
                    size: length,
                    limit: max_size,
                });
            }
        }

        let header_count = request.headers().len();
        if header_count > max_headers {
            return Err(ChameleonError::TooManyHeaders(header_count));
        }

        Ok(())
    }

    /// Read request body with size limit
    ///
    /// # Errors
    ///
    /// Returns [`ChameleonError::HashFailure`] if the body cannot be read and
    /// [`ChameleonError::DataTooLarge`] if it exceeds `max_size`
    pub async fn read_body<B>(body: B, max_size: usize) -> Result<Bytes>
    where
        B: hyper::body::Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let collected = http_body_util::Limited::new(body, max_size)
            .collect()
            .await
            .map_err(|e| {
                if e.downcast_ref::<http_body_util::LengthLimitError>().is_some() {
                    ChameleonError::DataTooLarge {
                        size: max_size.saturating_add(1),
                        limit: max_size,
                    }
                } else {
                    ChameleonError::HashFailure(io::Error::other(format!(
                        "failed to read request body: {e}"
                    )))
                }
            })?;

        Ok(collected.to_bytes())
    }
}
