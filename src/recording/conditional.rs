//! Conditional request header stripping
//!
//! A recorder must see full representations. Validators let the backend
//! answer `304 Not Modified` (or `412`) with no body, which would then be
//! replayed forever.

use hyper::header::{self, HeaderMap, HeaderName};

/// Validator headers removed before forwarding in record mode
pub const CONDITIONAL_HEADERS: [HeaderName; 5] = [
    header::IF_NONE_MATCH,
    header::IF_MODIFIED_SINCE,
    header::IF_RANGE,
    header::IF_MATCH,
    header::IF_UNMODIFIED_SINCE,
];

/// Whether a `Cache-Control` value asks the backend to revalidate
fn requests_revalidation(value: &str) -> bool {
    value.split(',').any(|directive| {
        let directive = directive.trim();
        directive.eq_ignore_ascii_case("no-cache")
            || directive
                .split_once('=')
                .is_some_and(|(name, arg)| {
                    name.trim().eq_ignore_ascii_case("max-age") && arg.trim() == "0"
                })
    })
}

/// Remove conditional headers and revalidating `Cache-Control` values
///
/// Returns `true` if anything was removed.
pub fn strip_conditional_headers(headers: &mut HeaderMap) -> bool {
    let mut stripped = false;

    for name in &CONDITIONAL_HEADERS {
        if headers.remove(name).is_some() {
            stripped = true;
        }
    }

    let revalidates = headers
        .get_all(header::CACHE_CONTROL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(requests_revalidation);

    if revalidates {
        headers.remove(header::CACHE_CONTROL);
        stripped = true;
    }

    stripped
}
