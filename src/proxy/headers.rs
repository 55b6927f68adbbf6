//! Hop-by-hop header filtering.
//!
//! Each leg of the relay gets its own filtered copy of the headers. The
//! dropped headers describe framing or the connection itself, and the relay
//! changes both: bodies are re-framed and upstream compression is decoded
//! before the bytes reach the caller.

use http::HeaderMap;

/// Headers never sent to the upstream.
pub const EXCLUDED_REQUEST_HEADERS: &[&str] =
    &["host", "content-length", "transfer-encoding", "connection"];

/// Headers never returned to the caller.
pub const EXCLUDED_RESPONSE_HEADERS: &[&str] = &[
    "content-encoding",
    "content-length",
    "transfer-encoding",
    "connection",
];

/// Which leg of the relay a header set is travelling on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderDirection {
    /// Caller → upstream
    Request,
    /// Upstream → caller
    Response,
}

impl HeaderDirection {
    /// Exclusion set for this direction (lowercase names).
    pub fn excluded(self) -> &'static [&'static str] {
        match self {
            Self::Request => EXCLUDED_REQUEST_HEADERS,
            Self::Response => EXCLUDED_RESPONSE_HEADERS,
        }
    }

    /// Returns true if `name` must not cross this leg.
    pub fn excludes(self, name: &str) -> bool {
        self.excluded()
            .iter()
            .any(|excluded| excluded.eq_ignore_ascii_case(name))
    }
}

/// Copy every header not excluded for `direction`.
///
/// Multi-valued headers keep all their values, in order.
pub fn filter_headers(headers: &HeaderMap, direction: HeaderDirection) -> HeaderMap {
    let mut filtered = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if !direction.excludes(name.as_str()) {
            filtered.append(name.clone(), value.clone());
        }
    }
    filtered
}
