//! The unit of recording: one forwarded request and its response.
//!
//! An [`Exchange`] is assembled by the forwarder once the response is known
//! (or, for streams, once the stream has ended) and is not modified after
//! it is handed to a [`crate::recorder::Recorder`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use http::{HeaderMap, Method, StatusCode};

use crate::proxy::Payload;

/// The request half, as sent upstream.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// HTTP method
    pub method: Method,
    /// Full upstream URL (base + path + query)
    pub url: String,
    /// Headers sent upstream (already filtered)
    pub headers: HeaderMap,
    /// Classified request body
    pub body: Payload,
}

/// The response half, as relayed to the caller.
#[derive(Debug, Clone)]
pub struct RecordedResponse {
    /// Upstream status code
    pub status: StatusCode,
    /// Headers returned to the caller (already filtered)
    pub headers: HeaderMap,
    /// Classified response body; for streams, the concatenated chunks as text
    pub body: Payload,
}

/// One forwarded request/response pair.
#[derive(Debug, Clone)]
pub struct Exchange {
    /// When the request was received (UTC)
    pub timestamp: DateTime<Utc>,
    /// Request half
    pub request: RecordedRequest,
    /// Response half
    pub response: RecordedResponse,
    /// Relayed incrementally rather than buffered
    pub streaming: bool,
    /// False when the caller went away before the upstream stream ended
    pub complete: bool,
    /// Time from receipt to the end of the response
    pub duration: Duration,
}

impl Exchange {
    /// Response body text, if the response was recorded as text.
    pub fn response_text(&self) -> Option<&str> {
        self.response.body.as_text()
    }

    /// Duration in whole milliseconds.
    pub fn duration_ms(&self) -> u64 {
        self.duration.as_millis() as u64
    }
}
