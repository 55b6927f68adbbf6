//! Request forwarding and response relay.
//!
//! ```text
//!  inbound ──> read body ──> classify ──> wants_stream?
//!                                            │
//!                 ┌──────────── no ──────────┴────────── yes ─────────────┐
//!                 v                                                       v
//!          send (buffered)                                     open_stream (headers)
//!                 │                                                       │
//!          record + reply                            relay chunk ─> tap ─> caller
//!                                                           (repeat until upstream ends)
//!                                                                         │
//!                                                                      record
//! ```
//!
//! The buffered path returns the upstream bytes untouched. The streaming
//! path hands each chunk to the caller as it arrives; a [`StreamTap`] keeps a
//! copy and records the exchange when the stream ends or is abandoned.

use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::{self, Stream, StreamExt};
use http::{HeaderMap, Method, StatusCode, Uri};

use super::headers::{filter_headers, HeaderDirection};
use super::payload::Payload;
use super::upstream::{ChunkStream, OutboundRequest, UpstreamClient};
use crate::error::{RelayError, Result};
use crate::exchange::{Exchange, RecordedRequest, RecordedResponse};
use crate::recorder::{RecordQueue, Recorder};

/// Body stream relayed to the caller.
pub type RelayStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// What the caller gets back.
pub enum Relay {
    /// Complete upstream response
    Buffered {
        /// Upstream status
        status: StatusCode,
        /// Filtered upstream headers
        headers: HeaderMap,
        /// Upstream body bytes, unchanged
        body: Bytes,
    },
    /// Upstream response still arriving
    Streaming {
        /// Upstream status
        status: StatusCode,
        /// Filtered upstream headers
        headers: HeaderMap,
        /// Chunks as they arrive
        body: RelayStream,
    },
}

impl Relay {
    /// Status code being relayed.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Buffered { status, .. } | Self::Streaming { status, .. } => *status,
        }
    }

    /// Headers being relayed.
    pub fn headers(&self) -> &HeaderMap {
        match self {
            Self::Buffered { headers, .. } | Self::Streaming { headers, .. } => headers,
        }
    }

    /// Returns true for the streaming variant.
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming { .. })
    }
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("status", &self.status())
            .field("streaming", &self.is_streaming())
            .finish_non_exhaustive()
    }
}

impl IntoResponse for Relay {
    fn into_response(self) -> Response {
        match self {
            Self::Buffered {
                status,
                headers,
                body,
            } => (status, headers, Body::from(body)).into_response(),
            Self::Streaming {
                status,
                mut headers,
                body,
            } => {
                if !headers.contains_key(header::CONTENT_TYPE) {
                    headers.insert(
                        header::CONTENT_TYPE,
                        HeaderValue::from_static("text/event-stream"),
                    );
                }
                (status, headers, Body::from_stream(body)).into_response()
            },
        }
    }
}

/// Forwards requests to one upstream and records every exchange.
pub struct Forwarder {
    target_url: String,
    upstream: UpstreamClient,
    records: RecordQueue,
}

impl Forwarder {
    /// Create a forwarder for `target_url` with a default-sized record queue.
    pub fn new(
        target_url: impl Into<String>,
        timeout: Duration,
        recorder: Arc<dyn Recorder>,
    ) -> Result<Self> {
        let records = RecordQueue::new(recorder, RecordQueue::DEFAULT_MAX_PENDING);
        Self::with_queue(target_url, timeout, records)
    }

    /// Create a forwarder for `target_url` recording through `records`.
    pub fn with_queue(
        target_url: impl Into<String>,
        timeout: Duration,
        records: RecordQueue,
    ) -> Result<Self> {
        Ok(Self {
            target_url: target_url.into().trim_end_matches('/').to_string(),
            upstream: UpstreamClient::new(timeout)?,
            records,
        })
    }

    /// Queue that exchanges are recorded through.
    pub fn records(&self) -> &RecordQueue {
        &self.records
    }

    /// Upstream base URL (no trailing slash).
    pub fn target_url(&self) -> &str {
        &self.target_url
    }

    /// Upstream URL for an inbound URI: base + path + query, verbatim.
    pub fn upstream_url(&self, uri: &Uri) -> String {
        match uri.query() {
            Some(query) if !query.is_empty() => {
                format!("{}{}?{}", self.target_url, uri.path(), query)
            },
            _ => format!("{}{}", self.target_url, uri.path()),
        }
    }

    /// Forward one request.
    ///
    /// The relay mode is decided here, once, from the request body.
    pub async fn forward(
        &self,
        method: Method,
        uri: &Uri,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<Relay> {
        let started = Instant::now();
        let timestamp = Utc::now();

        let payload = Payload::classify(&body);
        let streaming = payload.wants_stream();

        let request = OutboundRequest {
            method,
            url: self.upstream_url(uri),
            headers: filter_headers(headers, HeaderDirection::Request),
            body,
        };
        let recorded = RecordedRequest {
            method: request.method.clone(),
            url: request.url.clone(),
            headers: request.headers.clone(),
            body: payload,
        };

        tracing::debug!(
            method = %recorded.method,
            url = %recorded.url,
            streaming,
            "Forwarding request"
        );

        if streaming {
            self.relay_streaming(request, recorded, timestamp, started)
                .await
        } else {
            self.relay_buffered(request, recorded, timestamp, started)
                .await
        }
    }

    async fn relay_buffered(
        &self,
        request: OutboundRequest,
        recorded: RecordedRequest,
        timestamp: DateTime<Utc>,
        started: Instant,
    ) -> Result<Relay> {
        let response = self.upstream.send(request).await?;
        let headers = filter_headers(&response.headers, HeaderDirection::Response);

        tracing::debug!(
            url = %recorded.url,
            status = response.status.as_u16(),
            bytes = response.body.len(),
            "Upstream responded"
        );

        let exchange = Exchange {
            timestamp,
            request: recorded,
            response: RecordedResponse {
                status: response.status,
                headers: headers.clone(),
                body: Payload::classify(&response.body),
            },
            streaming: false,
            complete: true,
            duration: started.elapsed(),
        };
        self.records.submit(exchange);

        Ok(Relay::Buffered {
            status: response.status,
            headers,
            body: response.body,
        })
    }

    async fn relay_streaming(
        &self,
        request: OutboundRequest,
        recorded: RecordedRequest,
        timestamp: DateTime<Utc>,
        started: Instant,
    ) -> Result<Relay> {
        let response = self.upstream.open_stream(request).await?;
        let headers = filter_headers(&response.headers, HeaderDirection::Response);

        tracing::debug!(
            url = %recorded.url,
            status = response.status.as_u16(),
            "Upstream stream opened"
        );

        let tap = StreamTap {
            records: self.records.clone(),
            pending: Some(PendingExchange {
                timestamp,
                started,
                request: recorded,
                status: response.status,
                headers: headers.clone(),
            }),
            collected: Vec::new(),
            in_flight: None,
            chunks: 0,
        };

        Ok(Relay::Streaming {
            status: response.status,
            headers,
            body: relay_chunks(response.chunks, tap),
        })
    }
}

/// Everything about a streamed exchange except its body.
struct PendingExchange {
    timestamp: DateTime<Utc>,
    started: Instant,
    request: RecordedRequest,
    status: StatusCode,
    headers: HeaderMap,
}

/// Copy of a relayed stream, owned by the relay task.
///
/// Records the exchange exactly once: when the upstream ends, or, if the
/// relay is dropped first (caller went away), as a partial exchange.
/// An upstream failure records nothing.
///
/// A chunk joins the recorded body only once the caller polls for the next
/// one, i.e. after the response body has taken it. The chunk in hand when
/// the caller goes away is left out of a partial record.
struct StreamTap {
    records: RecordQueue,
    pending: Option<PendingExchange>,
    collected: Vec<u8>,
    in_flight: Option<Bytes>,
    chunks: usize,
}

impl StreamTap {
    fn hand_off(&mut self, chunk: &Bytes) {
        self.commit();
        self.in_flight = Some(chunk.clone());
    }

    /// The previous chunk was taken by the caller.
    fn commit(&mut self) {
        if let Some(chunk) = self.in_flight.take() {
            self.collected.extend_from_slice(&chunk);
            self.chunks += 1;
        }
    }

    fn finish(&mut self) {
        self.commit();
        self.conclude(true);
    }

    fn fail(&mut self, err: &RelayError) {
        self.commit();
        if let Some(pending) = self.pending.take() {
            tracing::warn!(
                url = %pending.request.url,
                error = %err,
                chunks = self.chunks,
                bytes = self.collected.len(),
                "Upstream stream failed after relaying partial body"
            );
        }
    }

    fn conclude(&mut self, complete: bool) {
        let Some(pending) = self.pending.take() else {
            return;
        };

        let body = String::from_utf8_lossy(&self.collected).into_owned();
        let exchange = Exchange {
            timestamp: pending.timestamp,
            request: pending.request,
            response: RecordedResponse {
                status: pending.status,
                headers: pending.headers,
                body: Payload::Text(body),
            },
            streaming: true,
            complete,
            duration: pending.started.elapsed(),
        };
        self.records.submit(exchange);
    }
}

impl Drop for StreamTap {
    fn drop(&mut self) {
        if let Some(pending) = &self.pending {
            tracing::info!(
                url = %pending.request.url,
                chunks = self.chunks,
                "Client disconnected before upstream stream ended"
            );
            self.conclude(false);
        }
    }
}

/// Relay upstream chunks in order, handing each one to the tap first.
fn relay_chunks(chunks: ChunkStream, tap: StreamTap) -> RelayStream {
    Box::pin(stream::unfold(Some((chunks, tap)), |state| async move {
        let (mut chunks, mut tap) = state?;
        tap.commit();
        match chunks.next().await {
            Some(Ok(chunk)) => {
                tap.hand_off(&chunk);
                Some((Ok(chunk), Some((chunks, tap))))
            },
            Some(Err(e)) => {
                tap.fail(&e);
                Some((Err(e), None))
            },
            None => {
                tap.finish();
                None
            },
        }
    }))
}
