//! Upstream HTTP client.
//!
//! Two modes, picked per exchange by the forwarder:
//!
//! - [`UpstreamClient::send`] waits for the whole response. The timeout
//!   covers the entire call.
//! - [`UpstreamClient::open_stream`] returns as soon as the status line and
//!   headers arrive and hands back a single-pass chunk stream. The timeout
//!   covers time to headers and then each gap between chunks.
//!
//! Dropping a [`ChunkStream`] before it ends closes the upstream connection.

use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use http::{header, HeaderMap, Method, StatusCode};
use reqwest::Client;

use crate::error::{describe_chain, RelayError, Result};

/// Live sequence of upstream body chunks.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// A request ready to go upstream.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    /// HTTP method
    pub method: Method,
    /// Absolute upstream URL
    pub url: String,
    /// Headers to send (already filtered)
    pub headers: HeaderMap,
    /// Body bytes, sent verbatim; empty means no body
    pub body: Bytes,
}

/// A fully read upstream response.
#[derive(Debug, Clone)]
pub struct BufferedResponse {
    /// Status code
    pub status: StatusCode,
    /// Raw upstream headers
    pub headers: HeaderMap,
    /// Complete (decompressed) body
    pub body: Bytes,
}

/// An upstream response whose body is still arriving.
pub struct StreamingResponse {
    /// Status code
    pub status: StatusCode,
    /// Raw upstream headers
    pub headers: HeaderMap,
    /// Body chunks in arrival order
    pub chunks: ChunkStream,
}

impl std::fmt::Debug for StreamingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// HTTP client for the fixed upstream.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: Client,
    timeout: Duration,
}

impl UpstreamClient {
    /// Create a client with the given timeout ceiling.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| RelayError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, timeout })
    }

    /// Timeout ceiling for this client.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Buffered mode: send and read the whole body.
    pub async fn send(&self, request: OutboundRequest) -> Result<BufferedResponse> {
        let response = self
            .build(request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(&e))?;

        Ok(BufferedResponse {
            status,
            headers,
            body,
        })
    }

    /// Streaming mode: return once headers are in, body still pending.
    pub async fn open_stream(&self, request: OutboundRequest) -> Result<StreamingResponse> {
        let response = tokio::time::timeout(self.timeout, self.build(request).send())
            .await
            .map_err(|_| RelayError::Timeout(self.timeout))?
            .map_err(|e| self.transport_error(&e))?;

        let status = response.status();
        let headers = response.headers().clone();
        let chunks = with_idle_timeout(response.bytes_stream(), self.timeout);

        Ok(StreamingResponse {
            status,
            headers,
            chunks,
        })
    }

    fn build(&self, request: OutboundRequest) -> reqwest::RequestBuilder {
        // Compression is negotiated (and decoded) by reqwest itself; a
        // forwarded Accept-Encoding would turn that off and leak encoded
        // bytes past the stripped Content-Encoding header.
        let mut headers = request.headers;
        headers.remove(header::ACCEPT_ENCODING);

        let mut builder = self.client.request(request.method, &request.url).headers(headers);
        if !request.body.is_empty() {
            builder = builder.body(request.body);
        }
        builder
    }

    fn transport_error(&self, err: &reqwest::Error) -> RelayError {
        if err.is_timeout() {
            RelayError::Timeout(self.timeout)
        } else {
            RelayError::Transport(describe_chain(err))
        }
    }
}

/// Fail the stream if no chunk arrives within `limit`.
fn with_idle_timeout<S>(chunks: S, limit: Duration) -> ChunkStream
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    Box::pin(stream::unfold(Some(Box::pin(chunks)), move |state| async move {
        let mut chunks = state?;
        match tokio::time::timeout(limit, chunks.next()).await {
            Ok(Some(Ok(chunk))) => Some((Ok(chunk), Some(chunks))),
            Ok(Some(Err(e))) => Some((Err(RelayError::Transport(describe_chain(&e))), None)),
            Ok(None) => None,
            Err(_) => Some((Err(RelayError::Timeout(limit)), None)),
        }
    }))
}
