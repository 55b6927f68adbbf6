//! Recording relay to a single upstream API.
//!
//! Every request, whatever its method or path, is forwarded to the
//! configured upstream. The response is relayed back either buffered or as
//! a stream, and the exchange is handed to a recorder.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         relaylog                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  Client ──> Header ──> Payload ──────> Upstream ──────>      │
//! │             Filter     classify        Client                │
//! │                           │               │                  │
//! │                    wants_stream?          v                  │
//! │                                     ┌──────────┐             │
//! │                                     │ Upstream │             │
//! │                                     │   API    │             │
//! │                                     └──────────┘             │
//! │                                           │                  │
//! │  Client <── Header <── buffered body ─────┤                  │
//! │             Filter  or chunk-by-chunk ────┘                  │
//! │                           │                                  │
//! │                           v                                  │
//! │                       Recorder (background)                  │
//! │                                                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use relaylog::config::ProxyConfig;
//! use relaylog::proxy::ProxyServer;
//! use relaylog::recorder::YamlRecorder;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ProxyConfig {
//!         target_url: Some("https://api.openai.com".to_string()),
//!         ..Default::default()
//!     };
//!
//!     let server = ProxyServer::new(config, Arc::new(YamlRecorder::new("logs"))).unwrap();
//!     server.run().await.unwrap();
//! }
//! ```
//!
//! # Streaming
//!
//! A request is streamed back only when its body is a JSON object with
//! `"stream": true`. Headers and query strings never select the mode.
//!
//! # Client Configuration
//!
//! Point any OpenAI-style client at the relay:
//!
//! ```python
//! from openai import OpenAI
//!
//! client = OpenAI(base_url="http://localhost:8000/v1", api_key="sk-...")
//! ```

mod forwarder;
mod headers;
mod payload;
mod server;
mod upstream;

pub use forwarder::{Forwarder, Relay, RelayStream};
pub use headers::{
    filter_headers, HeaderDirection, EXCLUDED_REQUEST_HEADERS, EXCLUDED_RESPONSE_HEADERS,
};
pub use payload::Payload;
pub use server::{ProxyServer, RECORD_DRAIN_LIMIT};
pub use upstream::{
    BufferedResponse, ChunkStream, OutboundRequest, StreamingResponse, UpstreamClient,
};
