//! # relaylog - Recording HTTP Relay
//!
//! Forwards every request it receives to one upstream API and relays the
//! response back unchanged, buffered or streamed, while recording each
//! request/response exchange for later inspection.
//!
//! ## Features
//!
//! - **Transparent forwarding**: any method, any path, query string verbatim
//! - **Dual-mode relay**: buffered responses byte-for-byte, `"stream": true`
//!   requests relayed chunk by chunk as they arrive
//! - **Exchange recording**: one YAML file per exchange, credentials masked
//! - **Hop-by-hop filtering**: framing headers recomputed on each leg
//!
//! ### Architecture
//!
//! ```text
//! Client App            relaylog                 Upstream API
//!     |                     |                          |
//!     |-- any request ----->|                          |
//!     |                     |-- same method/path ----->|
//!     |                     |<-- status + headers -----|
//!     |<-- status/headers --|                          |
//!     |<-- body (or chunks)-|<-- body (or chunks) -----|
//!     |                     |                          |
//!     |                     |-- record(exchange) --> logs/*.yaml
//! ```
//!
//! ### Exchange Lifecycle
//!
//! ```text
//!  Received ─> BodyRead ─> ModeDecided ─┬─> Buffering ─> Forwarding ─────────┬─> Recorded
//!                                       └─> HeadersReceived ─> Relaying(*) ──┘
//!                                                    │
//!                                       (any stage) └─> Failed(transport)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use relaylog::{Config, ProxyServer, YamlRecorder};
//!
//! let config = Config::load(None)?.apply_env();
//! config.validate()?;
//!
//! let recorder = Arc::new(YamlRecorder::new(&config.recorder.log_dir));
//! let server = ProxyServer::new(config.proxy, recorder)?;
//! server.run().await?;
//! ```
//!
//! ### Embedding the Forwarder
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use relaylog::{proxy::Forwarder, recorder::ChannelRecorder};
//!
//! let (recorder, mut exchanges) = ChannelRecorder::new();
//! let forwarder = Forwarder::new("https://api.openai.com", Duration::from_secs(120), Arc::new(recorder))?;
//!
//! let relay = forwarder.forward(method, &uri, &headers, body).await?;
//! // ... hand `relay` to the caller, then:
//! let exchange = exchanges.recv().await;
//! ```
//!
//! ## Modules
//!
//! - [`proxy`]: forwarder, header filter, upstream client, HTTP front end
//! - [`recorder`]: exchange persistence and credential masking
//! - [`exchange`]: the recorded request/response pair
//! - [`config`]: configuration management
//! - [`error`]: error types and result aliases

pub mod config;
pub mod error;
pub mod exchange;
pub mod proxy;
pub mod recorder;

// Re-exports for convenience
pub use config::Config;
pub use error::{RelayError, Result};
pub use exchange::{Exchange, RecordedRequest, RecordedResponse};
pub use proxy::{Forwarder, Payload, ProxyServer, Relay};
pub use recorder::{ChannelRecorder, NullRecorder, RecordQueue, Recorder, YamlRecorder};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
