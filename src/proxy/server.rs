//! HTTP front end for the relay.
//!
//! A single fallback handler receives every method on every path, so the
//! router has no routes of its own that could shadow an upstream endpoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, Method, Uri},
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use super::forwarder::Forwarder;
use crate::config::ProxyConfig;
use crate::error::{RelayError, Result};
use crate::recorder::{RecordQueue, Recorder};

/// How long shutdown waits for exchanges still being recorded.
pub const RECORD_DRAIN_LIMIT: Duration = Duration::from_secs(10);

/// Relay server
pub struct ProxyServer {
    config: ProxyConfig,
    forwarder: Arc<Forwarder>,
}

impl ProxyServer {
    /// Create a server for `config`, recording through `recorder`.
    pub fn new(config: ProxyConfig, recorder: Arc<dyn Recorder>) -> Result<Self> {
        Self::with_queue(
            config,
            RecordQueue::new(recorder, RecordQueue::DEFAULT_MAX_PENDING),
        )
    }

    /// Create a server for `config`, recording through `records`.
    pub fn with_queue(config: ProxyConfig, records: RecordQueue) -> Result<Self> {
        let target_url = config
            .target_url
            .clone()
            .ok_or_else(|| RelayError::Config("target_url is not set".to_string()))?;

        let forwarder = Forwarder::with_queue(
            target_url,
            Duration::from_secs(config.timeout_secs),
            records,
        )?;

        Ok(Self {
            config,
            forwarder: Arc::new(forwarder),
        })
    }

    /// The forwarder behind this server.
    pub fn forwarder(&self) -> &Arc<Forwarder> {
        &self.forwarder
    }

    /// Get the router for the relay
    pub fn router(&self) -> Router {
        Router::new()
            .fallback(forward_handler)
            .layer(DefaultBodyLimit::max(self.config.max_body_size))
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::clone(&self.forwarder))
    }

    /// Bind the configured address and serve until Ctrl-C.
    pub async fn run(&self) -> Result<()> {
        let addr: SocketAddr = self
            .config
            .listen_addr()
            .parse()
            .map_err(|e| RelayError::Config(format!("Invalid listen address: {e}")))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RelayError::Server(format!("Failed to bind {addr}: {e}")))?;

        self.serve(listener).await
    }

    /// Serve on an already bound listener until Ctrl-C.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        self.serve_with_shutdown(listener, shutdown_signal()).await
    }

    /// Serve until `signal` completes, then finish open connections and
    /// wait (up to [`RECORD_DRAIN_LIMIT`]) for pending exchange writes.
    pub async fn serve_with_shutdown<F>(&self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!("relaylog listening on http://{}", addr);
        tracing::info!("Upstream: {}", self.forwarder.target_url());

        let served = axum::serve(listener, self.router())
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| RelayError::Server(format!("Server error: {e}")));

        let records = self.forwarder.records();
        if records.pending() > 0 {
            tracing::info!(pending = records.pending(), "Waiting for exchanges to be recorded");
        }
        records.drain(RECORD_DRAIN_LIMIT).await;

        served?;
        tracing::info!("relaylog stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Forward any request; upstream failures become 502/504.
async fn forward_handler(
    State(forwarder): State<Arc<Forwarder>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match forwarder.forward(method.clone(), &uri, &headers, body).await {
        Ok(relay) => relay.into_response(),
        Err(e) => {
            tracing::warn!(method = %method, uri = %uri, error = %e, "Forwarding failed");
            e.into_response()
        },
    }
}
