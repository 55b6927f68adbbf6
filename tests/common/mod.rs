//! Shared fixtures for end-to-end tests.
//!
//! Each test runs a throwaway upstream (plain axum) and a relay pointed at
//! it, both on ephemeral ports.

#![allow(dead_code)]

use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use flate2::{write::GzEncoder, Compression};
use futures::stream::{self, StreamExt};
use relaylog::config::ProxyConfig;
use relaylog::recorder::{ChannelRecorder, Recorder};
use relaylog::{Exchange, ProxyServer};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// Upstream test routes.
///
/// - `POST /v1/chat/completions`: `{"ok":true}`, or chunks `a`,`b`,`c`
///   when the body asks for `"stream": true`
/// - `GET /reset`: one chunk, then the connection breaks
/// - `GET /ticks`: a chunk every 50ms, effectively forever
/// - `GET /slow`: answers after 3s
/// - `GET /raw`: [`RAW_BODY`], byte for byte
/// - `GET /gzip`: `{ "ae" : "<accept-encoding received>" }`, gzip-encoded
/// - anything else: echoes method, path, query, headers and body as JSON
pub fn upstream_router() -> Router {
    Router::new()
        .route("/v1/chat/completions", post(chat))
        .route("/reset", get(reset))
        .route("/ticks", get(ticks))
        .route("/slow", get(slow))
        .route("/raw", get(raw))
        .route("/gzip", get(gzipped))
        .fallback(echo)
}

async fn chat(body: Bytes) -> Response {
    let wants_stream = serde_json::from_slice::<Value>(&body)
        .map(|v| v["stream"] == json!(true))
        .unwrap_or(false);

    if !wants_stream {
        return Json(json!({"ok": true})).into_response();
    }

    let chunks = stream::iter(["a", "b", "c"]).then(|chunk| async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok::<_, std::io::Error>(Bytes::from_static(chunk.as_bytes()))
    });

    (
        StatusCode::OK,
        [("content-type", "text/event-stream"), ("x-upstream", "chat")],
        Body::from_stream(chunks),
    )
        .into_response()
}

async fn reset() -> Response {
    let chunks = stream::iter(0..2).then(|i| async move {
        if i == 0 {
            Ok(Bytes::from_static(b"a"))
        } else {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "upstream went away",
            ))
        }
    });
    Body::from_stream(chunks).into_response()
}

async fn ticks() -> Response {
    let chunks = stream::iter(0..1000).then(|i| async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok::<_, std::io::Error>(Bytes::from(format!("tick {i}\n")))
    });
    Body::from_stream(chunks).into_response()
}

async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_secs(3)).await;
    "too late"
}

/// JSON that re-serialization would change (spacing, key order, escapes).
pub const RAW_BODY: &str = "{ \"zeta\" : 1,\n  \"alpha\" : [ 1 , 2.50 ], \"s\" : \"caf\\u00e9\" }";

async fn raw() -> Response {
    ([("content-type", "application/json")], RAW_BODY).into_response()
}

/// Body the `/gzip` route sends (before compression) for `accept_encoding`.
pub fn gzip_body(accept_encoding: &str) -> String {
    format!("{{ \"ae\" : \"{accept_encoding}\" }}")
}

async fn gzipped(headers: HeaderMap) -> Response {
    let accept_encoding = headers
        .get("accept-encoding")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("none")
        .to_string();

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(gzip_body(&accept_encoding).as_bytes())
        .unwrap();
    let compressed = encoder.finish().unwrap();

    (
        [
            ("content-type", "application/json"),
            ("content-encoding", "gzip"),
        ],
        compressed,
    )
        .into_response()
}

async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Json<Value> {
    let headers: serde_json::Map<String, Value> = headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                Value::String(value.to_str().unwrap_or_default().to_string()),
            )
        })
        .collect();

    Json(json!({
        "method": method.as_str(),
        "path": uri.path(),
        "query": uri.query(),
        "headers": headers,
        "body": String::from_utf8_lossy(&body),
    }))
}

/// Serve `router` on an ephemeral port.
pub async fn spawn_upstream(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

/// Start a relay for `target` recording through `recorder`.
pub async fn spawn_relay_with(
    target: &str,
    timeout_secs: u64,
    recorder: Arc<dyn Recorder>,
) -> SocketAddr {
    let config = ProxyConfig {
        target_url: Some(target.to_string()),
        timeout_secs,
        ..Default::default()
    };
    let server = ProxyServer::new(config, recorder).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = server.serve(listener).await;
    });
    addr
}

/// Start a relay for `target` and return the channel its exchanges land on.
pub async fn spawn_relay(target: &str) -> (SocketAddr, mpsc::UnboundedReceiver<Exchange>) {
    let (recorder, rx) = ChannelRecorder::new();
    let addr = spawn_relay_with(target, 5, Arc::new(recorder)).await;
    (addr, rx)
}

/// Wait up to `limit` for the next recorded exchange.
pub async fn next_exchange(
    rx: &mut mpsc::UnboundedReceiver<Exchange>,
    limit: Duration,
) -> Option<Exchange> {
    tokio::time::timeout(limit, rx.recv()).await.ok().flatten()
}
