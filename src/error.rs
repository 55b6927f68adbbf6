//! relaylog error types.
//!
//! # Error Classification
//!
//! - **Transport / Timeout**: the upstream leg failed. Surfaced to the caller
//!   as a 502 / 504, never retried.
//! - **Recorder**: persisting an exchange failed. Logged for operators, never
//!   visible to the caller.
//! - **Config / Server**: startup problems.
//!
//! Body parse failures are not errors here: a body that is not JSON is kept
//! as text (see [`crate::proxy::Payload`]).

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// relaylog errors.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Upstream connection failed, was reset, or sent a malformed response.
    #[error("Upstream transport error: {0}")]
    Transport(String),

    /// Upstream did not answer (or stalled between chunks) within the limit.
    #[error("Upstream timed out after {0:?}")]
    Timeout(Duration),

    /// Exchange could not be persisted.
    #[error("Recorder error: {0}")]
    Recorder(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// Server-side error (bind, serve).
    #[error("Server error: {0}")]
    Server(String),

    /// YAML serialization/deserialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yml::Error),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for relaylog operations
pub type Result<T> = std::result::Result<T, RelayError>;

impl RelayError {
    /// Status code reported to the caller when this error ends an exchange.
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            RelayError::Transport(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            Json(json!({
                "error": {
                    "message": self.to_string(),
                    "type": "proxy_error"
                }
            })),
        )
            .into_response()
    }
}

impl From<toml::de::Error> for RelayError {
    fn from(err: toml::de::Error) -> Self {
        RelayError::Config(format!("Failed to parse config: {err}"))
    }
}

/// Flatten an error and its sources into one line.
///
/// reqwest's top-level message ("error sending request") hides the useful
/// part (connection refused, reset by peer) in the source chain.
pub(crate) fn describe_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
