//! One YAML file per exchange.
//!
//! Files are named `<YYYYmmdd_HHMMSS_micros>_<8 hex>.yaml`, so a plain
//! lexical sort is a chronological sort.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::redact::{obfuscate_headers, redact_url, redact_value};
use super::Recorder;
use crate::error::{RelayError, Result};
use crate::exchange::Exchange;

/// On-disk form of an exchange.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    /// When the request was received
    pub timestamp: DateTime<Utc>,
    /// Request half
    pub request: RequestEntry,
    /// Response half
    pub response: ResponseEntry,
    /// Wall time of the exchange
    #[serde(default)]
    pub duration_ms: u64,
}

/// On-disk request half.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestEntry {
    /// HTTP method
    pub method: String,
    /// Upstream URL, sensitive query parameters masked
    pub url: String,
    /// Headers, credentials masked
    pub headers: serde_json::Map<String, Value>,
    /// `null`, text, or structured body
    pub body: Value,
}

/// On-disk response half.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseEntry {
    /// Status code
    pub status: u16,
    /// Headers as returned to the caller
    pub headers: serde_json::Map<String, Value>,
    /// `null`, text, or structured body
    pub body: Value,
    /// Relayed as a stream
    pub is_streaming: bool,
    /// False for a stream the caller abandoned
    #[serde(default = "default_complete")]
    pub complete: bool,
}

fn default_complete() -> bool {
    true
}

fn header_map(headers: &http::HeaderMap) -> serde_json::Map<String, Value> {
    obfuscate_headers(headers)
        .into_iter()
        .map(|(name, value)| (name, Value::String(value)))
        .collect()
}

impl LogEntry {
    /// Build the persisted form, masking credentials.
    pub fn from_exchange(exchange: &Exchange) -> Self {
        Self {
            timestamp: exchange.timestamp,
            request: RequestEntry {
                method: exchange.request.method.to_string(),
                url: redact_url(&exchange.request.url),
                headers: header_map(&exchange.request.headers),
                body: redact_value(exchange.request.body.clone().into_value()),
            },
            response: ResponseEntry {
                status: exchange.response.status.as_u16(),
                headers: header_map(&exchange.response.headers),
                body: redact_value(exchange.response.body.clone().into_value()),
                is_streaming: exchange.streaming,
                complete: exchange.complete,
            },
            duration_ms: exchange.duration_ms(),
        }
    }
}

/// A log entry read back from disk.
#[derive(Debug, Clone)]
pub struct StoredEntry {
    /// File name within the log directory
    pub file_name: String,
    /// Parsed entry
    pub entry: LogEntry,
}

/// Writes each exchange to its own YAML file.
#[derive(Debug, Clone)]
pub struct YamlRecorder {
    dir: PathBuf,
}

impl YamlRecorder {
    /// Record into `dir` (created on first write).
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Log directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for an exchange received at `timestamp`.
    pub fn file_name(timestamp: &DateTime<Utc>) -> String {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!("{}_{}.yaml", timestamp.format("%Y%m%d_%H%M%S_%6f"), &suffix[..8])
    }

    async fn write(&self, exchange: &Exchange) -> Result<String> {
        let yaml = serde_yml::to_string(&LogEntry::from_exchange(exchange))?;

        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            RelayError::Recorder(format!("Failed to create {}: {e}", self.dir.display()))
        })?;

        let path = self.dir.join(Self::file_name(&exchange.timestamp));
        tokio::fs::write(&path, yaml)
            .await
            .map_err(|e| RelayError::Recorder(format!("Failed to write {}: {e}", path.display())))?;

        Ok(path.display().to_string())
    }

    /// Most recent entries, newest first.
    ///
    /// Files that cannot be read or parsed are skipped. A missing directory
    /// yields an empty list.
    pub fn recent(&self, limit: usize) -> Result<Vec<StoredEntry>> {
        let dir = match std::fs::read_dir(&self.dir) {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names: Vec<String> = dir
            .filter_map(std::result::Result::ok)
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.ends_with(".yaml"))
            .collect();
        names.sort_unstable_by(|a, b| b.cmp(a));

        let mut entries = Vec::with_capacity(limit.min(names.len()));
        for file_name in names {
            if entries.len() == limit {
                break;
            }

            let path = self.dir.join(&file_name);
            let parsed = std::fs::read_to_string(&path)
                .map_err(RelayError::from)
                .and_then(|text| serde_yml::from_str::<LogEntry>(&text).map_err(RelayError::from));

            match parsed {
                Ok(entry) => entries.push(StoredEntry { file_name, entry }),
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "Skipping unreadable log entry");
                },
            }
        }

        Ok(entries)
    }
}

impl Recorder for YamlRecorder {
    fn record<'a>(
        &'a self,
        exchange: &'a Exchange,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(self.write(exchange))
    }

    fn name(&self) -> &'static str {
        "yaml"
    }
}
