//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files
//! - Environment variables (a `.env` file is loaded by the binary)
//! - CLI arguments (applied last, by the binary)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Relay configuration
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Exchange recording configuration
    #[serde(default)]
    pub recorder: RecorderConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            RelayError::Config(format!("Failed to read config file {}: {e}", path.display()))
        })?;

        Ok(toml::from_str(&content)?)
    }

    /// Default config file location (`<config dir>/relaylog/config.toml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("relaylog").join("config.toml"))
    }

    /// Load from `path`, or from the default location if a file exists there,
    /// or fall back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path().filter(|p| p.is_file()) {
                Some(path) => Self::from_file(path),
                None => Ok(Self::default()),
            },
        }
    }

    /// Overlay values from the process environment
    pub fn apply_env(self) -> Self {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    /// Overlay values from an arbitrary variable source.
    ///
    /// Unparseable numbers and booleans are ignored.
    pub fn apply_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(target) = var("TARGET_URL") {
            self.proxy.target_url = Some(target);
        }
        if let Some(host) = var("RELAYLOG_HOST") {
            self.proxy.host = host;
        }
        if let Some(port) = var("RELAYLOG_PORT").and_then(|v| v.parse().ok()) {
            self.proxy.port = port;
        }
        if let Some(timeout) = var("RELAYLOG_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.proxy.timeout_secs = timeout;
        }
        if let Some(dir) = var("RELAYLOG_LOG_DIR") {
            self.recorder.log_dir = PathBuf::from(dir);
        }
        if let Some(enabled) = var("RELAYLOG_RECORD").and_then(|v| parse_flag(&v)) {
            self.recorder.enabled = enabled;
        }

        self
    }

    /// Check that the configuration can start a relay
    pub fn validate(&self) -> Result<()> {
        let Some(target) = self.proxy.target_url.as_deref() else {
            return Err(RelayError::Config(
                "target_url is not set (use --target, TARGET_URL, or [proxy] target_url)"
                    .to_string(),
            ));
        };

        if !(target.starts_with("http://") || target.starts_with("https://")) {
            return Err(RelayError::Config(format!(
                "target_url must be an http:// or https:// URL, got {target:?}"
            )));
        }

        if self.proxy.timeout_secs == 0 {
            return Err(RelayError::Config("timeout_secs must be positive".to_string()));
        }

        if self.recorder.max_pending == 0 {
            return Err(RelayError::Config("max_pending must be positive".to_string()));
        }

        Ok(())
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Upstream API base URL (e.g., https://api.openai.com)
    pub target_url: Option<String>,

    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Upstream timeout in seconds
    pub timeout_secs: u64,

    /// Maximum inbound request body size in bytes
    pub max_body_size: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            target_url: None,
            host: "127.0.0.1".to_string(),
            port: 8000,
            timeout_secs: 120,
            max_body_size: 10 * 1024 * 1024, // 10 MB
        }
    }
}

impl ProxyConfig {
    /// Get the full listen address
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Exchange recording configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Record exchanges at all
    pub enabled: bool,

    /// Directory for YAML exchange files
    pub log_dir: PathBuf,

    /// Exchange writes allowed in flight before new ones are dropped
    pub max_pending: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_dir: PathBuf::from("logs"),
            max_pending: 1024,
        }
    }
}
