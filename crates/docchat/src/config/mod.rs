use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::{DocchatError, Result};

/// Environment variable overriding `upstream.base_url`
pub const ENV_UPSTREAM_URL: &str = "DOCCHAT_UPSTREAM_URL";
/// Environment variable overriding `server.allowed_origins` (comma separated)
pub const ENV_ALLOWED_ORIGINS: &str = "DOCCHAT_ALLOWED_ORIGINS";
/// Environment variable overriding `server.listen_addr`
pub const ENV_LISTEN_ADDR: &str = "DOCCHAT_LISTEN_ADDR";

/// Main configuration structure for docchat
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// HTTP / WebSocket server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Correlation session configuration
    #[serde(default)]
    pub session: SessionConfig,
    /// Generation backend configuration
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Per-connection relay behavior
    #[serde(default)]
    pub relay: RelayConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "127.0.0.1:8080")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Origins allowed to open WebSockets and upload (empty = same-origin only)
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    /// Maximum accepted upload body in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            allowed_origins: default_allowed_origins(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:5173".to_string()]
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

/// Session cookie and context expiry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Name of the cookie carrying the correlation token
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Idle lifetime of a session and its stored context, in seconds
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// How often expired contexts are swept, in seconds
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            ttl_secs: default_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_cookie_name() -> String {
    "DOCCHAT_SESSION".to_string()
}

fn default_ttl_secs() -> u64 {
    1800
}

fn default_sweep_interval_secs() -> u64 {
    60
}

/// Generation backend (Ollama-compatible) configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the backend, e.g. "http://localhost:11434"
    #[serde(default = "default_upstream_url")]
    pub base_url: String,
    /// Model name sent with every request
    #[serde(default = "default_model")]
    pub model: String,
    /// Longest silence in seconds between two reads of the response
    ///
    /// Applies to each read separately, so a generation may stream for longer
    /// than this as long as the backend keeps producing output.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Connection establishment timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_upstream_url(),
            model: default_model(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

fn default_upstream_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "llama3".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_connect_timeout_secs() -> u64 {
    10
}

/// Relay behavior for persistent connections
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Frame sent after a turn completes successfully (none by default)
    #[serde(default)]
    pub end_of_turn_marker: Option<String>,
    /// Messages that may wait behind an in-flight generation
    ///
    /// A message arriving while the queue is full is dropped and never
    /// answered. The client only learns of it if `queue_full_notice` is set.
    #[serde(default = "default_max_queued_messages")]
    pub max_queued_messages: usize,
    /// Frame sent to the client for each dropped message (none by default)
    #[serde(default)]
    pub queue_full_notice: Option<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            end_of_turn_marker: None,
            max_queued_messages: default_max_queued_messages(),
            queue_full_notice: None,
        }
    }
}

fn default_max_queued_messages() -> usize {
    8
}

impl Config {
    /// Parse a configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| DocchatError::Config(format!("Failed to parse config: {e}")))
    }

    /// Read and parse a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DocchatError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load configuration from an explicit path or the default locations
    ///
    /// Falls back to defaults when no file exists. Environment overrides are
    /// applied last and the result is validated.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => {
                tracing::info!("Loading config from: {}", path.display());
                Self::from_file(path)?
            }
            None => match default_config_paths().into_iter().find(|p| p.exists()) {
                Some(path) => {
                    tracing::info!("Loading config from: {}", path.display());
                    Self::from_file(&path)?
                }
                None => {
                    tracing::info!("No config file found, using defaults");
                    Self::default()
                }
            },
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (normally the process environment)
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_UPSTREAM_URL).filter(|v| !v.trim().is_empty()) {
            tracing::debug!("{ENV_UPSTREAM_URL} overrides upstream URL");
            self.upstream.base_url = url.trim().to_string();
        }

        if let Some(origins) = lookup(ENV_ALLOWED_ORIGINS) {
            tracing::debug!("{ENV_ALLOWED_ORIGINS} overrides allowed origins");
            self.server.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(addr) = lookup(ENV_LISTEN_ADDR).filter(|v| !v.trim().is_empty()) {
            self.server.listen_addr = addr.trim().to_string();
        }
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.upstream.base_url).map_err(|e| {
            DocchatError::Config(format!(
                "Invalid upstream URL '{}': {e}",
                self.upstream.base_url
            ))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(DocchatError::Config(format!(
                "Unsupported upstream URL scheme '{}': only http and https are allowed",
                url.scheme()
            )));
        }

        if self.upstream.model.trim().is_empty() {
            return Err(DocchatError::Config("upstream.model must not be empty".into()));
        }

        if self.session.ttl_secs == 0 {
            return Err(DocchatError::Config("session.ttl_secs must be positive".into()));
        }

        if self.session.cookie_name.is_empty()
            || !self
                .session
                .cookie_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(DocchatError::Config(format!(
                "Invalid session cookie name '{}'",
                self.session.cookie_name
            )));
        }

        Ok(())
    }
}

fn default_config_paths() -> Vec<PathBuf> {
    [
        dirs::home_dir().map(|h| h.join(".docchat").join("config.toml")),
        dirs::config_dir().map(|c| c.join("docchat").join("config.toml")),
        Some(PathBuf::from("config.toml")),
    ]
    .into_iter()
    .flatten()
    .collect()
}
