//! Configuration management for fleet-probe.
//!
//! Handles loading configuration from TOML files and environment variables.
//! The loaded [`Config`] is passed explicitly to the query client; nothing is
//! kept in process-wide state.

use crate::error::{FleetError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use url::Url;

/// Main configuration structure for fleet-probe.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Fleet server connection settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Result stream settings.
    #[serde(default)]
    pub results: ResultsConfig,
}

/// Fleet server connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the Fleet server (e.g., "https://fleet.example.com:8080").
    pub url: Option<String>,

    /// Path prefix of the REST and WebSocket API.
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,

    /// Login user.
    pub username: Option<String>,

    /// Login password (prefer FLEET_PASSWORD over storing it here).
    pub password: Option<String>,

    /// Skip TLS certificate verification. Never enabled implicitly.
    #[serde(default)]
    pub accept_invalid_certs: bool,

    /// Per-request timeout for REST calls.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Page size for the host listing; unset fetches the listing in one request.
    pub hosts_per_page: Option<u32>,
}

fn default_api_prefix() -> String {
    "/api/v1/kolide".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_prefix: default_api_prefix(),
            username: None,
            password: None,
            accept_invalid_certs: false,
            request_timeout_secs: default_request_timeout(),
            hosts_per_page: None,
        }
    }
}

/// How the collector picks the payload message out of the result stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadRuleKind {
    /// Skip a fixed number of framing messages and read the next one.
    #[default]
    Offset,
    /// Ignore framing/status kinds and read the first `result` message.
    Classified,
}

/// Result stream settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsConfig {
    #[serde(default)]
    pub rule: PayloadRuleKind,

    /// Messages skipped before the payload under the offset rule.
    #[serde(default = "default_framing_messages")]
    pub framing_messages: usize,

    /// Upper bound on messages read before giving up (classified rule).
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,

    /// Deadline for the whole collection, connect included.
    #[serde(default = "default_results_timeout")]
    pub timeout_secs: u64,
}

fn default_framing_messages() -> usize {
    2
}

fn default_max_messages() -> usize {
    16
}

fn default_results_timeout() -> u64 {
    60
}

impl Default for ResultsConfig {
    fn default() -> Self {
        Self {
            rule: PayloadRuleKind::default(),
            framing_messages: default_framing_messages(),
            max_messages: default_max_messages(),
            timeout_secs: default_results_timeout(),
        }
    }
}

impl ResultsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ServerConfig {
    /// Applies environment variables (FLEET_URL, FLEET_USERNAME, FLEET_PASSWORD) as defaults.
    pub fn apply_env_defaults(&mut self) {
        if self.url.is_none() {
            self.url = std::env::var("FLEET_URL").ok();
        }
        if self.username.is_none() {
            self.username = std::env::var("FLEET_USERNAME").ok();
        }
        if self.password.is_none() {
            self.password = std::env::var("FLEET_PASSWORD").ok();
        }
    }

    /// Merges another config into this one, with the other taking precedence.
    pub fn merge(&mut self, other: &ServerConfig) {
        if other.url.is_some() {
            self.url = other.url.clone();
        }
        if other.username.is_some() {
            self.username = other.username.clone();
        }
        if other.password.is_some() {
            self.password = other.password.clone();
        }
        if other.accept_invalid_certs {
            self.accept_invalid_certs = true;
        }
    }

    /// Parses and validates the server URL.
    ///
    /// Only `http` and `https` are accepted; the WebSocket scheme is derived from it.
    pub fn base_url(&self) -> Result<Url> {
        let raw = self
            .url
            .as_deref()
            .ok_or_else(|| FleetError::config("Fleet server URL is required (set FLEET_URL)"))?;

        let url = Url::parse(raw)
            .map_err(|e| FleetError::config(format!("Invalid server URL '{raw}': {e}")))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(FleetError::config(format!(
                "Invalid scheme '{}'. Expected 'http' or 'https'",
                url.scheme()
            )));
        }
        if url.host_str().is_none() {
            return Err(FleetError::config(format!("Server URL '{raw}' has no host")));
        }

        Ok(url)
    }

    /// Returns the login credentials, failing if either half is missing.
    pub fn credentials(&self) -> Result<Credentials> {
        let username = self
            .username
            .clone()
            .ok_or_else(|| FleetError::config("Fleet username is required (set FLEET_USERNAME)"))?;
        let password = self
            .password
            .clone()
            .ok_or_else(|| FleetError::config("Fleet password is required (set FLEET_PASSWORD)"))?;

        Ok(Credentials { username, password })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Returns a display-safe string (no credentials) for log output.
    pub fn display_string(&self) -> String {
        let url = self.url.as_deref().unwrap_or("<unset>");
        match &self.username {
            Some(user) => format!("{user} @ {url}"),
            None => url.to_string(),
        }
    }
}

/// Login credentials for the Fleet API.
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fleet-probe")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| FleetError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            FleetError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }
}
