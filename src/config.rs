//! Configuration management for the rtun client.
//!
//! Handles loading and saving the config file (`config.toml` in the platform
//! config directory) and resolving the runtime [`Settings`] every component
//! reads from.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use http::HeaderValue;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::ClientError;

pub const DEFAULT_LOCAL_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_SERVER_ADDR: &str = "localhost:8443";
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_STATUS_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_FATAL_SIGNATURE: &str = "token not valid";

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    pub token: Option<String>,
    pub server: Option<String>,
    pub api: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    pub local: Option<String>,
    pub tls: Option<bool>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }

    pub fn config_path() -> Result<PathBuf> {
        let proj_dirs =
            ProjectDirs::from("", "", "rtun").context("Could not determine config directory")?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }
}

/// Resolved settings, immutable for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Local service that tunnels are bridged to
    pub local_addr: String,
    /// Relay server `host:port` for the control channel
    pub server_addr: String,
    pub token: String,
    pub tls: bool,
    /// Base URL of the status backend
    pub api_url: String,
    pub retry_delay: Duration,
    pub status_interval: Duration,
    /// Error text that marks a rejected token; stops reconnecting
    pub fatal_signature: String,
}

impl Settings {
    pub fn new(server_addr: &str, token: &str) -> Self {
        Self {
            local_addr: DEFAULT_LOCAL_ADDR.to_string(),
            server_addr: server_addr.to_string(),
            token: token.to_string(),
            tls: true,
            api_url: default_api_url(server_addr),
            retry_delay: DEFAULT_RETRY_DELAY,
            status_interval: DEFAULT_STATUS_INTERVAL,
            fatal_signature: DEFAULT_FATAL_SIGNATURE.to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        if self.token.trim().is_empty() {
            return Err(ClientError::Config("token must not be empty".to_string()));
        }
        self.token_header()?;
        self.control_url().map_err(|e| {
            ClientError::Config(format!("invalid server address {}: {}", self.server_addr, e))
        })?;
        Ok(())
    }

    /// Token as sent in the control channel upgrade request
    pub fn token_header(&self) -> Result<HeaderValue, ClientError> {
        HeaderValue::from_str(&self.token).map_err(|_| {
            ClientError::Config("token contains characters not allowed in a header".to_string())
        })
    }

    pub fn control_url(&self) -> Result<Url, ClientError> {
        let scheme = if self.tls { "wss" } else { "ws" };
        Ok(Url::parse(&format!(
            "{}://{}/tunnel/ws",
            scheme, self.server_addr
        ))?)
    }
}

/// The status backend lives on the relay host unless configured otherwise.
pub fn default_api_url(server_addr: &str) -> String {
    let host = server_addr
        .rsplit_once(':')
        .map(|(host, _)| host)
        .unwrap_or(server_addr);
    format!("https://{}", host)
}
