use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use twelf::{Layer, config};

use crate::api_client::DEFAULT_BASE_URL;

const DEFAULT_CONFIG_FILE: &str = "savoa.yaml";
const DEFAULT_DB_CONNECTION_STRING: &str = "sqlite://savoa.sqlite?mode=rwc";
const ENV_PREFIX: &str = "SAVOA_";

/// Runtime settings. Layered as: optional YAML file (`savoa.yaml`, or the
/// path in `SAVOA_CONFIG`), then `SAVOA_*` environment variables.
#[config]
#[derive(Debug, Clone)]
pub struct Config {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_db_connection_string")]
    pub db_connection_string: String,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Credentials used when no session token is stored.
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_api_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_db_connection_string() -> String {
    DEFAULT_DB_CONNECTION_STRING.to_string()
}

fn default_heartbeat_interval_secs() -> u64 {
    crate::progress::DEFAULT_HEARTBEAT_INTERVAL.as_secs()
}

fn default_request_timeout_secs() -> u64 {
    20
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_base_url: default_api_base_url(),
            db_connection_string: default_db_connection_string(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            login: None,
            password: None,
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("SAVOA_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        let mut layers = Vec::with_capacity(2);
        if path.exists() {
            tracing::debug!(path = %path.display(), "loading config file");
            layers.push(Layer::Yaml(path));
        }
        layers.push(Layer::Env(Some(ENV_PREFIX.to_string())));
        Config::with_layers(&layers).with_context(|| "Failed to load configuration")
    }

    pub fn validate(&self) -> Result<(), String> {
        let url = self.api_base_url.trim();
        if url.is_empty() {
            return Err("SAVOA_API_BASE_URL is missing".into());
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(format!("SAVOA_API_BASE_URL is not an http(s) URL: {}", url));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err("SAVOA_HEARTBEAT_INTERVAL_SECS must be positive".into());
        }
        if self.request_timeout_secs == 0 {
            return Err("SAVOA_REQUEST_TIMEOUT_SECS must be positive".into());
        }
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Both login and password, when configured and non-empty.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let login = self.login.as_deref().filter(|s| !s.is_empty())?;
        let password = self.password.as_deref().filter(|s| !s.is_empty())?;
        Some((login, password))
    }
}
