use crate::group::ToolGroup;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub toolgroups: Vec<ToolGroup>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8321".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn with_env_overrides(&self) -> Self {
        let bind_addr = env::var("BROKER_BIND_ADDR").unwrap_or_else(|_| self.bind_addr.clone());
        Self { bind_addr }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Upper bound for a single request/response round trip.
    pub request_timeout_ms: u64,
    /// Upper bound for waiting on a terminal streaming event.
    pub stream_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
            stream_timeout_ms: 60_000,
        }
    }
}

impl TransportConfig {
    pub fn with_env_overrides(&self) -> Self {
        let request_timeout_ms = env_millis("BROKER_REQUEST_TIMEOUT_MS")
            .unwrap_or(self.request_timeout_ms);
        let stream_timeout_ms =
            env_millis("BROKER_STREAM_TIMEOUT_MS").unwrap_or(self.stream_timeout_ms);
        Self {
            request_timeout_ms,
            stream_timeout_ms,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_timeout_ms)
    }
}

fn env_millis(key: &str) -> Option<u64> {
    let raw = env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring non-numeric timeout override");
            None
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn load_from_env() -> anyhow::Result<Self> {
        let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| Self::default_config_path());
        Self::load(Path::new(&config_path))
    }

    pub fn default_config_path() -> String {
        "./config.toml".to_string()
    }

    pub fn with_env_overrides(&self) -> Self {
        Self {
            server: self.server.with_env_overrides(),
            transport: self.transport.with_env_overrides(),
            toolgroups: self.toolgroups.clone(),
        }
    }
}
