//! Relay configuration: defaults, TOML file and `COZE_RELAY__*` environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use coze_cli::{paths, settings};
use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "coze-relay";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub logging: LoggingConfig,
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub cors: CorsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// Coze chat API connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// API base URL (e.g., "https://api.coze.cn").
    pub base_url: String,
    /// Personal access token. Prefer `COZE_RELAY__UPSTREAM__TOKEN` over the file.
    pub token: Option<String>,
    pub connect_timeout_secs: u64,
    /// Longest silence tolerated between two upstream events.
    pub idle_timeout_secs: u64,
    /// Upper bound for a whole streamed answer.
    pub request_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.coze.cn".to_string(),
            token: None,
            connect_timeout_secs: 10,
            idle_timeout_secs: 60,
            request_timeout_secs: 300,
        }
    }
}

impl UpstreamConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed browser origins; `"*"` allows any origin.
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
        }
    }
}

/// Load the effective configuration from `path` (optional) and the environment.
pub fn load_config(path: &Path) -> Result<RelayConfig> {
    settings::load_layered(APP_NAME, path)
}

pub fn write_default_config(path: &Path) -> Result<()> {
    settings::write_default::<RelayConfig>(
        APP_NAME,
        path,
        "The upstream token can also be set with COZE_RELAY__UPSTREAM__TOKEN",
    )
}

pub fn resolve_config_path(override_path: Option<PathBuf>) -> Result<PathBuf> {
    paths::resolve_config_path(APP_NAME, override_path)
}

impl RelayConfig {
    /// Copy safe to print: the token is masked.
    pub fn redacted(&self) -> Self {
        let mut shown = self.clone();
        if shown.upstream.token.is_some() {
            shown.upstream.token = Some("********".to_string());
        }
        shown
    }
}
