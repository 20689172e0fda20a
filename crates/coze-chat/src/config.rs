//! Client configuration: defaults, TOML file and `COZE_CHAT__*` environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use coze_cli::{paths, settings};
use serde::{Deserialize, Serialize};

use crate::session::StoreOptions;

pub const APP_NAME: &str = "coze-chat";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub logging: LoggingConfig,
    pub relay: RelayEndpointConfig,
    pub chat: ChatSection,
    pub storage: StorageSection,
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayEndpointConfig {
    /// Base URL of a running `coze-relay`.
    pub url: String,
    pub connect_timeout_secs: u64,
    /// Longest silence tolerated between two chunks of an answer.
    pub stream_idle_timeout_secs: u64,
}

impl Default for RelayEndpointConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:3000".to_string(),
            connect_timeout_secs: 10,
            stream_idle_timeout_secs: 120,
        }
    }
}

impl RelayEndpointConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn stream_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_idle_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSection {
    /// Bot to talk to. Required for chatting.
    pub bot_id: String,
    pub user_id: String,
    pub history_limit: usize,
}

impl Default for ChatSection {
    fn default() -> Self {
        Self {
            bot_id: String::new(),
            user_id: "user".to_string(),
            history_limit: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Where sessions are kept. Defaults to the platform data directory.
    pub data_dir: Option<String>,
    pub save_debounce_ms: u64,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            data_dir: None,
            save_debounce_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub scroll_debounce_ms: u64,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            scroll_debounce_ms: 50,
        }
    }
}

impl ChatConfig {
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            bot_id: self.chat.bot_id.clone(),
            user_id: self.chat.user_id.clone(),
            history_limit: self.chat.history_limit,
            save_debounce: Duration::from_millis(self.storage.save_debounce_ms),
            scroll_debounce: Duration::from_millis(self.ui.scroll_debounce_ms),
            stream_idle_timeout: self.relay.stream_idle_timeout(),
        }
    }

    /// Resolved session directory.
    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.storage.data_dir {
            Some(dir) => paths::expand_path(dir),
            None => paths::data_dir(APP_NAME),
        }
    }
}

/// Load the effective configuration from `path` (optional) and the environment.
pub fn load_config(path: &Path) -> Result<ChatConfig> {
    settings::load_layered(APP_NAME, path)
}

pub fn write_default_config(path: &Path) -> Result<()> {
    settings::write_default::<ChatConfig>(
        APP_NAME,
        path,
        "Set chat.bot_id (or COZE_CHAT__CHAT__BOT_ID) before chatting",
    )
}

pub fn resolve_config_path(override_path: Option<PathBuf>) -> Result<PathBuf> {
    paths::resolve_config_path(APP_NAME, override_path)
}
