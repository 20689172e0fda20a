//! Layered configuration: struct defaults, then the TOML file, then
//! `<APP>__SECTION__KEY` environment variables.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::paths::env_prefix;

/// Load `T` from `path` (which may be absent) and the environment.
pub fn load_layered<T: DeserializeOwned>(app: &str, path: &Path) -> Result<T> {
    let prefix = env_prefix(app);
    Config::builder()
        .add_source(File::from(path).format(FileFormat::Toml).required(false))
        .add_source(Environment::with_prefix(prefix.as_str()).separator("__"))
        .build()
        .with_context(|| format!("loading config from {}", path.display()))?
        .try_deserialize()
        .with_context(|| format!("deserializing {app} config"))
}

/// Write `T::default()` to `path` as commented TOML, creating parent directories.
pub fn write_default<T: Serialize + Default>(app: &str, path: &Path, hint: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {parent:?}"))?;
    }

    let toml = toml::to_string_pretty(&T::default()).context("serializing default config to TOML")?;
    let body = format!("# Configuration for {app}\n# {hint}\n\n{toml}");
    fs::write(path, body).with_context(|| format!("writing config file to {}", path.display()))
}
