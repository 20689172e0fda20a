//! Where configuration and data live.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};

pub const CONFIG_FILE_NAME: &str = "config.toml";

/// `coze-relay` becomes `COZE_RELAY`.
pub fn env_prefix(app: &str) -> String {
    app.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Expand `~` and `$VAR` in a user-supplied path.
pub fn expand_path(text: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(text).context("expanding path")?;
    Ok(PathBuf::from(expanded.to_string()))
}

/// Resolve the config file location; a directory override gets `config.toml` appended.
pub fn resolve_config_path(app: &str, override_path: Option<PathBuf>) -> Result<PathBuf> {
    let Some(path) = override_path else {
        return Ok(config_dir(app)?.join(CONFIG_FILE_NAME));
    };

    let expanded = match path.to_str() {
        Some(text) => expand_path(text)?,
        None => path,
    };
    if expanded.is_dir() {
        Ok(expanded.join(CONFIG_FILE_NAME))
    } else {
        Ok(expanded)
    }
}

pub fn config_dir(app: &str) -> Result<PathBuf> {
    app_dir(app, "XDG_CONFIG_HOME", dirs::config_dir(), &[".config"])
        .ok_or_else(|| anyhow!("unable to determine configuration directory"))
}

pub fn data_dir(app: &str) -> Result<PathBuf> {
    app_dir(app, "XDG_DATA_HOME", dirs::data_dir(), &[".local", "share"])
        .ok_or_else(|| anyhow!("unable to determine data directory"))
}

fn app_dir(
    app: &str,
    xdg_var: &str,
    platform: Option<PathBuf>,
    home_relative: &[&str],
) -> Option<PathBuf> {
    if let Some(dir) = env::var_os(xdg_var).filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(dir).join(app));
    }
    if let Some(dir) = platform {
        return Some(dir.join(app));
    }
    dirs::home_dir().map(|home| {
        home_relative
            .iter()
            .fold(home, |dir, part| dir.join(part))
            .join(app)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_env_prefix() {
        assert_eq!(env_prefix("coze-relay"), "COZE_RELAY");
        assert_eq!(env_prefix("coze-chat"), "COZE_CHAT");
    }

    #[test]
    fn test_directory_override_appends_file_name() {
        let dir = TempDir::new().unwrap();
        let path = resolve_config_path("coze-chat", Some(dir.path().to_path_buf())).unwrap();
        assert_eq!(path, dir.path().join(CONFIG_FILE_NAME));
    }

    #[test]
    fn test_file_override_is_kept() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("relay.toml");
        let path = resolve_config_path("coze-relay", Some(file.clone())).unwrap();
        assert_eq!(path, file);
    }

    #[test]
    fn test_default_location_ends_with_app_name() {
        let path = resolve_config_path("coze-chat", None).unwrap();
        assert!(path.ends_with("coze-chat/config.toml"), "got {path:?}");
    }
}
