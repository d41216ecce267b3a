//! Configuration bootstrap.
//!
//! Adapted from `mcp-server::config::Config::from_env`: environment
//! variables are read first, then `data/settings.json` under the store root,
//! then built-in defaults. Every field is optional at the file layer; only
//! `store_root` is required overall.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("TM_STORE_ROOT is not set and no settings file was found")]
    MissingStoreRoot,
    #[error("failed to read settings file {path}: {source}")]
    ReadFailed { path: String, source: std::io::Error },
    #[error("failed to parse settings file {path}: {source}")]
    ParseFailed { path: String, source: serde_json::Error },
}

/// Fields persisted to `<root>/data/settings.json`. All optional; a missing
/// file is equivalent to every field being absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsFile {
    pub default_project: Option<String>,
    pub enhance_url: Option<String>,
    pub enhance_model: Option<String>,
    pub http_bind: Option<String>,
    pub http_port: Option<u16>,
}

/// Fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub store_root: PathBuf,
    pub default_project: String,
    pub enhance_url: Option<String>,
    pub enhance_model: Option<String>,
    pub http_bind: String,
    pub http_port: u16,
}

const DEFAULT_PROJECT: &str = "default";
const DEFAULT_HTTP_BIND: &str = "127.0.0.1";
const DEFAULT_HTTP_PORT: u16 = 4317;

impl Settings {
    /// Reads `TM_STORE_ROOT` (required) and the other `TM_*` variables
    /// (optional), falling back to `<root>/data/settings.json`, then to
    /// built-in defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let store_root = std::env::var("TM_STORE_ROOT")
            .ok()
            .map(|v| expand_tilde(&v))
            .ok_or(ConfigError::MissingStoreRoot)?;

        let settings_path = store_root.join("data").join("settings.json");
        let file = read_settings_file(&settings_path)?;

        Ok(Settings {
            store_root,
            default_project: std::env::var("TM_DEFAULT_PROJECT")
                .ok()
                .or(file.default_project)
                .unwrap_or_else(|| DEFAULT_PROJECT.to_string()),
            enhance_url: std::env::var("TM_ENHANCE_URL").ok().or(file.enhance_url),
            enhance_model: std::env::var("TM_ENHANCE_MODEL").ok().or(file.enhance_model),
            http_bind: std::env::var("TM_HTTP_BIND")
                .ok()
                .or(file.http_bind)
                .unwrap_or_else(|| DEFAULT_HTTP_BIND.to_string()),
            http_port: std::env::var("TM_HTTP_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .or(file.http_port)
                .unwrap_or(DEFAULT_HTTP_PORT),
        })
    }
}

fn read_settings_file(path: &Path) -> Result<SettingsFile, ConfigError> {
    if !path.exists() {
        return Ok(SettingsFile::default());
    }
    let text = std::fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFailed { path: path.display().to_string(), source })?;
    serde_json::from_str(&text)
        .map_err(|source| ConfigError::ParseFailed { path: path.display().to_string(), source })
}

/// Expands a leading `~` to the user's home directory.
fn expand_tilde(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_file_defaults_are_none() {
        let file = SettingsFile::default();
        assert!(file.default_project.is_none());
        assert!(file.http_port.is_none());
    }

    #[test]
    fn missing_settings_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let result = read_settings_file(&dir.path().join("nope.json")).unwrap();
        assert!(result.default_project.is_none());
    }

    #[test]
    fn reads_settings_file_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"default_project":"acme","http_port":9000}"#).unwrap();
        let file = read_settings_file(&path).unwrap();
        assert_eq!(file.default_project.as_deref(), Some("acme"));
        assert_eq!(file.http_port, Some(9000));
    }

    #[test]
    fn expand_tilde_without_home_env_falls_back() {
        let expanded = expand_tilde("/absolute/path");
        assert_eq!(expanded, PathBuf::from("/absolute/path"));
    }
}
