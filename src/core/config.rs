use crate::core::install::default_install_command;
use crate::core::request::{AllowedNetwork, DestinationPolicy, NotificationVisibility};
use crate::error::{ApkdlError, Result};
use crate::utils::fs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 600;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub downloads_dir: PathBuf,
    pub allowed_network: AllowedNetwork,
    pub notification_visibility: NotificationVisibility,
    pub destination_policy: DestinationPolicy,
    pub install_command: Vec<String>,
    pub auto_install: bool,
    pub wait_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        let downloads_dir = get_apkdl_dir()
            .map(|dir| dir.join("downloads"))
            .unwrap_or_else(|_| PathBuf::from(".apkdl/downloads"));

        Config {
            downloads_dir,
            allowed_network: AllowedNetwork::default(),
            notification_visibility: NotificationVisibility::default(),
            destination_policy: DestinationPolicy::default(),
            install_command: default_install_command(),
            auto_install: true,
            wait_timeout_secs: DEFAULT_WAIT_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Load the user config, writing the defaults on first use.
    pub fn load() -> Result<Self> {
        let config_path = get_config_path()?;

        if !config_path.exists() {
            let config = Self::default();
            config.save_to(&config_path)?;
            return Ok(config);
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        tracing::debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::ensure_dir_exists(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Update a single setting from its textual form.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "downloads_dir" => self.downloads_dir = PathBuf::from(value),
            "allowed_network" => self.allowed_network = parse_enum(key, value)?,
            "notification_visibility" => self.notification_visibility = parse_enum(key, value)?,
            "destination_policy" => self.destination_policy = parse_enum(key, value)?,
            "install_command" => {
                let command: Vec<String> = value.split_whitespace().map(str::to_string).collect();
                if command.is_empty() {
                    return Err(ApkdlError::config_error("install_command cannot be empty"));
                }
                self.install_command = command;
            }
            "auto_install" => {
                self.auto_install = value.parse().map_err(|_| {
                    ApkdlError::config_error(format!(
                        "auto_install expects true or false, got '{value}'"
                    ))
                })?
            }
            "wait_timeout_secs" => {
                self.wait_timeout_secs = value.parse().map_err(|_| {
                    ApkdlError::config_error(format!(
                        "wait_timeout_secs expects seconds, got '{value}'"
                    ))
                })?
            }
            other => {
                return Err(ApkdlError::config_error(format!("unknown setting '{other}'")));
            }
        }
        Ok(())
    }
}

fn parse_enum<T: serde::de::DeserializeOwned>(key: &str, value: &str) -> Result<T> {
    serde_json::from_value(serde_json::Value::String(value.to_string()))
        .map_err(|e| ApkdlError::config_error(format!("invalid value for {key}: {e}")))
}

fn get_apkdl_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(".apkdl"))
        .ok_or(ApkdlError::HomeDirectoryNotFound)
}

pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_apkdl_dir()?.join("config.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.downloads_dir = dir.path().join("downloads");
        config.allowed_network = AllowedNetwork::UnmeteredOnly;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_keys_use_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "auto_install": false }"#).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert!(!loaded.auto_install);
        assert_eq!(loaded.install_command, vec!["adb", "install", "-r"]);
        assert_eq!(loaded.wait_timeout_secs, DEFAULT_WAIT_TIMEOUT_SECS);
    }

    #[test]
    fn test_set_enum_values() {
        let mut config = Config::default();
        config.set("notification_visibility", "hidden").unwrap();
        config.set("destination_policy", "backup").unwrap();
        assert_eq!(config.notification_visibility, NotificationVisibility::Hidden);
        assert_eq!(config.destination_policy, DestinationPolicy::Backup);
    }

    #[test]
    fn test_set_rejects_bad_input() {
        let mut config = Config::default();
        assert!(config.set("allowed_network", "cellular").is_err());
        assert!(config.set("auto_install", "maybe").is_err());
        assert!(config.set("install_command", "   ").is_err());
        assert!(config.set("colour", "blue").is_err());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_set_install_command_splits_words() {
        let mut config = Config::default();
        config.set("install_command", "xdg-open").unwrap();
        assert_eq!(config.install_command, vec!["xdg-open"]);
    }
}
