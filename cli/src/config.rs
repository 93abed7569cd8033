// Configuration management for the HomeDash CLI
//
// Cross-platform config stored in:
// - macOS: ~/Library/Application Support/homedash/config.json
// - Linux: ~/.config/homedash/config.json
// - Windows: %APPDATA%\homedash\config.json

use anyhow::{Context, Result};
use homedash_core::DashConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Keys accepted by `config get|set`, in listing order.
pub const KEYS: &[&str] = &[
    "vapid_public_key",
    "worker_script",
    "default_icon",
    "default_title",
    "open_path",
    "database_url",
    "auth_token",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(flatten)]
    pub dash: DashConfig,

    #[serde(skip)]
    path: PathBuf,
}

fn optional(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

impl Config {
    /// Get the config directory path (cross-platform)
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("homedash");

        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        Ok(config_dir)
    }

    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load config from the default location, creating it on first use
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path).context("Failed to read config file")?;
            let dash = DashConfig::from_json(&contents).context("Failed to parse config file")?;
            Ok(Self {
                dash,
                path: path.to_path_buf(),
            })
        } else {
            let config = Self {
                dash: DashConfig::default(),
                path: path.to_path_buf(),
            };
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&self.path, contents).context("Failed to write config file")?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Config as seen by commands: file values with environment overrides applied
    pub fn effective(&self) -> DashConfig {
        let mut dash = self.dash.clone();
        dash.apply_env_overrides();
        dash
    }

    /// Set a config value and save. An empty value clears optional keys.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut updated = self.dash.clone();
        match key {
            "vapid_public_key" => updated.vapid_public_key = optional(value),
            "worker_script" => updated.worker_script = value.to_string(),
            "default_icon" => updated.default_icon = value.to_string(),
            "default_title" => updated.default_title = value.to_string(),
            "open_path" => updated.open_path = value.to_string(),
            "database_url" => updated.store.database_url = optional(value),
            "auth_token" => updated.store.auth_token = optional(value),
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
        updated
            .validate()
            .with_context(|| format!("Rejected value for {}", key))?;
        self.dash = updated;
        self.save()?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let dash = &self.dash;
        match key {
            "vapid_public_key" => dash.vapid_public_key.clone(),
            "worker_script" => Some(dash.worker_script.clone()),
            "default_icon" => Some(dash.default_icon.clone()),
            "default_title" => Some(dash.default_title.clone()),
            "open_path" => Some(dash.open_path.clone()),
            "database_url" => dash.store.database_url.clone(),
            "auth_token" => dash.store.auth_token.clone(),
            _ => None,
        }
    }

    /// List all config values. The auth token is masked.
    pub fn list(&self) -> Vec<(String, String)> {
        KEYS.iter()
            .map(|key| {
                let value = match (*key, self.get(key)) {
                    (_, None) => "(unset)".to_string(),
                    ("auth_token", Some(_)) => "********".to_string(),
                    (_, Some(v)) => v,
                };
                (key.to_string(), value)
            })
            .collect()
    }
}
