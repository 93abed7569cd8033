//! Dashboard configuration shared by the browser bundle and the CLI.
//!
//! The page receives this as a JSON blob at build time; the CLI keeps it in its
//! config file. Environment variables override individual fields.

use serde::{Deserialize, Serialize};

use crate::{DashError, Result};

pub const ENV_VAPID_PUBLIC_KEY: &str = "HOMEDASH_VAPID_PUBLIC_KEY";
pub const ENV_DATABASE_URL: &str = "HOMEDASH_DATABASE_URL";
pub const ENV_AUTH_TOKEN: &str = "HOMEDASH_AUTH_TOKEN";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DashConfig {
    /// Application-server public key, base64url encoded
    pub vapid_public_key: Option<String>,

    /// Worker script, resolved against the page location
    pub worker_script: String,

    /// Icon used when a push payload carries none
    pub default_icon: String,

    /// Title used when a push payload carries none
    pub default_title: String,

    /// Path opened when a notification is clicked and no window is open
    pub open_path: String,

    pub store: StoreConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreConfig {
    /// Base URL of the realtime database (REST surface)
    pub database_url: Option<String>,

    /// Database secret or ID token appended as `?auth=`
    pub auth_token: Option<String>,
}

impl Default for DashConfig {
    fn default() -> Self {
        Self {
            vapid_public_key: None,
            worker_script: "sw.js".to_string(),
            default_icon: "/icon.png".to_string(),
            default_title: "Notification".to_string(),
            open_path: "/".to_string(),
            store: StoreConfig::default(),
        }
    }
}

impl DashConfig {
    /// Parse and validate a JSON config blob. Missing fields take defaults.
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: DashConfig = serde_json::from_str(raw)
            .map_err(|e| DashError::Config(format!("unparseable config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_script.trim().is_empty() {
            return Err(DashError::Config("workerScript must not be empty".to_string()));
        }
        if !self.open_path.starts_with('/') {
            return Err(DashError::Config(format!(
                "openPath must start with '/', got '{}'",
                self.open_path
            )));
        }
        if let Some(url) = &self.store.database_url {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(DashError::Config(format!(
                    "store.databaseUrl must be an http(s) URL, got '{}'",
                    url
                )));
            }
        }
        Ok(())
    }

    /// The configured VAPID key, treating an empty string as unset.
    pub fn application_server_key(&self) -> Option<&str> {
        self.vapid_public_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary lookup (environment, test fixtures).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(ENV_VAPID_PUBLIC_KEY) {
            self.vapid_public_key = Some(key);
        }
        if let Some(url) = lookup(ENV_DATABASE_URL) {
            self.store.database_url = Some(url);
        }
        if let Some(token) = lookup(ENV_AUTH_TOKEN) {
            self.store.auth_token = Some(token);
        }
    }
}
