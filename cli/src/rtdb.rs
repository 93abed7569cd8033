// Realtime database over its REST surface
//
// GET|PUT <database_url>/<path>.json[?auth=<token>]. There is no live stream
// here: a subscription delivers one snapshot and holds nothing open.
// ureq blocks, so calls made from async code go through the blocking pool.

use anyhow::{Context, Result};
use async_trait::async_trait;
use homedash_core::store::{paths, ListenerHandle, SnapshotCallback};
use homedash_core::{DashError, RealtimeStore, StoreConfig};
use serde_json::Value;
use std::time::Duration;

#[derive(Clone)]
pub struct RestStore {
    base_url: String,
    auth_token: Option<String>,
    agent: ureq::Agent,
}

impl RestStore {
    pub fn new(base_url: impl Into<String>, auth_token: Option<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(30))
            .build();
        Self {
            base_url: base_url.into(),
            auth_token,
            agent,
        }
    }

    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        let base_url = config
            .database_url
            .clone()
            .context("No database URL configured (homedash config set database_url <url>)")?;
        Ok(Self::new(base_url, config.auth_token.clone()))
    }

    /// REST URL of a store path, without the auth parameter. The path is
    /// validated the same way the in-process store validates it.
    pub fn url_for(&self, path: &str) -> Result<String> {
        let segments = paths::segments(path)?;
        Ok(format!(
            "{}/{}.json",
            self.base_url.trim_end_matches('/'),
            segments.join("/")
        ))
    }

    /// Request for a store path with the auth token attached as an encoded
    /// query parameter.
    fn request(&self, method: &str, path: &str) -> Result<ureq::Request> {
        let request = self.agent.request(method, &self.url_for(path)?);
        Ok(match &self.auth_token {
            Some(token) => request.query("auth", token),
            None => request,
        })
    }

    pub fn get(&self, path: &str) -> Result<Value> {
        tracing::debug!("GET {}", path);
        let response = self
            .request("GET", path)?
            .call()
            .with_context(|| format!("GET {} failed", path))?;
        response
            .into_json::<Value>()
            .with_context(|| format!("GET {} returned invalid JSON", path))
    }

    pub fn put(&self, path: &str, value: &Value) -> Result<()> {
        tracing::debug!("PUT {}", path);
        self.request("PUT", path)?
            .send_json(value)
            .with_context(|| format!("PUT {} failed", path))?;
        Ok(())
    }

    /// `get` on the blocking pool.
    pub async fn fetch(&self, path: &str) -> Result<Value> {
        let store = self.clone();
        let path = path.to_string();
        tokio::task::spawn_blocking(move || store.get(&path))
            .await
            .context("REST request task failed")?
    }

    /// `put` on the blocking pool.
    pub async fn store(&self, path: &str, value: Value) -> Result<()> {
        let store = self.clone();
        let path = path.to_string();
        tokio::task::spawn_blocking(move || store.put(&path, &value))
            .await
            .context("REST request task failed")?
    }
}

#[async_trait(?Send)]
impl RealtimeStore for RestStore {
    fn subscribe(
        &self,
        path: &str,
        mut callback: SnapshotCallback,
    ) -> homedash_core::Result<ListenerHandle> {
        // Needs the multi-threaded runtime the CLI starts with.
        let value = tokio::task::block_in_place(|| self.get(path))
            .map_err(|e| DashError::Store(format!("{:#}", e)))?;
        callback(value);
        Ok(ListenerHandle::noop())
    }

    async fn write(&self, path: &str, value: Value) -> homedash_core::Result<()> {
        self.store(path, value)
            .await
            .map_err(|e| DashError::Store(format!("{:#}", e)))
    }
}
