//! Blocking JSON client for a running controller's API.

use anyhow::Context;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

use vpd_core::config::Config;

pub struct ApiClient {
    http: reqwest::blocking::Client,
    base: String,
}

impl ApiClient {
    pub fn new(base: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            http,
            base: base.into().trim_end_matches('/').to_string(),
        })
    }

    /// Client for the daemon configured under `root`.
    pub fn for_root(root: &Path) -> anyhow::Result<Self> {
        let config = Config::load(root).context("failed to load config")?;
        Self::new(config.server.base_url())
    }

    pub fn get(&self, path: &str) -> anyhow::Result<Value> {
        self.send(self.http.get(self.url(path)), path)
    }

    pub fn post(&self, path: &str, body: &Value) -> anyhow::Result<Value> {
        self.send(self.http.post(self.url(path)).json(body), path)
    }

    pub fn put(&self, path: &str, body: &Value) -> anyhow::Result<Value> {
        self.send(self.http.put(self.url(path)).json(body), path)
    }

    pub fn delete(&self, path: &str) -> anyhow::Result<Value> {
        self.send(self.http.delete(self.url(path)), path)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    fn send(&self, req: reqwest::blocking::RequestBuilder, path: &str) -> anyhow::Result<Value> {
        let resp = req
            .send()
            .with_context(|| format!("controller not reachable at {}", self.base))?;
        let status = resp.status();
        let body: Value = resp.json().unwrap_or(Value::Null);
        if !status.is_success() {
            let msg = body["error"].as_str().unwrap_or("request failed");
            anyhow::bail!("{path}: {msg} ({status})");
        }
        Ok(body)
    }
}
