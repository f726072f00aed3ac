//! Connection settings shared by the provider clients

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Where and how a client talks to its provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Provider base URL, without trailing slash
    pub base_url: String,

    /// Per-request timeout
    pub timeout: Duration,

    /// Optional HTTP(S) proxy URL applied to every request
    pub proxy: Option<String>,
}

impl ApiConfig {
    /// Config for `base_url` with the default timeout and no proxy
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            proxy: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Apply `APYS_HTTP_PROXY` and `APYS_TIMEOUT_SECS` from the environment
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(proxy) = std::env::var("APYS_HTTP_PROXY") {
            if !proxy.is_empty() {
                self.proxy = Some(proxy);
            }
        }
        if let Ok(secs) = std::env::var("APYS_TIMEOUT_SECS") {
            let secs = secs
                .parse::<u64>()
                .context("APYS_TIMEOUT_SECS must be a whole number of seconds")?;
            self.timeout = Duration::from_secs(secs);
        }
        Ok(self)
    }

    /// Build the underlying HTTP client
    pub fn http_client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder().timeout(self.timeout);
        if let Some(proxy) = &self.proxy {
            builder = builder.proxy(
                reqwest::Proxy::all(proxy)
                    .with_context(|| format!("Invalid proxy URL: {}", proxy))?,
            );
        }
        builder.build().context("Failed to create HTTP client")
    }
}
