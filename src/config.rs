use std::path::Path;

use alloy::primitives::Address;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// Default config file path.
pub const CONFIG_PATH: &str = "config.json";

/// Application config deserialized from `config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Use the test network endpoint instead of mainnet.
    #[serde(default)]
    pub test: bool,
    #[serde(default)]
    pub tg_bot_token: String,
    #[serde(default)]
    pub ether_main: String,
    #[serde(default)]
    pub ether_test: String,
    /// Watched addresses (hex, with or without 0x prefix).
    #[serde(default)]
    pub address: Vec<String>,
    #[serde(default)]
    pub chat_id: String,
    /// Route node and Telegram traffic through `http_proxy_url`.
    #[serde(default)]
    pub http_proxy: bool,
    #[serde(default)]
    pub http_proxy_url: String,
}

impl Config {
    /// Load config from the given JSON file path.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// The node endpoint selected by the `test` flag.
    pub fn endpoint(&self) -> &str {
        if self.test {
            &self.ether_test
        } else {
            &self.ether_main
        }
    }

    /// Proxy URL when proxying is enabled.
    pub fn proxy(&self) -> Option<&str> {
        self.http_proxy.then_some(self.http_proxy_url.as_str())
    }

    /// Watched addresses, parsed. Each must be 20 bytes of hex.
    pub fn addresses(&self) -> Result<Vec<Address>> {
        self.address
            .iter()
            .map(|a| {
                a.trim()
                    .parse::<Address>()
                    .with_context(|| format!("invalid address {a:?}"))
            })
            .collect()
    }

    /// Check the fields the watcher cannot run without.
    pub fn validate(&self) -> Result<()> {
        if self.tg_bot_token.trim().is_empty() {
            anyhow::bail!("tg_bot_token is empty");
        }
        if self.chat_id.trim().is_empty() {
            anyhow::bail!("chat_id is empty");
        }
        if self.address.is_empty() {
            anyhow::bail!("no addresses configured");
        }
        self.addresses()?;

        let endpoint = self.endpoint();
        let which = if self.test { "ether_test" } else { "ether_main" };
        if endpoint.is_empty() {
            anyhow::bail!("{which} is empty");
        }
        let url = Url::parse(endpoint).with_context(|| format!("invalid {which} URL"))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            anyhow::bail!("{which} must be a ws:// or wss:// URL, got {}", url.scheme());
        }

        if let Some(proxy) = self.proxy() {
            Url::parse(proxy).context("invalid http_proxy_url")?;
        }
        Ok(())
    }
}
