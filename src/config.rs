use crate::{monitor, source};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    fmt::{self, Debug, Formatter},
    fs,
    path::Path,
    time::Duration,
};
use url::Url;

#[derive(Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// The local node endpoint: an IPC socket path, or an HTTP or WebSocket
    /// URL.
    pub eth_url: String,
    pub min_peer_count: usize,
    pub max_peer_count: usize,
    #[serde(with = "humantime_serde")]
    pub monitor_duration: Duration,
    #[serde(with = "humantime_serde")]
    pub retry_duration: Duration,
    #[serde(with = "humantime_serde")]
    pub rpc_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub dial_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub http_timeout: Duration,
    /// The number of directory nodes to fetch per round.
    pub fetch_count: usize,
    /// The maximum number of directory rounds per check.
    pub fetch_rounds: usize,
    pub whitelist_url: Url,
    pub directory_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            eth_url: "/user/.ethereum/geth.ipc".to_owned(),
            min_peer_count: 5,
            max_peer_count: 15,
            monitor_duration: Duration::from_secs(60 * 60),
            retry_duration: Duration::from_secs(3),
            rpc_timeout: Duration::from_secs(10),
            dial_timeout: Duration::from_secs(5),
            http_timeout: Duration::from_secs(30),
            fetch_count: 25,
            fetch_rounds: 10,
            whitelist_url: Url::parse(source::WHITELIST_URL)
                .expect("default whitelist URL is valid"),
            directory_url: source::DIRECTORY_URL.to_owned(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let toml = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config = toml::from_str(&toml)?;
        Ok(config)
    }

    /// Checks that the configuration is consistent.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.min_peer_count <= self.max_peer_count,
            "minimum peer count {} exceeds maximum peer count {}",
            self.min_peer_count,
            self.max_peer_count,
        );
        anyhow::ensure!(self.fetch_count > 0, "fetch count must be positive");
        for (name, timeout) in [
            ("monitor duration", self.monitor_duration),
            ("retry duration", self.retry_duration),
            ("rpc timeout", self.rpc_timeout),
            ("dial timeout", self.dial_timeout),
            ("http timeout", self.http_timeout),
        ] {
            anyhow::ensure!(!timeout.is_zero(), "{name} must be positive");
        }
        for placeholder in ["{draw}", "{length}"] {
            anyhow::ensure!(
                self.directory_url.contains(placeholder),
                "directory URL is missing the {placeholder} placeholder",
            );
        }
        Url::parse(&source::query_url(&self.directory_url, 1, self.fetch_count, ""))
            .context("invalid directory URL")?;
        Ok(())
    }

    /// Returns the monitor run configuration.
    pub fn run(&self) -> monitor::Run {
        monitor::Run {
            min_peer_count: self.min_peer_count,
            max_peer_count: self.max_peer_count,
            monitor_duration: self.monitor_duration,
            retry_duration: self.retry_duration,
            rpc_timeout: self.rpc_timeout,
        }
    }
}

impl Debug for Config {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("Config")
            .field("eth_url", &self.eth_url)
            .field("min_peer_count", &self.min_peer_count)
            .field("max_peer_count", &self.max_peer_count)
            .field("monitor_duration", &self.monitor_duration)
            .field("retry_duration", &self.retry_duration)
            .field("rpc_timeout", &self.rpc_timeout)
            .field("dial_timeout", &self.dial_timeout)
            .field("http_timeout", &self.http_timeout)
            .field("fetch_count", &self.fetch_count)
            .field("fetch_rounds", &self.fetch_rounds)
            .field("whitelist_url", &self.whitelist_url.as_str())
            .finish_non_exhaustive()
    }
}
