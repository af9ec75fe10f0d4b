//! Runtime configuration.
//!
//! Everything has a sensible default; a TOML file can override any subset of
//! fields. The API token deliberately never lives here, it comes from the
//! environment or the command line.

use crate::Result;
use core::time::Duration;
use ohno::IntoAppError;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Name of the config file looked up in the working directory when no
/// explicit path is given.
const DEFAULT_CONFIG_FILE: &str = "devpulse.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct Config {
    /// Base URL of the GitHub REST API.
    pub api_base: String,

    /// `User-Agent` sent with every upstream request.
    pub user_agent: String,

    /// Releases fetched per repository.
    pub release_limit: usize,

    /// Commits fetched per repository.
    pub commit_limit: usize,

    /// How long a per-resource cache entry stays fresh.
    pub resource_cache_ttl_secs: u64,

    /// How long a restored global feed snapshot stays usable.
    pub global_feed_ttl_secs: u64,

    /// Bound on each global feed list.
    pub max_feed_items: usize,

    /// Minimum spacing between upstream requests.
    pub min_request_interval_ms: u64,

    /// Most resources fetched over the network in one batch pass.
    pub max_to_query: usize,

    /// Batch pass stops early after this many resources yield updates.
    pub max_successes: usize,

    /// Pause between resources during a preload pass.
    pub preload_delay_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            user_agent: "devpulse".to_string(),
            release_limit: 3,
            commit_limit: 5,
            resource_cache_ttl_secs: 3600,
            global_feed_ttl_secs: 86_400,
            max_feed_items: 25,
            min_request_interval_ms: 1000,
            max_to_query: 5,
            max_successes: 3,
            preload_delay_secs: 2,
        }
    }
}

impl Config {
    /// Load configuration.
    ///
    /// An explicit path must exist and parse. With no path, `devpulse.toml`
    /// in the working directory is used when present, defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p,
            None => {
                let p = Path::new(DEFAULT_CONFIG_FILE);
                if !p.exists() {
                    return Ok(Self::default());
                }
                p
            }
        };

        let text = fs::read_to_string(path)
            .into_app_err_with(|| format!("reading configuration from {}", path.display()))?;
        toml::from_str(&text)
            .into_app_err_with(|| format!("parsing configuration from {}", path.display()))
    }

    #[must_use]
    pub const fn resource_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.resource_cache_ttl_secs)
    }

    #[must_use]
    pub const fn global_feed_ttl(&self) -> Duration {
        Duration::from_secs(self.global_feed_ttl_secs)
    }

    #[must_use]
    pub const fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }

    #[must_use]
    pub const fn preload_delay(&self) -> Duration {
        Duration::from_secs(self.preload_delay_secs)
    }
}
