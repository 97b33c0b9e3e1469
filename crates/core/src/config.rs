use crate::error::{Result, RoutingError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const ENV_PREFIX: &str = "AUTOROUTE_";

/// Engine-wide settings. Per-proxy discovery settings live on the proxy facet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Global kill switch for remote discovery.
    pub feature_active: bool,
    pub local_prefix_file_path: String,
    pub remote_prefix_file_path: String,
    pub discovery_status_file_path: String,
    pub local_scrape_depth: usize,
    pub remote_scrape_depth: usize,
    pub prefix_file_max_entries: usize,
    pub prefix_file_max_line_length: usize,
    pub update_check_interval_secs: u64,
    pub worker_pool_size: usize,
    pub shutdown_grace_secs: u64,
    pub remote_timeout_secs: u64,
    /// Response headers identifying reverse proxies that answer for content they do not have.
    pub blacklisted_headers: Vec<String>,
    /// Server names matched against the start of an index page `<address>` element.
    pub blacklisted_server_names: Vec<String>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            feature_active: true,
            local_prefix_file_path: "/.meta/prefixes.txt".to_string(),
            remote_prefix_file_path: "/.meta/prefixes.txt".to_string(),
            discovery_status_file_path: "/.meta/discovery.status.txt".to_string(),
            local_scrape_depth: 2,
            remote_scrape_depth: 2,
            prefix_file_max_entries: 10_000,
            prefix_file_max_line_length: 250,
            update_check_interval_secs: 60 * 60,
            worker_pool_size: 5,
            shutdown_grace_secs: 15,
            remote_timeout_secs: 30,
            blacklisted_headers: vec!["x-artifactory-id".to_string()],
            blacklisted_server_names: vec!["Artifactory".to_string()],
        }
    }
}

impl RoutingConfig {
    /// Defaults overlaid with `AUTOROUTE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Overlays values from `lookup` onto the defaults. Keys are the upper-cased
    /// field names prefixed with `AUTOROUTE_`; list values are comma separated.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(v) = get("FEATURE_ACTIVE") {
            config.feature_active = parse_value("FEATURE_ACTIVE", &v)?;
        }
        if let Some(v) = get("LOCAL_PREFIX_FILE_PATH") {
            config.local_prefix_file_path = v;
        }
        if let Some(v) = get("REMOTE_PREFIX_FILE_PATH") {
            config.remote_prefix_file_path = v;
        }
        if let Some(v) = get("DISCOVERY_STATUS_FILE_PATH") {
            config.discovery_status_file_path = v;
        }
        if let Some(v) = get("LOCAL_SCRAPE_DEPTH") {
            config.local_scrape_depth = parse_value("LOCAL_SCRAPE_DEPTH", &v)?;
        }
        if let Some(v) = get("REMOTE_SCRAPE_DEPTH") {
            config.remote_scrape_depth = parse_value("REMOTE_SCRAPE_DEPTH", &v)?;
        }
        if let Some(v) = get("PREFIX_FILE_MAX_ENTRIES") {
            config.prefix_file_max_entries = parse_value("PREFIX_FILE_MAX_ENTRIES", &v)?;
        }
        if let Some(v) = get("PREFIX_FILE_MAX_LINE_LENGTH") {
            config.prefix_file_max_line_length = parse_value("PREFIX_FILE_MAX_LINE_LENGTH", &v)?;
        }
        if let Some(v) = get("UPDATE_CHECK_INTERVAL_SECS") {
            config.update_check_interval_secs = parse_value("UPDATE_CHECK_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = get("WORKER_POOL_SIZE") {
            config.worker_pool_size = parse_value("WORKER_POOL_SIZE", &v)?;
        }
        if let Some(v) = get("SHUTDOWN_GRACE_SECS") {
            config.shutdown_grace_secs = parse_value("SHUTDOWN_GRACE_SECS", &v)?;
        }
        if let Some(v) = get("REMOTE_TIMEOUT_SECS") {
            config.remote_timeout_secs = parse_value("REMOTE_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("BLACKLISTED_HEADERS") {
            config.blacklisted_headers = split_list(&v);
        }
        if let Some(v) = get("BLACKLISTED_SERVER_NAMES") {
            config.blacklisted_server_names = split_list(&v);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("local_scrape_depth", self.local_scrape_depth),
            ("remote_scrape_depth", self.remote_scrape_depth),
            ("prefix_file_max_entries", self.prefix_file_max_entries),
            ("prefix_file_max_line_length", self.prefix_file_max_line_length),
            ("worker_pool_size", self.worker_pool_size),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(RoutingError::InvalidArgument(format!(
                    "{name} must be greater than zero"
                )));
            }
        }
        if self.update_check_interval_secs == 0 {
            return Err(RoutingError::InvalidArgument(
                "update_check_interval_secs must be greater than zero".to_string(),
            ));
        }
        for (name, path) in [
            ("local_prefix_file_path", &self.local_prefix_file_path),
            ("remote_prefix_file_path", &self.remote_prefix_file_path),
            ("discovery_status_file_path", &self.discovery_status_file_path),
        ] {
            if !path.starts_with('/') {
                return Err(RoutingError::InvalidArgument(format!(
                    "{name} must be an absolute repository path, got '{path}'"
                )));
            }
        }
        Ok(())
    }

    pub fn update_check_interval(&self) -> Duration {
        Duration::from_secs(self.update_check_interval_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }
}

fn parse_value<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| {
        RoutingError::InvalidArgument(format!("{ENV_PREFIX}{name}: cannot parse '{raw}'"))
    })
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
