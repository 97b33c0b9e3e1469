use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default remote discovery interval: once a day.
pub const DEFAULT_DISCOVERY_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Per-proxy remote discovery settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_interval_secs() -> u64 {
    DEFAULT_DISCOVERY_INTERVAL_SECS
}

impl DiscoveryConfig {
    pub fn new(enabled: bool, interval: Duration) -> Self {
        Self {
            enabled,
            interval_secs: interval.as_secs(),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn interval_millis(&self) -> i64 {
        i64::try_from(self.interval_secs.saturating_mul(1000)).unwrap_or(i64::MAX)
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            interval_secs: default_interval_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: DiscoveryConfig = serde_json::from_str("{}").unwrap();
        assert!(config.enabled);
        assert_eq!(config.interval(), Duration::from_secs(86_400));
    }

    #[test]
    fn test_interval_millis() {
        let config = DiscoveryConfig::new(false, Duration::from_secs(3600));
        assert_eq!(config.interval_millis(), 3_600_000);
    }
}
