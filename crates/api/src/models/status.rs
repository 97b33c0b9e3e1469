use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Outcome of the last remote discovery of a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscoveryState {
    /// Not a proxy, discovery does not apply.
    NotAProxy,
    /// Remote discovery switched off for the proxy.
    Disabled,
    /// Discovery is running, or never ran yet.
    EnabledInProgress,
    /// Discovery enabled but the repository cannot be discovered right now
    /// (blocked or out of service).
    EnabledNotPossible,
    Successful,
    Unsuccessful,
    Error,
}

impl DiscoveryState {
    pub fn is_enabled(self) -> bool {
        !matches!(self, DiscoveryState::NotAProxy | DiscoveryState::Disabled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DiscoveryState::NotAProxy => "NOT_A_PROXY",
            DiscoveryState::Disabled => "DISABLED",
            DiscoveryState::EnabledInProgress => "ENABLED_IN_PROGRESS",
            DiscoveryState::EnabledNotPossible => "ENABLED_NOT_POSSIBLE",
            DiscoveryState::Successful => "SUCCESSFUL",
            DiscoveryState::Unsuccessful => "UNSUCCESSFUL",
            DiscoveryState::Error => "ERROR",
        }
    }
}

impl fmt::Display for DiscoveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiscoveryState {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "NOT_A_PROXY" => Ok(DiscoveryState::NotAProxy),
            "DISABLED" => Ok(DiscoveryState::Disabled),
            "ENABLED_IN_PROGRESS" => Ok(DiscoveryState::EnabledInProgress),
            "ENABLED_NOT_POSSIBLE" => Ok(DiscoveryState::EnabledNotPossible),
            "SUCCESSFUL" => Ok(DiscoveryState::Successful),
            "UNSUCCESSFUL" => Ok(DiscoveryState::Unsuccessful),
            "ERROR" => Ok(DiscoveryState::Error),
            other => Err(ApiError::InvalidArgument(format!(
                "unknown discovery state '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryStatus {
    pub state: DiscoveryState,
    pub last_strategy_id: String,
    pub last_message: String,
    /// Epoch millis, `-1` when unknown.
    pub last_timestamp: i64,
}

impl DiscoveryStatus {
    pub const UNKNOWN_STRATEGY: &'static str = "unknown";

    pub fn new(state: DiscoveryState) -> Self {
        Self {
            state,
            last_strategy_id: Self::UNKNOWN_STRATEGY.to_string(),
            last_message: String::new(),
            last_timestamp: -1,
        }
    }

    pub fn with_details(
        state: DiscoveryState,
        strategy_id: impl Into<String>,
        message: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            state,
            last_strategy_id: strategy_id.into(),
            last_message: message.into(),
            last_timestamp: timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PublishingState {
    Published,
    NotPublished,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishingStatus {
    pub state: PublishingState,
    pub message: String,
    /// Epoch millis of the published prefix file, `-1` when not published.
    pub last_modified: i64,
    pub path: Option<String>,
}

impl PublishingStatus {
    pub fn published(message: impl Into<String>, last_modified: i64, path: impl Into<String>) -> Self {
        Self {
            state: PublishingState::Published,
            message: message.into(),
            last_modified,
            path: Some(path.into()),
        }
    }

    pub fn not_published(message: impl Into<String>) -> Self {
        Self {
            state: PublishingState::NotPublished,
            message: message.into(),
            last_modified: -1,
            path: None,
        }
    }
}

/// Combined view reported for one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingStatus {
    pub publishing: PublishingStatus,
    pub discovery: DiscoveryStatus,
}
