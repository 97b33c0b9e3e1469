use crate::discovery::blacklist::Blacklist;
use crate::discovery::strategy::{RemoteStrategy, StrategyContext, StrategyOutcome};
use crate::error::RoutingError;
use crate::prefix::TextMarshaller;
use crate::runtime::LockTable;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub const PREFIX_FILE_STRATEGY_ID: &str = "prefix-file";

/// Asks the remote for the prefix file it publishes.
pub struct RemotePrefixFileStrategy {
    remote_path: String,
    marshaller: TextMarshaller,
    blacklist: Arc<Blacklist>,
    locks: Arc<LockTable>,
}

impl RemotePrefixFileStrategy {
    pub fn new(
        remote_path: impl Into<String>,
        marshaller: TextMarshaller,
        blacklist: Arc<Blacklist>,
        locks: Arc<LockTable>,
    ) -> Self {
        Self {
            remote_path: remote_path.into(),
            marshaller,
            blacklist,
            locks,
        }
    }
}

/// Parses a `Last-Modified` header value.
pub fn modified_of(last_modified: Option<&str>) -> Option<DateTime<Utc>> {
    last_modified
        .and_then(|value| DateTime::parse_from_rfc2822(value.trim()).ok())
        .map(|modified| modified.with_timezone(&Utc))
}

/// Human readable age of a remote prefix file from its `Last-Modified` header.
pub fn age_message(last_modified: Option<&str>, now: DateTime<Utc>) -> String {
    match modified_of(last_modified) {
        Some(modified) => {
            let days = (now - modified).num_days();
            if days < 1 {
                "Remote publishes prefix file (is less than a day old), using it.".to_string()
            } else if days == 1 {
                "Remote publishes prefix file (is 1 day old), using it.".to_string()
            } else {
                format!("Remote publishes prefix file (is {days} days old), using it.")
            }
        }
        None => "Remote publishes prefix file (age unknown), using it.".to_string(),
    }
}

#[async_trait]
impl RemoteStrategy for RemotePrefixFileStrategy {
    fn id(&self) -> &str {
        PREFIX_FILE_STRATEGY_ID
    }

    fn priority(&self) -> i32 {
        100
    }

    async fn discover(&self, ctx: &StrategyContext<'_>) -> StrategyOutcome {
        let root = match ctx.fetch("/").await {
            Ok(root) => root,
            Err(e) => return StrategyOutcome::Errored(e),
        };
        if let Some(reason) = self.blacklist.check(&root) {
            return StrategyOutcome::Disabled(reason);
        }

        // Nobody reads the local copy while the remote one is being fetched.
        let _guard = self
            .locks
            .lock_for(&ctx.repository.id, &self.remote_path)
            .write()
            .await;

        let response = match ctx.fetch(&self.remote_path).await {
            Ok(response) => response,
            Err(e) => return StrategyOutcome::Errored(e),
        };
        if response.status == 404 {
            tracing::debug!(repository = %ctx.repository.id, "Remote prefix file not available");
            return StrategyOutcome::Failed("Remote does not publish prefix files.".to_string());
        }
        // Only a missing file lets the next strategy run.
        if !response.is_success() {
            return StrategyOutcome::Errored(RoutingError::Remote(format!(
                "Unexpected response code {} for {}",
                response.status, self.remote_path
            )));
        }

        let list = match self.marshaller.unmarshal(&response.body) {
            Ok(list) => list,
            Err(e) => return StrategyOutcome::Errored(e),
        };
        if !list.supported {
            return StrategyOutcome::Disabled("Remote disabled automatic routing.".to_string());
        }
        if list.entries.is_empty() {
            return StrategyOutcome::Disabled("Remote publishes empty prefix file.".to_string());
        }

        let last_modified = response.header("last-modified");
        StrategyOutcome::Success {
            message: age_message(last_modified, Utc::now()),
            entries: list.entries,
            last_modified: modified_of(last_modified).map(|modified| modified.timestamp_millis()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_age_messages() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        assert_eq!(
            age_message(Some("Tue, 10 Mar 2026 08:00:00 GMT"), now),
            "Remote publishes prefix file (is less than a day old), using it."
        );
        assert_eq!(
            age_message(Some("Sat, 07 Mar 2026 08:00:00 GMT"), now),
            "Remote publishes prefix file (is 3 days old), using it."
        );
        assert!(age_message(Some("yesterday"), now).contains("age unknown"));
        assert!(age_message(None, now).contains("age unknown"));
    }

    #[test]
    fn test_modified_of_header() {
        let modified = modified_of(Some("Sat, 07 Mar 2026 08:00:00 GMT")).unwrap();
        assert_eq!(modified, Utc.with_ymd_and_hms(2026, 3, 7, 8, 0, 0).unwrap());
        assert!(modified_of(Some("yesterday")).is_none());
    }
}
