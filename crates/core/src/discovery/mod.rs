//! Content discovery: local storage walks and the remote strategy chain.

pub mod blacklist;
pub mod local;
pub mod prefix_file;
pub mod remote;
pub mod scrape;
pub mod strategy;

use crate::error::RoutingError;
use crate::prefix::ArrayListPrefixSource;

pub use blacklist::Blacklist;
pub use local::LocalContentDiscoverer;
pub use prefix_file::RemotePrefixFileStrategy;
pub use remote::RemoteContentDiscoverer;
pub use scrape::{HtmlIndexScraper, Page, ScrapeContext, ScrapeStrategy, Scraper};
pub use strategy::{RemoteStrategy, StrategyContext, StrategyOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Succeeded,
    /// Ordinary failure, the next strategy may still succeed.
    Failed,
    /// The strategy decided routing must not be used for this repository.
    Disabled,
    Errored,
}

/// One attempt of one strategy.
#[derive(Debug)]
pub struct Outcome {
    pub strategy_id: String,
    pub kind: OutcomeKind,
    pub message: String,
    pub prefix_source: Option<ArrayListPrefixSource>,
    pub error: Option<RoutingError>,
}

impl Outcome {
    pub fn is_successful(&self) -> bool {
        self.kind == OutcomeKind::Succeeded
    }

    pub fn is_routing_enabled(&self) -> bool {
        self.kind != OutcomeKind::Disabled
    }
}

/// Ordered trail of outcomes. The last one decides.
#[derive(Debug, Default)]
pub struct DiscoveryResult {
    outcomes: Vec<Outcome>,
}

impl DiscoveryResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(
        &mut self,
        strategy_id: &str,
        message: impl Into<String>,
        source: ArrayListPrefixSource,
    ) {
        self.push(strategy_id, OutcomeKind::Succeeded, message.into(), Some(source), None);
    }

    pub fn record_failure(&mut self, strategy_id: &str, message: impl Into<String>) {
        self.push(strategy_id, OutcomeKind::Failed, message.into(), None, None);
    }

    pub fn record_disabled(&mut self, strategy_id: &str, message: impl Into<String>) {
        self.push(strategy_id, OutcomeKind::Disabled, message.into(), None, None);
    }

    pub fn record_error(&mut self, strategy_id: &str, error: RoutingError) {
        let message = match &error {
            RoutingError::InvalidInput(reason) => format!(
                "Remote strategy {strategy_id} detected invalid input, results discarded: {reason}"
            ),
            other => other.to_string(),
        };
        self.push(strategy_id, OutcomeKind::Errored, message, None, Some(error));
    }

    fn push(
        &mut self,
        strategy_id: &str,
        kind: OutcomeKind,
        message: String,
        prefix_source: Option<ArrayListPrefixSource>,
        error: Option<RoutingError>,
    ) {
        self.outcomes.push(Outcome {
            strategy_id: strategy_id.to_string(),
            kind,
            message,
            prefix_source,
            error,
        });
    }

    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    pub fn last_outcome(&self) -> Option<&Outcome> {
        self.outcomes.last()
    }

    pub fn is_successful(&self) -> bool {
        self.last_outcome().is_some_and(Outcome::is_successful)
    }

    pub fn prefix_source(&self) -> Option<&ArrayListPrefixSource> {
        self.outcomes
            .iter()
            .rev()
            .find(|o| o.is_successful())
            .and_then(|o| o.prefix_source.as_ref())
    }

    pub fn into_prefix_source(self) -> Option<ArrayListPrefixSource> {
        self.outcomes
            .into_iter()
            .rev()
            .find(|o| o.is_successful())
            .and_then(|o| o.prefix_source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_outcome_decides() {
        let mut result = DiscoveryResult::new();
        assert!(!result.is_successful());

        result.record_failure("prefix-file", "Remote does not publish prefix files.");
        result.record_success(
            "scrape",
            "ok",
            ArrayListPrefixSource::new(vec!["/org".to_string()]),
        );
        assert!(result.is_successful());
        assert_eq!(result.last_outcome().unwrap().strategy_id, "scrape");
        assert_eq!(result.prefix_source().unwrap().entries(), ["/org".to_string()]);
    }

    #[test]
    fn test_disabled_is_not_routing_enabled() {
        let mut result = DiscoveryResult::new();
        result.record_disabled("prefix-file", "Remote disabled automatic routing.");
        let last = result.last_outcome().unwrap();
        assert!(!last.is_routing_enabled());
        assert!(!result.is_successful());
        assert!(result.prefix_source().is_none());
    }

    #[test]
    fn test_invalid_input_discards_results() {
        let mut result = DiscoveryResult::new();
        result.record_error(
            "prefix-file",
            RoutingError::InvalidInput("prefix file has more than 10000 entries".to_string()),
        );
        assert_eq!(
            result.last_outcome().unwrap().message,
            "Remote strategy prefix-file detected invalid input, results discarded: prefix file has more than 10000 entries"
        );

        result.record_error("client", RoutingError::Remote("connection refused".to_string()));
        assert_eq!(result.last_outcome().unwrap().message, "Remote error: connection refused");
    }
}
