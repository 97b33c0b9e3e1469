use crate::discovery::DiscoveryResult;
use crate::discovery::strategy::{RemoteStrategy, StrategyContext, StrategyOutcome};
use crate::error::{Result, RoutingError};
use crate::prefix::ArrayListPrefixSource;
use crate::util::now_millis;
use autoroute_api::{RemoteClientFactory, Repository};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Runs the remote strategies in priority order until one decides.
pub struct RemoteContentDiscoverer {
    strategies: Vec<Arc<dyn RemoteStrategy>>,
    client_factory: Arc<dyn RemoteClientFactory>,
}

impl RemoteContentDiscoverer {
    pub fn new(
        mut strategies: Vec<Arc<dyn RemoteStrategy>>,
        client_factory: Arc<dyn RemoteClientFactory>,
    ) -> Self {
        strategies.sort_by_key(|s| s.priority());
        Self {
            strategies,
            client_factory,
        }
    }

    pub fn strategy_ids(&self) -> Vec<String> {
        self.strategies.iter().map(|s| s.id().to_string()).collect()
    }

    /// Runs all strategies, or only those named in `only`.
    pub async fn discover(
        &self,
        repository: &Repository,
        only: Option<&[&str]>,
        cancel: &CancellationToken,
    ) -> Result<DiscoveryResult> {
        let proxy = repository.proxy().ok_or_else(|| {
            RoutingError::IllegalState(format!(
                "Repository {} is not a proxy",
                repository.humanized_name()
            ))
        })?;

        let mut result = DiscoveryResult::new();
        let client = match self.client_factory.client_for(repository, proxy) {
            Ok(client) => client,
            Err(e) => {
                result.record_error("client", e.into());
                return Ok(result);
            }
        };

        let ctx = StrategyContext {
            repository,
            proxy,
            client,
            cancel: cancel.clone(),
        };

        let selected = self
            .strategies
            .iter()
            .filter(|s| only.is_none_or(|ids| ids.contains(&s.id())));
        for strategy in selected {
            if cancel.is_cancelled() {
                return Err(RoutingError::Cancelled);
            }
            let id = strategy.id();
            tracing::debug!(repository = %repository.id, strategy = id, "Running remote strategy");

            match strategy.discover(&ctx).await {
                StrategyOutcome::Success {
                    message,
                    entries,
                    last_modified,
                } => {
                    let modified = last_modified.unwrap_or_else(now_millis);
                    let source = ArrayListPrefixSource::with_last_modified(entries, modified);
                    result.record_success(id, message, source);
                    break;
                }
                StrategyOutcome::Disabled(message) => {
                    result.record_disabled(id, message);
                    break;
                }
                StrategyOutcome::Errored(RoutingError::Cancelled) => {
                    return Err(RoutingError::Cancelled);
                }
                StrategyOutcome::Errored(e) => {
                    tracing::debug!(repository = %repository.id, strategy = id, "Strategy error: {}", e);
                    result.record_error(id, e);
                    break;
                }
                StrategyOutcome::Failed(message) => {
                    result.record_failure(id, message);
                }
            }
        }
        Ok(result)
    }
}
