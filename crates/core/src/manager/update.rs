use super::*;
use crate::discovery::local::LOCAL_STRATEGY_ID;
use crate::discovery::prefix_file::PREFIX_FILE_STRATEGY_ID;
use crate::discovery::{DiscoveryResult, OutcomeKind};
use crate::prefix::ArrayListPrefixSource;
use crate::util::now_millis;
use autoroute_api::{DiscoveryState, DiscoveryStatus, ProxyFacet};
use std::collections::HashSet;

impl Manager {
    /// Schedules a background update unless one already runs for the
    /// repository. Returns whether a job was started.
    pub fn update_prefix_file(self: &Arc<Self>, repository: &Repository) -> Result<bool> {
        self.check_update_conditions(repository)?;
        Ok(self.spawn_update(repository, false))
    }

    /// Schedules a background update, cancelling a running one. Returns whether
    /// a running job got cancelled.
    pub fn force_update_prefix_file(self: &Arc<Self>, repository: &Repository) -> Result<bool> {
        self.check_update_conditions(repository)?;
        Ok(self.spawn_update(repository, true))
    }

    /// Runs only the remote prefix file strategy, inline, and publishes the
    /// outcome. Any failure leaves the proxy unpublished.
    pub async fn force_proxy_quick_update(self: &Arc<Self>, repository: &Arc<Repository>) -> Result<()> {
        self.check_update_conditions(repository)?;
        let proxy = repository.proxy().ok_or_else(|| {
            RoutingError::IllegalState(format!(
                "Quick update is only possible for proxies, {} is not one",
                repository.humanized_name()
            ))
        })?;
        if self.executor.cancel_running_with_key(&repository.id) {
            tracing::debug!(
                "Cancelled running update of {} for a quick update",
                repository.humanized_name()
            );
        }

        let cancel = self.cancel_token.child_token();
        let quick = match self
            .update_proxy(repository, proxy, Some(&[PREFIX_FILE_STRATEGY_ID]), &cancel)
            .await
        {
            Ok(candidate) => self.publish_candidate(repository, candidate).await,
            Err(e) => Err(e),
        };
        match quick {
            Ok(()) => Ok(()),
            Err(e) => {
                if let Err(unpublish_error) = self.unpublish(repository).await {
                    tracing::warn!(
                        "Cannot unpublish {} after failed quick update: {}",
                        repository.humanized_name(),
                        unpublish_error
                    );
                }
                Err(e)
            }
        }
    }

    /// Brings a newly added repository's prefix file into existence.
    pub async fn initialize_prefix_file(self: &Arc<Self>, repository: &Arc<Repository>) {
        match self.update_prefix_file(repository) {
            Ok(_) => tracing::info!(
                "Initializing non-existing prefix file of newly added {}",
                repository.humanized_name()
            ),
            Err(e) => {
                tracing::warn!(
                    "Problem during prefix file initialization of newly added {}: {}",
                    repository.humanized_name(),
                    e
                );
                if let Err(e) = self.unpublish(repository).await {
                    tracing::debug!("Cannot unpublish {}: {}", repository.humanized_name(), e);
                }
            }
        }
    }

    pub(super) fn spawn_update(self: &Arc<Self>, repository: &Repository, forced: bool) -> bool {
        let manager = Arc::downgrade(self);
        let id = repository.id.clone();
        let job = move |cancel: CancellationToken| async move {
            let Some(manager) = manager.upgrade() else {
                return;
            };
            // Work on the current definition, not the one seen at dispatch.
            let Some(repository) = manager.registry.repository(&id) else {
                tracing::debug!("Repository {} is gone, update skipped", id);
                return;
            };
            if let Err(e) = manager.update_and_publish(&repository, &cancel).await {
                manager.log_update_failure(&repository, &e);
            }
        };

        if forced {
            let cancelled = self.executor.must_execute(&repository.id, job);
            if cancelled {
                tracing::debug!(
                    "Cancelled running prefix file update job of {} and started a new one",
                    repository.humanized_name()
                );
            }
            cancelled
        } else {
            self.executor.may_execute(&repository.id, job)
        }
    }

    fn log_update_failure(&self, repository: &Repository, error: &RoutingError) {
        match error {
            RoutingError::Cancelled => {
                tracing::debug!("Prefix file update of {} cancelled", repository.humanized_name())
            }
            RoutingError::IllegalState(reason) => tracing::debug!(
                "Repository {} not in state for prefix file update: {}",
                repository.humanized_name(),
                reason
            ),
            e => tracing::warn!(
                "Problem during prefix file update of {}: {}",
                repository.humanized_name(),
                e
            ),
        }
    }

    /// Computes the candidate list for the repository and publishes it, or
    /// unpublishes when there is none. A cancelled run changes nothing.
    pub(super) async fn update_and_publish(
        self: &Arc<Self>,
        repository: &Arc<Repository>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let candidate = match &repository.kind {
            RepositoryKind::Hosted => self.update_hosted(repository, cancel).await?,
            RepositoryKind::Proxy(proxy) => {
                self.update_proxy(repository, proxy, None, cancel).await?
            }
            RepositoryKind::Group(_) => self.update_group(repository, cancel).await?,
            _ => {
                return Err(RoutingError::IllegalState(format!(
                    "Repository {} is not routable",
                    repository.humanized_name()
                )));
            }
        };
        if cancel.is_cancelled() {
            return Err(RoutingError::Cancelled);
        }
        self.publish_candidate(repository, candidate).await
    }

    async fn publish_candidate(
        self: &Arc<Self>,
        repository: &Arc<Repository>,
        candidate: Option<ArrayListPrefixSource>,
    ) -> Result<()> {
        let was_supported = self.is_published(repository).await;
        match candidate {
            Some(source) if source.is_supported() => {
                self.publish(repository, &source).await?;
                if !was_supported {
                    tracing::info!(
                        "Updated and published prefix file of {}",
                        repository.humanized_name()
                    );
                }
            }
            _ => {
                self.unpublish(repository).await?;
                if was_supported {
                    tracing::info!(
                        "Unpublished prefix file of {} (and is marked for noscrape)",
                        repository.humanized_name()
                    );
                }
            }
        }
        Ok(())
    }

    /// Corrupt content counts as not published.
    pub(super) async fn is_published(&self, repository: &Repository) -> bool {
        let source = self.prefix_source_for(repository);
        let _guard = source.lock().read().await;
        source.supported().await.unwrap_or(false)
    }

    async fn update_hosted(
        &self,
        repository: &Repository,
        cancel: &CancellationToken,
    ) -> Result<Option<ArrayListPrefixSource>> {
        let result = self.local_discoverer.discover(repository, cancel).await?;
        Ok(result.into_prefix_source())
    }

    async fn update_proxy(
        &self,
        repository: &Repository,
        proxy: &ProxyFacet,
        only: Option<&[&str]>,
        cancel: &CancellationToken,
    ) -> Result<Option<ArrayListPrefixSource>> {
        self.check_update_conditions(repository)?;

        if proxy.blocked {
            let status = DiscoveryStatus::with_details(
                DiscoveryState::EnabledNotPossible,
                "none",
                "Proxy repository is blocked.",
                now_millis(),
            );
            self.status_store.write(repository, &status).await?;
            return Err(RoutingError::IllegalState(format!(
                "Proxy repository {} is not in state to be updated (is blocked).",
                repository.humanized_name()
            )));
        }

        if !self.discovery_enabled(proxy) {
            tracing::info!("{} remote discovery disabled", repository.humanized_name());
            return Ok(None);
        }

        let remote = match self.remote_discoverer.discover(repository, only, cancel).await {
            Ok(remote) => remote,
            Err(e) => {
                return Err(self
                    .record_discovery_error(repository, DiscoveryStatus::UNKNOWN_STRATEGY, e)
                    .await);
            }
        };
        let candidate = if remote
            .prefix_source()
            .is_some_and(ArrayListPrefixSource::is_supported)
        {
            match self.local_discoverer.discover(repository, cancel).await {
                Ok(local) => merge(remote.prefix_source(), local.prefix_source()),
                Err(e) => {
                    return Err(self
                        .record_discovery_error(repository, LOCAL_STRATEGY_ID, e)
                        .await);
                }
            }
        } else {
            None
        };

        self.status_store
            .write(repository, &discovery_status_of(&remote))
            .await?;
        Ok(candidate)
    }

    /// Records a discovery that ended in an error and hands the error back.
    /// Cancelled jobs keep the previous status.
    async fn record_discovery_error(
        &self,
        repository: &Repository,
        strategy_id: &str,
        error: RoutingError,
    ) -> RoutingError {
        if error.is_cancelled() {
            return error;
        }
        let status = DiscoveryStatus::with_details(
            DiscoveryState::Error,
            strategy_id,
            &error.to_string(),
            now_millis(),
        );
        if let Err(e) = self.status_store.write(repository, &status).await {
            tracing::warn!(
                "Could not record discovery status of {}: {}",
                repository.humanized_name(),
                e
            );
        }
        error
    }

    async fn update_group(
        &self,
        repository: &Repository,
        cancel: &CancellationToken,
    ) -> Result<Option<ArrayListPrefixSource>> {
        let Some(group) = repository.group() else {
            return Ok(None);
        };
        let mut seen = HashSet::new();
        let mut entries = Vec::new();

        for member_id in &group.members {
            if cancel.is_cancelled() {
                return Err(RoutingError::Cancelled);
            }
            let Some(member) = self.registry.repository(member_id) else {
                continue;
            };
            if matches!(member.kind, RepositoryKind::Unsupported) || !member.in_service {
                continue;
            }

            let source = self.prefix_source_for(&member);
            let _guard = source.lock().read().await;
            let list = match source.read().await {
                Ok(Some((list, _))) if list.supported => list,
                Ok(_) | Err(RoutingError::InvalidInput(_)) => {
                    tracing::debug!(
                        "{} member {} has no published prefix file",
                        repository.humanized_name(),
                        member.humanized_name()
                    );
                    return Ok(None);
                }
                Err(e) => return Err(e),
            };
            for entry in list.entries {
                if seen.insert(entry.clone()) {
                    entries.push(entry);
                }
            }
        }
        Ok(Some(ArrayListPrefixSource::new(entries)))
    }

    pub(super) fn discovery_enabled(&self, proxy: &ProxyFacet) -> bool {
        self.config.feature_active && proxy.discovery.enabled
    }

    /// Body of the periodic tick.
    pub(super) async fn may_update_all(self: &Arc<Self>) {
        tracing::trace!("Checking prefix files of all routed repositories");
        for repository in self.registry.repositories() {
            if !self.is_repository_supported(&repository) {
                continue;
            }
            let outcome = async {
                let source = self.prefix_source_for(&repository);
                let exists = {
                    let _guard = source.lock().read().await;
                    source.exists().await?
                };
                if !exists {
                    self.check_update_conditions(&repository)?;
                    self.spawn_update(&repository, true);
                } else if repository.is_proxy() {
                    self.may_update_proxy(&repository).await?;
                }
                Ok::<_, RoutingError>(())
            };
            match outcome.await {
                Ok(()) => {}
                Err(RoutingError::IllegalState(reason)) => tracing::trace!(
                    "Repository {} not in state for periodic update: {}",
                    repository.humanized_name(),
                    reason
                ),
                Err(e) => tracing::warn!(
                    "Problem during periodic update of {}: {}",
                    repository.humanized_name(),
                    e
                ),
            }
        }
    }

    async fn may_update_proxy(self: &Arc<Self>, repository: &Arc<Repository>) -> Result<()> {
        let Some(proxy) = repository.proxy() else {
            return Ok(());
        };
        let discovery = self.status_for(repository).await?.discovery;
        if !discovery.state.is_enabled() {
            return Ok(());
        }

        let retry = matches!(
            discovery.state,
            DiscoveryState::Error | DiscoveryState::EnabledNotPossible
        );
        let due = now_millis() - discovery.last_timestamp > proxy.discovery.interval_millis();
        if !retry && !due {
            return Ok(());
        }
        if retry {
            tracing::debug!(
                "Proxy {} has discovery status {}, updating it",
                repository.humanized_name(),
                discovery.state
            );
        } else {
            tracing::debug!(
                "Proxy {} discovery interval elapsed, updating it",
                repository.humanized_name()
            );
        }

        if !self.update_prefix_file(repository)? {
            tracing::info!(
                "Proxy {} periodic remote discovery skipped as there is an ongoing job updating it, consider raising the update interval for this repository",
                repository.humanized_name()
            );
        }
        Ok(())
    }
}

/// Remote entries followed by local ones, deduplicated. `None` unless both
/// sides produced a list.
fn merge(
    remote: Option<&ArrayListPrefixSource>,
    local: Option<&ArrayListPrefixSource>,
) -> Option<ArrayListPrefixSource> {
    let (remote, local) = (remote?, local?);
    let mut seen = HashSet::new();
    let entries = remote
        .entries()
        .iter()
        .chain(local.entries())
        .filter(|e| seen.insert(e.as_str()))
        .cloned()
        .collect();
    Some(ArrayListPrefixSource::with_last_modified(entries, remote.modified_at()))
}

fn discovery_status_of(result: &DiscoveryResult) -> DiscoveryStatus {
    let Some(last) = result.last_outcome() else {
        return DiscoveryStatus::with_details(
            DiscoveryState::Unsuccessful,
            DiscoveryStatus::UNKNOWN_STRATEGY,
            "No discovery strategy ran.",
            now_millis(),
        );
    };
    let state = match last.kind {
        OutcomeKind::Succeeded => DiscoveryState::Successful,
        OutcomeKind::Errored => DiscoveryState::Error,
        OutcomeKind::Failed | OutcomeKind::Disabled => DiscoveryState::Unsuccessful,
    };
    DiscoveryStatus::with_details(state, &last.strategy_id, &last.message, now_millis())
}
