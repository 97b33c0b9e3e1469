use super::*;
use crate::util::now_millis;
use autoroute_api::{
    DiscoveryConfig, DiscoveryState, DiscoveryStatus, PublishingStatus, RoutingStatus,
};

impl Manager {
    /// Publishing and discovery state of a repository, as shown to
    /// administrators.
    pub async fn status_for(&self, repository: &Repository) -> Result<RoutingStatus> {
        let discovery_enabled = repository
            .proxy()
            .is_some_and(|proxy| self.discovery_enabled(proxy));

        let source = self.prefix_source_for(repository);
        let published = {
            let _guard = source.lock().read().await;
            match source.read().await {
                Ok(Some((list, last_modified))) if list.supported => Some(last_modified),
                Ok(_) | Err(RoutingError::InvalidInput(_)) => None,
                Err(e) => return Err(e),
            }
        };

        let publishing = match published {
            Some(last_modified) => PublishingStatus::published(
                "Prefix file published successfully.",
                last_modified,
                source.path(),
            ),
            None => PublishingStatus::not_published(
                self.not_published_message(repository, discovery_enabled)
                    .await,
            ),
        };

        let discovery = if !repository.is_proxy() {
            DiscoveryStatus::new(DiscoveryState::NotAProxy)
        } else if !discovery_enabled {
            DiscoveryStatus::new(DiscoveryState::Disabled)
        } else if self.executor.has_running_with_key(&repository.id) {
            DiscoveryStatus::new(DiscoveryState::EnabledInProgress)
        } else {
            match self.status_store.read(repository).await? {
                Some(status) => status,
                None if !repository.in_service => DiscoveryStatus::with_details(
                    DiscoveryState::EnabledNotPossible,
                    "none",
                    "Repository is out of service.",
                    now_millis(),
                ),
                None => DiscoveryStatus::new(DiscoveryState::EnabledInProgress),
            }
        };

        Ok(RoutingStatus {
            publishing,
            discovery,
        })
    }

    async fn not_published_message(&self, repository: &Repository, discovery_enabled: bool) -> String {
        match &repository.kind {
            RepositoryKind::Group(group) => {
                let mut lacking = Vec::new();
                for member_id in &group.members {
                    let Some(member) = self.registry.repository(member_id) else {
                        continue;
                    };
                    if !self.is_published(&member).await {
                        lacking.push(member.name.clone());
                    }
                }
                format!(
                    "Publishing not possible, following members have no published prefix file: {}",
                    lacking.join(", ")
                )
            }
            RepositoryKind::Proxy(_) if discovery_enabled => {
                "Discovery in progress or unable to discover remote content (see discovery status)."
                    .to_string()
            }
            RepositoryKind::Proxy(_) => "Remote discovery not enabled.".to_string(),
            RepositoryKind::Hosted => "Check logs for more details.".to_string(),
            RepositoryKind::Shadow => {
                "Unsupported repository type (only hosted, proxy and groups are supported)."
                    .to_string()
            }
            RepositoryKind::Unsupported => {
                "Unsupported repository format (only repositories with a path based layout are supported)."
                    .to_string()
            }
        }
    }

    /// Effective discovery settings of a proxy: the stored ones, switched off
    /// while the feature is inactive.
    pub fn remote_discovery_config(&self, repository: &Repository) -> Result<DiscoveryConfig> {
        let proxy = repository.proxy().ok_or_else(|| not_a_proxy(repository))?;
        Ok(DiscoveryConfig {
            enabled: self.discovery_enabled(proxy),
            ..proxy.discovery
        })
    }

    /// Stores new discovery settings. Switching discovery on or off triggers
    /// an update.
    pub fn set_remote_discovery_config(
        self: &Arc<Self>,
        repository: &Repository,
        config: DiscoveryConfig,
    ) -> Result<()> {
        let proxy = repository.proxy().ok_or_else(|| not_a_proxy(repository))?;
        let enabled_changed = proxy.discovery.enabled != config.enabled;
        self.registry.set_discovery_config(&repository.id, config)?;

        if enabled_changed {
            let updated = self.repository(&repository.id)?;
            self.update_prefix_file(&updated)?;
        }
        Ok(())
    }
}

fn not_a_proxy(repository: &Repository) -> RoutingError {
    RoutingError::InvalidArgument(format!(
        "Repository {} is not a proxy",
        repository.humanized_name()
    ))
}
