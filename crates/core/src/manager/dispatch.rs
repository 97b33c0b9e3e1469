use super::*;
use autoroute_api::{ItemAction, ItemEvent};

impl Manager {
    /// True when the item is the repository's own prefix file.
    pub fn is_event_about_prefix_file(&self, event: &ItemEvent) -> bool {
        crate::util::normalize(&event.path, usize::MAX)
            == crate::util::normalize(&self.config.local_prefix_file_path, usize::MAX)
    }

    /// Reacts to one repository notification.
    pub async fn handle_repository_event(self: &Arc<Self>, event: RepositoryEvent) -> Result<()> {
        match event {
            RepositoryEvent::Added { repository_id } => {
                let repository = self.repository(&repository_id)?;
                if self.is_repository_supported(&repository) {
                    self.initialize_prefix_file(&repository).await;
                }
            }
            RepositoryEvent::Removed { repository } => {
                self.executor.cancel_running_with_key(&repository.id);
                // Storage is going away with the repository; only tell listeners.
                self.announce_unpublished(&repository);
                self.locks.remove_repository(&repository.id);
            }
            RepositoryEvent::ConfigurationChanged {
                repository_id,
                remote_url_changed,
                members_changed,
                returned_to_service,
            } => {
                let repository = self.repository(&repository_id)?;
                if !self.is_repository_supported(&repository) {
                    return Ok(());
                }
                if remote_url_changed && repository.is_proxy() {
                    self.force_update_prefix_file(&repository)?;
                } else if members_changed || returned_to_service {
                    self.update_prefix_file(&repository)?;
                }
            }
            RepositoryEvent::Item(item) => {
                if item.routing_internal || self.is_event_about_prefix_file(&item) {
                    return Ok(());
                }
                let repository = self.repository(&item.repository_id)?;
                if !repository.is_hosted() || !repository.in_service {
                    return Ok(());
                }
                match item.action {
                    ItemAction::Stored | ItemAction::Cached => {
                        self.offer_entry(&repository, &item.path).await?;
                    }
                    ItemAction::Deleted => {
                        self.revoke_entry(&repository, &item.path).await?;
                    }
                }
            }
        }
        Ok(())
    }

    pub(super) fn spawn_dispatcher(self: &Arc<Self>, mut rx: mpsc::Receiver<RepositoryEvent>) {
        let manager = Arc::downgrade(self);
        let cancel_token = self.cancel_token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => break,
                    event = rx.recv() => {
                        let Some(event) = event else {
                            break;
                        };
                        let Some(manager) = manager.upgrade() else {
                            break;
                        };
                        let repository_id = event.repository_id().to_string();
                        match manager.handle_repository_event(event).await {
                            Ok(()) => {}
                            Err(RoutingError::IllegalState(reason)) => tracing::debug!(
                                "Event for {} ignored: {}",
                                repository_id,
                                reason
                            ),
                            Err(e) => tracing::warn!(
                                "Problem handling event for {}: {}",
                                repository_id,
                                e
                            ),
                        }
                    }
                }
            }
            tracing::debug!("Routing event dispatcher stopped");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryRepositoryRegistry;

    #[test]
    fn test_prefix_file_events_are_recognized() {
        let registry = Arc::new(InMemoryRepositoryRegistry::new());
        let manager = Manager::builder(RoutingConfig::default(), registry)
            .build()
            .unwrap();
        let event = |path: &str| ItemEvent {
            repository_id: "releases".to_string(),
            path: path.to_string(),
            action: ItemAction::Stored,
            routing_internal: false,
        };
        assert!(manager.is_event_about_prefix_file(&event("/.meta/prefixes.txt")));
        assert!(!manager.is_event_about_prefix_file(&event("/.meta/other.txt")));
        assert!(!manager.is_event_about_prefix_file(&event("/org/foo.jar")));
    }
}
