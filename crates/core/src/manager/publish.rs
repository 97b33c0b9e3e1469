use super::*;
use crate::prefix::ListModifier;
use crate::util::{depth, normalize, parent_path};

impl Manager {
    /// Writes the entries of `source` as the repository's prefix file and
    /// announces it. Content that does not survive encoding unpublishes.
    pub async fn publish(
        self: &Arc<Self>,
        repository: &Arc<Repository>,
        source: &dyn PrefixSource,
    ) -> Result<()> {
        let entries = source.read_entries().await?;
        let target = self.prefix_source_for(repository);
        let written = {
            let _guard = target.lock().write().await;
            target.write_entries(&entries).await
        };
        match written {
            Ok(()) => {
                self.announce_published(repository, target);
                Ok(())
            }
            Err(e @ RoutingError::InvalidInput(_)) => {
                tracing::warn!(
                    "Prefix file of {} cannot be published: {}",
                    repository.humanized_name(),
                    e
                );
                self.unpublish(repository).await?;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Marks the repository's prefix file unsupported and announces it.
    pub async fn unpublish(self: &Arc<Self>, repository: &Arc<Repository>) -> Result<()> {
        let target = self.prefix_source_for(repository);
        {
            let _guard = target.lock().write().await;
            target.write_unsupported().await?;
        }
        self.announce_unpublished(repository);
        Ok(())
    }

    pub(super) fn announce_published(self: &Arc<Self>, repository: &Arc<Repository>, source: FilePrefixSource) {
        self.bus.publish(RoutingEvent::Published {
            repository: repository.clone(),
            source,
        });
        self.propagate(repository);
    }

    pub(super) fn announce_unpublished(self: &Arc<Self>, repository: &Arc<Repository>) {
        self.bus.publish(RoutingEvent::Unpublished {
            repository: repository.clone(),
        });
        self.propagate(repository);
    }

    /// Re-runs every containing group as a new job. Never inline: the caller
    /// may still be holding a member lock the group update needs.
    fn propagate(self: &Arc<Self>, repository: &Repository) {
        for group in self.registry.groups_of(&repository.id) {
            if !self.is_repository_supported(&group) || !group.in_service {
                continue;
            }
            tracing::debug!(
                "Propagating change of {} to group {}",
                repository.humanized_name(),
                group.humanized_name()
            );
            self.spawn_update(&group, true);
        }
    }

    /// Adds the prefix covering `path` to a hosted repository's published
    /// list. Returns whether the list changed.
    pub async fn offer_entry(self: &Arc<Self>, repository: &Arc<Repository>, path: &str) -> Result<bool> {
        let entry = if depth(path) <= 1 {
            normalize(path, usize::MAX)
        } else {
            parent_path(path)
        };
        self.modify_hosted(repository, |modifier| modifier.offer_entry(&entry))
            .await
    }

    /// Removes the prefixes at or below `path` from a hosted repository's
    /// published list. Returns whether the list changed.
    pub async fn revoke_entry(self: &Arc<Self>, repository: &Arc<Repository>, path: &str) -> Result<bool> {
        self.modify_hosted(repository, |modifier| modifier.revoke_entry(path))
            .await
    }

    /// Evaluates `change` under the read lock first, and only when it would
    /// change something re-applies it on fresh state under the write lock.
    async fn modify_hosted<F>(self: &Arc<Self>, repository: &Arc<Repository>, change: F) -> Result<bool>
    where
        F: Fn(&mut ListModifier) -> bool,
    {
        if !repository.is_hosted() {
            return Err(RoutingError::IllegalState(format!(
                "Incremental prefix file maintenance is only possible for hosted repositories, {} is not one",
                repository.humanized_name()
            )));
        }
        // A full update is about to overwrite the list anyway.
        if self.executor.has_running_with_key(&repository.id) {
            return Ok(false);
        }

        let source = self.prefix_source_for(repository);
        let lock = source.lock().clone();
        let mut modifier = {
            let _read = lock.read().await;
            if !source.supported().await? {
                return Ok(false);
            }
            let mut modifier = ListModifier::new(source.clone(), self.config.local_scrape_depth).await?;
            if !change(&mut modifier) {
                return Ok(false);
            }
            modifier
        };

        let applied = {
            let _write = lock.write().await;
            if !source.supported().await? {
                return Ok(false);
            }
            modifier.reset().await?;
            if change(&mut modifier) {
                modifier.apply().await
            } else {
                Ok(false)
            }
        };

        match applied {
            Ok(true) => {
                self.announce_published(repository, source);
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(e @ RoutingError::InvalidInput(_)) => {
                self.unpublish(repository).await?;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}
