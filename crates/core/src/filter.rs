//! Request-time fast path: rejects paths a proxy's remote provably lacks.

use crate::error::Result;
use crate::events::{EventBus, RoutingEvent};
use crate::prefix::{FilePrefixSource, PathMatcher};
use autoroute_api::Repository;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A request refused without asking the remote.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Automatic routing rejected '{path}' of repository '{repository_id}': remote does not have it")]
pub struct Rejection {
    pub repository_id: String,
    pub path: String,
}

/// One matcher per proxy with a published prefix file. No matcher means no
/// optimization and every request is allowed.
#[derive(Default)]
pub struct RequestFilter {
    matchers: DashMap<String, Arc<PathMatcher>>,
}

impl RequestFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allowed(&self, repository_id: &str, path: &str) -> bool {
        match self.matchers.get(repository_id) {
            Some(matcher) => matcher.matches(path),
            None => true,
        }
    }

    pub fn check(&self, repository_id: &str, path: &str) -> std::result::Result<(), Rejection> {
        if self.allowed(repository_id, path) {
            return Ok(());
        }
        tracing::debug!(repository = repository_id, path, "Request rejected by routing filter");
        Err(Rejection {
            repository_id: repository_id.to_string(),
            path: path.to_string(),
        })
    }

    pub fn has_matcher(&self, repository_id: &str) -> bool {
        self.matchers.contains_key(repository_id)
    }

    pub async fn on_published(
        &self,
        repository: &Repository,
        source: &FilePrefixSource,
    ) -> Result<()> {
        if !repository.is_proxy() {
            return Ok(());
        }
        let read = {
            let _guard = source.lock().read().await;
            source.read().await?
        };
        match read {
            Some((list, _)) if list.supported => {
                let matcher = PathMatcher::new(&list.entries, usize::MAX)?;
                tracing::debug!(
                    repository = %repository.id,
                    "Routing filter loaded {} entries",
                    list.entries.len()
                );
                self.matchers.insert(repository.id.clone(), Arc::new(matcher));
            }
            _ => {
                self.matchers.remove(&repository.id);
            }
        }
        Ok(())
    }

    pub fn on_unpublished(&self, repository_id: &str) {
        if self.matchers.remove(repository_id).is_some() {
            tracing::debug!(repository = repository_id, "Routing filter dropped matcher");
        }
    }

    /// Missed notifications may have unpublished anything, so every matcher goes
    /// until the next publish brings it back.
    pub fn on_lagged(&self, skipped: u64) {
        tracing::warn!(
            "Routing filter missed {} notifications, allowing all requests until republished",
            skipped
        );
        self.matchers.clear();
    }

    async fn handle(&self, event: RoutingEvent) {
        match event {
            RoutingEvent::Published { repository, source } => {
                if let Err(e) = self.on_published(&repository, &source).await {
                    tracing::warn!(
                        repository = %repository.id,
                        "Cannot load published prefix file, allowing all requests: {}",
                        e
                    );
                    self.on_unpublished(&repository.id);
                }
            }
            RoutingEvent::Unpublished { repository } => self.on_unpublished(&repository.id),
        }
    }

    /// Follows `bus` until `cancel` fires. Subscribes before returning, so
    /// events published afterwards are never missed.
    pub fn spawn_listener(
        self: &Arc<Self>,
        bus: &EventBus,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let mut rx = bus.subscribe();
        let filter = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = rx.recv() => match received {
                        Ok(event) => {
                            let Some(filter) = filter.upgrade() else {
                                break;
                            };
                            filter.handle(event).await;
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            let Some(filter) = filter.upgrade() else {
                                break;
                            };
                            filter.on_lagged(skipped);
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
            tracing::debug!("Routing filter listener stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefix::TextMarshaller;
    use crate::runtime::ArtifactLock;
    use crate::storage::FsStorage;
    use autoroute_api::{ProxyFacet, RepositoryKind};

    fn proxy_with_source(dir: &tempfile::TempDir) -> (Repository, FilePrefixSource) {
        let storage = Arc::new(FsStorage::new(dir.path()));
        let repo = Repository::new(
            "central",
            RepositoryKind::Proxy(ProxyFacet::new("https://repo.example.org/")),
            storage.clone(),
        );
        let source = FilePrefixSource::new(
            "central",
            "/.meta/prefixes.txt",
            storage,
            TextMarshaller::default(),
            ArtifactLock::default(),
        );
        (repo, source)
    }

    #[tokio::test]
    async fn test_no_matcher_allows_everything() {
        let filter = RequestFilter::new();
        assert!(filter.allowed("central", "/anything/at/all"));
        assert!(filter.check("central", "/x").is_ok());
    }

    #[tokio::test]
    async fn test_published_list_rejects_unknown_paths() {
        let dir = tempfile::tempdir().unwrap();
        let (repo, source) = proxy_with_source(&dir);
        source
            .write_entries(&["/org/apache".to_string()])
            .await
            .unwrap();

        let filter = RequestFilter::new();
        filter.on_published(&repo, &source).await.unwrap();
        assert!(filter.allowed("central", "/org/apache/maven/pom.xml"));
        let rejection = filter.check("central", "/com/example/a.jar").unwrap_err();
        assert_eq!(rejection.path, "/com/example/a.jar");

        filter.on_unpublished("central");
        assert!(filter.allowed("central", "/com/example/a.jar"));
    }

    #[tokio::test]
    async fn test_unsupported_publish_drops_matcher() {
        let dir = tempfile::tempdir().unwrap();
        let (repo, source) = proxy_with_source(&dir);
        source.write_entries(&["/org".to_string()]).await.unwrap();
        let filter = RequestFilter::new();
        filter.on_published(&repo, &source).await.unwrap();
        assert!(filter.has_matcher("central"));

        source.write_unsupported().await.unwrap();
        filter.on_published(&repo, &source).await.unwrap();
        assert!(!filter.has_matcher("central"));
    }

    #[tokio::test]
    async fn test_lagged_listener_drops_all_matchers() {
        let dir = tempfile::tempdir().unwrap();
        let (repo, source) = proxy_with_source(&dir);
        source.write_entries(&["/org".to_string()]).await.unwrap();
        let filter = Arc::new(RequestFilter::new());
        filter.on_published(&repo, &source).await.unwrap();
        assert!(!filter.allowed("central", "/com/example"));

        let bus = EventBus::new(1);
        let cancel = CancellationToken::new();
        let handle = filter.spawn_listener(&bus, cancel.clone());
        // Nothing about "central" is delivered, only the lag reveals it may be stale.
        for id in ["snapshots", "releases", "thirdparty"] {
            let other = Repository::new(
                id,
                RepositoryKind::Proxy(ProxyFacet::new("https://other.example.org/")),
                Arc::new(FsStorage::new(dir.path())),
            );
            bus.publish(RoutingEvent::Unpublished {
                repository: Arc::new(other),
            });
        }

        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while filter.has_matcher("central") {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert!(filter.allowed("central", "/com/example"));

        cancel.cancel();
        handle.await.unwrap();
    }
}
