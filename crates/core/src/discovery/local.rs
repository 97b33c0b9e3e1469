use crate::discovery::DiscoveryResult;
use crate::error::{Result, RoutingError};
use crate::prefix::{ArrayListPrefixSource, ParentTree};
use crate::util::{depth, parent_path};
use autoroute_api::Repository;
use tokio_util::sync::CancellationToken;

pub const LOCAL_STRATEGY_ID: &str = "local";

/// Derives prefix entries from what a repository already holds.
#[derive(Debug, Clone)]
pub struct LocalContentDiscoverer {
    max_depth: usize,
}

impl LocalContentDiscoverer {
    pub fn new(max_depth: usize) -> Result<Self> {
        if max_depth == 0 {
            return Err(RoutingError::InvalidArgument(
                "local scrape depth must be greater than zero".to_string(),
            ));
        }
        Ok(Self { max_depth })
    }

    /// Walks the repository storage depth first. Storage failures end up in
    /// the result as a failed outcome; only cancellation is an error.
    pub async fn discover(
        &self,
        repository: &Repository,
        cancel: &CancellationToken,
    ) -> Result<DiscoveryResult> {
        let mut result = DiscoveryResult::new();
        match self.walk(repository, cancel).await {
            Ok(entries) => {
                let message = if entries.is_empty() {
                    format!("Repository {} is empty.", repository.humanized_name())
                } else {
                    format!(
                        "Discovered {} entries in {}.",
                        entries.len(),
                        repository.humanized_name()
                    )
                };
                result.record_success(
                    LOCAL_STRATEGY_ID,
                    message,
                    ArrayListPrefixSource::new(entries),
                );
            }
            Err(RoutingError::Cancelled) => return Err(RoutingError::Cancelled),
            Err(e) => {
                tracing::debug!(
                    repository = %repository.id,
                    "Local content walk failed: {}",
                    e
                );
                result.record_failure(LOCAL_STRATEGY_ID, format!("Walk stopped: {e}"));
            }
        }
        Ok(result)
    }

    async fn walk(&self, repository: &Repository, cancel: &CancellationToken) -> Result<Vec<String>> {
        let mut tree = ParentTree::new();
        let mut stack = vec!["/".to_string()];

        while let Some(collection) = stack.pop() {
            if cancel.is_cancelled() {
                return Err(RoutingError::Cancelled);
            }
            for entry in repository.storage.list(&collection).await? {
                let name = entry.path.rsplit('/').next().unwrap_or_default();
                if name.starts_with('.') {
                    continue;
                }
                let entry_depth = depth(&entry.path);
                if entry.is_collection {
                    tree.add_path(&entry.path);
                    if entry_depth < self.max_depth {
                        stack.push(entry.path);
                    }
                } else if entry_depth == 1 {
                    tree.add_path(&entry.path);
                } else {
                    tree.add_path(&parent_path(&entry.path));
                }
            }
        }

        tree.cut(self.max_depth);
        Ok(tree.leaf_paths())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FsStorage;
    use autoroute_api::{OperationContext, RepositoryKind, RepositoryStorage};
    use std::sync::Arc;

    fn hosted(dir: &tempfile::TempDir) -> (Repository, Arc<FsStorage>) {
        let storage = Arc::new(FsStorage::new(dir.path()));
        let repo = Repository::new("releases", RepositoryKind::Hosted, storage.clone());
        (repo, storage)
    }

    #[tokio::test]
    async fn test_empty_repository_succeeds_without_entries() {
        let dir = tempfile::tempdir().unwrap();
        let (repo, _) = hosted(&dir);
        let discoverer = LocalContentDiscoverer::new(2).unwrap();
        let result = discoverer.discover(&repo, &CancellationToken::new()).await.unwrap();
        assert!(result.is_successful());
        assert!(result.prefix_source().unwrap().entries().is_empty());
    }

    #[tokio::test]
    async fn test_entries_are_depth_capped_and_skip_hidden() {
        let dir = tempfile::tempdir().unwrap();
        let (repo, storage) = hosted(&dir);
        let ctx = OperationContext::user();
        for path in [
            "/org/apache/maven/maven-core/3.0/maven-core-3.0.pom",
            "/org/codehaus/plexus/x.pom",
            "/com/a.jar",
            "/archetype-catalog.xml",
            "/.meta/prefixes.txt",
        ] {
            storage.put(path, b"x", "application/octet-stream", ctx).await.unwrap();
        }

        let discoverer = LocalContentDiscoverer::new(2).unwrap();
        let result = discoverer.discover(&repo, &CancellationToken::new()).await.unwrap();
        let entries = result.prefix_source().unwrap().entries().to_vec();
        assert_eq!(
            entries,
            vec!["/archetype-catalog.xml", "/com", "/org/apache", "/org/codehaus"]
        );
    }

    #[tokio::test]
    async fn test_cancelled_walk_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (repo, _) = hosted(&dir);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = LocalContentDiscoverer::new(2)
            .unwrap()
            .discover(&repo, &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_zero_depth_is_rejected() {
        assert!(LocalContentDiscoverer::new(0).is_err());
    }
}
