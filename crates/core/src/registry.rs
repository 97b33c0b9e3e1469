use autoroute_api::{
    ApiError, ApiResult, DiscoveryConfig, Repository, RepositoryKind, RepositoryRegistry,
};
use std::sync::{Arc, RwLock};

/// Registry held in memory, in registration order.
#[derive(Default)]
pub struct InMemoryRepositoryRegistry {
    repositories: RwLock<Vec<Arc<Repository>>>,
}

impl InMemoryRepositoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a repository, returning the stored handle.
    pub fn register(&self, repository: Repository) -> Arc<Repository> {
        let repository = Arc::new(repository);
        let mut repositories = self.repositories.write().unwrap_or_else(|e| e.into_inner());
        match repositories.iter_mut().find(|r| r.id == repository.id) {
            Some(existing) => *existing = repository.clone(),
            None => repositories.push(repository.clone()),
        }
        repository
    }

    pub fn unregister(&self, id: &str) -> Option<Arc<Repository>> {
        let mut repositories = self.repositories.write().unwrap_or_else(|e| e.into_inner());
        let index = repositories.iter().position(|r| r.id == id)?;
        Some(repositories.remove(index))
    }

    /// Applies `change` to a copy of the repository and stores the copy.
    pub fn update<F>(&self, id: &str, change: F) -> ApiResult<Arc<Repository>>
    where
        F: FnOnce(&mut Repository),
    {
        let mut repositories = self.repositories.write().unwrap_or_else(|e| e.into_inner());
        let slot = repositories
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| ApiError::NotFound(format!("repository '{id}'")))?;
        let mut updated = Repository::clone(slot);
        change(&mut updated);
        *slot = Arc::new(updated);
        Ok(slot.clone())
    }

    pub fn ids(&self) -> Vec<String> {
        self.repositories()
            .iter()
            .map(|r| r.id.clone())
            .collect()
    }
}

impl RepositoryRegistry for InMemoryRepositoryRegistry {
    fn repositories(&self) -> Vec<Arc<Repository>> {
        self.repositories
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn repository(&self, id: &str) -> Option<Arc<Repository>> {
        self.repositories
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    fn groups_of(&self, id: &str) -> Vec<Arc<Repository>> {
        self.repositories
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| r.group().is_some_and(|g| g.members.iter().any(|m| m == id)))
            .cloned()
            .collect()
    }

    fn set_discovery_config(&self, id: &str, config: DiscoveryConfig) -> ApiResult<()> {
        let mut result = Ok(());
        self.update(id, |repository| match &mut repository.kind {
            RepositoryKind::Proxy(proxy) => proxy.discovery = config,
            _ => {
                result = Err(ApiError::InvalidArgument(format!(
                    "repository '{id}' is not a proxy"
                )))
            }
        })?;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FsStorage;
    use autoroute_api::{GroupFacet, ProxyFacet};
    use std::time::Duration;

    fn storage() -> Arc<FsStorage> {
        Arc::new(FsStorage::new(std::env::temp_dir().join("autoroute-registry-test")))
    }

    #[test]
    fn test_groups_of_and_config_update() {
        let registry = InMemoryRepositoryRegistry::new();
        registry.register(Repository::new(
            "central",
            RepositoryKind::Proxy(ProxyFacet::new("https://repo.example.org/")),
            storage(),
        ));
        registry.register(Repository::new("releases", RepositoryKind::Hosted, storage()));
        registry.register(Repository::new(
            "public",
            RepositoryKind::Group(GroupFacet {
                members: vec!["releases".to_string(), "central".to_string()],
            }),
            storage(),
        ));

        let groups = registry.groups_of("central");
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].id, "public");

        let config = DiscoveryConfig::new(false, Duration::from_secs(7200));
        registry.set_discovery_config("central", config).unwrap();
        let central = registry.repository("central").unwrap();
        assert_eq!(central.proxy().unwrap().discovery, config);

        assert!(registry.set_discovery_config("releases", config).is_err());
        assert!(registry.set_discovery_config("missing", config).is_err());
        assert_eq!(registry.ids(), vec!["central", "releases", "public"]);
    }
}
