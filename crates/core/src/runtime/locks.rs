use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

/// Shared/exclusive lock guarding one persisted artifact.
///
/// Not reentrant: a holder of the read side must drop it before asking for
/// the write side.
#[derive(Clone, Default)]
pub struct ArtifactLock {
    inner: Arc<RwLock<()>>,
}

impl ArtifactLock {
    pub async fn read(&self) -> OwnedRwLockReadGuard<()> {
        self.inner.clone().read_owned().await
    }

    pub async fn write(&self) -> OwnedRwLockWriteGuard<()> {
        self.inner.clone().write_owned().await
    }

    pub fn try_write(&self) -> Option<OwnedRwLockWriteGuard<()>> {
        self.inner.clone().try_write_owned().ok()
    }

    pub fn same_as(&self, other: &ArtifactLock) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Process wide table of artifact locks keyed by `(repository id, path)`.
#[derive(Default)]
pub struct LockTable {
    locks: DashMap<(String, String), ArtifactLock>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_for(&self, repository_id: &str, path: &str) -> ArtifactLock {
        self.locks
            .entry((repository_id.to_string(), path.to_string()))
            .or_default()
            .clone()
    }

    /// Forgets every lock of a removed repository.
    pub fn remove_repository(&self, repository_id: &str) {
        self.locks.retain(|(id, _), _| id != repository_id);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
