//! Persisted record of the last remote discovery of a proxy.

use crate::error::Result;
use crate::runtime::LockTable;
use autoroute_api::{DiscoveryState, DiscoveryStatus, OperationContext, Repository};
use std::sync::Arc;

const KEY_STATUS: &str = "lastDiscoveryStatus";
const KEY_STRATEGY: &str = "lastDiscoveryStrategy";
const KEY_MESSAGE: &str = "lastDiscoveryMessage";
const KEY_TIMESTAMP: &str = "lastDiscoveryTimestamp";

pub struct DiscoveryStatusStore {
    path: String,
    locks: Arc<LockTable>,
}

impl DiscoveryStatusStore {
    pub fn new(path: impl Into<String>, locks: Arc<LockTable>) -> Self {
        Self {
            path: path.into(),
            locks,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub async fn exists(&self, repository: &Repository) -> Result<bool> {
        let _guard = self.locks.lock_for(&repository.id, &self.path).read().await;
        Ok(repository.storage.exists(&self.path).await?)
    }

    /// A record without a readable status is dropped and reads as absent.
    pub async fn read(&self, repository: &Repository) -> Result<Option<DiscoveryStatus>> {
        let item = {
            let _guard = self.locks.lock_for(&repository.id, &self.path).read().await;
            repository.storage.get(&self.path).await?
        };
        let Some(item) = item else {
            return Ok(None);
        };
        match parse(&String::from_utf8_lossy(&item.content)) {
            Some(status) => Ok(Some(status)),
            None => {
                tracing::warn!(
                    repository = %repository.id,
                    "Discovery status record is corrupt, deleting it"
                );
                self.delete(repository).await?;
                Ok(None)
            }
        }
    }

    pub async fn write(&self, repository: &Repository, status: &DiscoveryStatus) -> Result<()> {
        let content = render(status);
        let _guard = self.locks.lock_for(&repository.id, &self.path).write().await;
        repository
            .storage
            .put(
                &self.path,
                content.as_bytes(),
                "text/plain",
                OperationContext::routing(),
            )
            .await?;
        Ok(())
    }

    pub async fn delete(&self, repository: &Repository) -> Result<bool> {
        let _guard = self.locks.lock_for(&repository.id, &self.path).write().await;
        Ok(repository
            .storage
            .delete(&self.path, OperationContext::routing())
            .await?)
    }
}

fn render(status: &DiscoveryStatus) -> String {
    format!(
        "{KEY_STATUS}={}\n{KEY_STRATEGY}={}\n{KEY_MESSAGE}={}\n{KEY_TIMESTAMP}={}\n",
        status.state.as_str(),
        escape(&status.last_strategy_id),
        escape(&status.last_message),
        status.last_timestamp
    )
}

fn parse(content: &str) -> Option<DiscoveryStatus> {
    let mut state = None;
    let mut strategy = None;
    let mut message = None;
    let mut timestamp = None;
    for line in content.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        match key.trim() {
            KEY_STATUS => state = value.parse::<DiscoveryState>().ok(),
            KEY_STRATEGY => strategy = Some(unescape(value)),
            KEY_MESSAGE => message = Some(unescape(value)),
            KEY_TIMESTAMP => timestamp = value.trim().parse::<i64>().ok(),
            _ => {}
        }
    }
    let mut status = DiscoveryStatus::new(state?);
    if let Some(strategy) = strategy.filter(|s| !s.is_empty()) {
        status.last_strategy_id = strategy;
    }
    if let Some(message) = message {
        status.last_message = message;
    }
    if let Some(timestamp) = timestamp {
        status.last_timestamp = timestamp;
    }
    Some(status)
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FsStorage;
    use autoroute_api::{ProxyFacet, RepositoryKind, RepositoryStorage};

    fn proxy(dir: &tempfile::TempDir) -> Repository {
        Repository::new(
            "central",
            RepositoryKind::Proxy(ProxyFacet::new("https://repo.example.org/maven2/")),
            Arc::new(FsStorage::new(dir.path())),
        )
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let repo = proxy(&dir);
        let store = DiscoveryStatusStore::new("/.meta/discovery.status.txt", Arc::new(LockTable::new()));
        assert!(store.read(&repo).await.unwrap().is_none());

        let status = DiscoveryStatus::with_details(
            DiscoveryState::Unsuccessful,
            "scrape",
            "line one\nline two = \\ok",
            1_700_000_000_000,
        );
        store.write(&repo, &status).await.unwrap();
        assert!(store.exists(&repo).await.unwrap());
        assert_eq!(store.read(&repo).await.unwrap(), Some(status));
    }

    #[tokio::test]
    async fn test_missing_fields_fall_back() {
        let dir = tempfile::tempdir().unwrap();
        let repo = proxy(&dir);
        let store = DiscoveryStatusStore::new("/.meta/discovery.status.txt", Arc::new(LockTable::new()));
        repo.storage
            .put(
                store.path(),
                b"lastDiscoveryStatus=ERROR\nlastDiscoveryTimestamp=oops\n",
                "text/plain",
                OperationContext::routing(),
            )
            .await
            .unwrap();

        let status = store.read(&repo).await.unwrap().unwrap();
        assert_eq!(status.state, DiscoveryState::Error);
        assert_eq!(status.last_strategy_id, "unknown");
        assert_eq!(status.last_message, "");
        assert_eq!(status.last_timestamp, -1);
    }

    #[tokio::test]
    async fn test_bad_status_deletes_record() {
        let dir = tempfile::tempdir().unwrap();
        let repo = proxy(&dir);
        let store = DiscoveryStatusStore::new("/.meta/discovery.status.txt", Arc::new(LockTable::new()));
        repo.storage
            .put(
                store.path(),
                b"lastDiscoveryStatus=SOMETIMES\n",
                "text/plain",
                OperationContext::routing(),
            )
            .await
            .unwrap();

        assert!(store.read(&repo).await.unwrap().is_none());
        assert!(!store.exists(&repo).await.unwrap());
    }
}
