//! Filesystem backed repository storage.

use async_trait::async_trait;
use autoroute_api::{
    ApiError, ApiResult, ItemAction, ItemEvent, OperationContext, RepositoryEvent,
    RepositoryStorage, StorageEntry, StorageItem,
};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tokio::sync::mpsc;

struct Notifier {
    repository_id: String,
    tx: mpsc::Sender<RepositoryEvent>,
}

/// Stores a repository below a root directory, one file per item.
pub struct FsStorage {
    root: PathBuf,
    notifier: Option<Notifier>,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            notifier: None,
        }
    }

    /// Reports every stored and deleted item of `repository_id` on `tx`.
    pub fn with_notifier(
        mut self,
        repository_id: impl Into<String>,
        tx: mpsc::Sender<RepositoryEvent>,
    ) -> Self {
        self.notifier = Some(Notifier {
            repository_id: repository_id.into(),
            tx,
        });
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> ApiResult<PathBuf> {
        let mut resolved = self.root.clone();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            if segment == ".." || segment == "." {
                return Err(ApiError::InvalidArgument(format!(
                    "relative segment in storage path '{path}'"
                )));
            }
            resolved.push(segment);
        }
        Ok(resolved)
    }

    fn notify(&self, path: &str, action: ItemAction, ctx: OperationContext) {
        if let Some(notifier) = &self.notifier {
            let event = RepositoryEvent::Item(ItemEvent {
                repository_id: notifier.repository_id.clone(),
                path: crate::util::normalize(path, usize::MAX),
                action,
                routing_internal: ctx.routing_internal,
            });
            // Never block a storage write on a slow listener.
            match notifier.tx.try_send(event) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(
                        "Item event queue is full, dropping {} event for {}",
                        notifier.repository_id,
                        path
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::trace!("Item listener for {} is gone", notifier.repository_id);
                }
            }
        }
    }
}

fn modified_millis(metadata: &std::fs::Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(-1, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

#[async_trait]
impl RepositoryStorage for FsStorage {
    async fn get(&self, path: &str) -> ApiResult<Option<StorageItem>> {
        let file = self.resolve(path)?;
        let metadata = match tokio::fs::metadata(&file).await {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let content = match tokio::fs::read(&file).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(StorageItem {
            path: path.to_string(),
            content,
            last_modified: modified_millis(&metadata),
        }))
    }

    async fn put(
        &self,
        path: &str,
        content: &[u8],
        _content_type: &str,
        ctx: OperationContext,
    ) -> ApiResult<()> {
        let file = self.resolve(path)?;
        if file == self.root {
            return Err(ApiError::InvalidArgument("cannot store to root".to_string()));
        }
        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Temp file then rename, readers never see a partial file.
        let mut temp = file.clone().into_os_string();
        temp.push(".tmp");
        tokio::fs::write(&temp, content).await?;
        tokio::fs::rename(&temp, &file).await?;

        self.notify(path, ItemAction::Stored, ctx);
        Ok(())
    }

    async fn delete(&self, path: &str, ctx: OperationContext) -> ApiResult<bool> {
        let target = self.resolve(path)?;
        let deleted = if target == self.root {
            let mut removed = false;
            let mut dir = match tokio::fs::read_dir(&target).await {
                Ok(dir) => dir,
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = dir.next_entry().await? {
                if entry.file_type().await?.is_dir() {
                    tokio::fs::remove_dir_all(entry.path()).await?;
                } else {
                    tokio::fs::remove_file(entry.path()).await?;
                }
                removed = true;
            }
            removed
        } else {
            match tokio::fs::metadata(&target).await {
                Ok(m) if m.is_dir() => {
                    tokio::fs::remove_dir_all(&target).await?;
                    true
                }
                Ok(_) => {
                    tokio::fs::remove_file(&target).await?;
                    true
                }
                Err(e) if e.kind() == ErrorKind::NotFound => false,
                Err(e) => return Err(e.into()),
            }
        };
        if deleted {
            self.notify(path, ItemAction::Deleted, ctx);
        }
        Ok(deleted)
    }

    async fn exists(&self, path: &str) -> ApiResult<bool> {
        let target = self.resolve(path)?;
        Ok(tokio::fs::try_exists(&target).await?)
    }

    async fn list(&self, path: &str) -> ApiResult<Vec<StorageEntry>> {
        let dir_path = self.resolve(path)?;
        let mut dir = match tokio::fs::read_dir(&dir_path).await {
            Ok(dir) => dir,
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => {
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };
        let base = crate::util::normalize(path, usize::MAX);
        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(".tmp") {
                continue;
            }
            let child = if base == "/" {
                format!("/{name}")
            } else {
                format!("{base}/{name}")
            };
            entries.push(StorageEntry {
                path: child,
                is_collection: entry.file_type().await?.is_dir(),
            });
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_list_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new(dir.path());
        let ctx = OperationContext::user();

        storage
            .put("/org/apache/pom.xml", b"<project/>", "text/xml", ctx)
            .await
            .unwrap();
        let item = storage.get("/org/apache/pom.xml").await.unwrap().unwrap();
        assert_eq!(item.content, b"<project/>");
        assert!(item.last_modified > 0);

        let root = storage.list("/").await.unwrap();
        assert_eq!(root.len(), 1);
        assert_eq!(root[0].path, "/org");
        assert!(root[0].is_collection);

        assert!(storage.delete("/org", ctx).await.unwrap());
        assert!(!storage.exists("/org/apache/pom.xml").await.unwrap());
        assert!(!storage.delete("/org", ctx).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_paths() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new(dir.path().join("never-created"));
        assert!(storage.get("/a").await.unwrap().is_none());
        assert!(storage.list("/").await.unwrap().is_empty());
        assert!(storage.get("/../etc/passwd").await.is_err());
    }

    #[tokio::test]
    async fn test_notifier_reports_context() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        let storage = FsStorage::new(dir.path()).with_notifier("releases", tx);

        storage
            .put("/.meta/prefixes.txt", b"x", "text/plain", OperationContext::routing())
            .await
            .unwrap();
        match rx.recv().await.unwrap() {
            RepositoryEvent::Item(item) => {
                assert_eq!(item.repository_id, "releases");
                assert_eq!(item.path, "/.meta/prefixes.txt");
                assert_eq!(item.action, ItemAction::Stored);
                assert!(item.routing_internal);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
