use crate::error::ApiResult;
use async_trait::async_trait;

/// A stored file together with its metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageItem {
    pub path: String,
    pub content: Vec<u8>,
    /// Epoch millis.
    pub last_modified: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEntry {
    pub path: String,
    pub is_collection: bool,
}

/// Context attached to storage writes so listeners can tell routing's own
/// writes apart from user content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationContext {
    pub routing_internal: bool,
}

impl OperationContext {
    pub fn user() -> Self {
        Self::default()
    }

    pub fn routing() -> Self {
        Self {
            routing_internal: true,
        }
    }
}

/// Hierarchical storage of a single repository. Paths are absolute,
/// `/`-separated and rooted at the repository.
#[async_trait]
pub trait RepositoryStorage: Send + Sync {
    async fn get(&self, path: &str) -> ApiResult<Option<StorageItem>>;

    async fn put(
        &self,
        path: &str,
        content: &[u8],
        content_type: &str,
        ctx: OperationContext,
    ) -> ApiResult<()>;

    /// Returns whether something was deleted.
    async fn delete(&self, path: &str, ctx: OperationContext) -> ApiResult<bool>;

    async fn exists(&self, path: &str) -> ApiResult<bool>;

    /// Direct children of a collection. A missing collection lists as empty.
    async fn list(&self, path: &str) -> ApiResult<Vec<StorageEntry>>;
}
