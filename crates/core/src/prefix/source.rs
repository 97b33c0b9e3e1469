use crate::error::{Result, RoutingError};
use crate::prefix::marshal::{CONTENT_TYPE, TextMarshaller};
use crate::runtime::locks::ArtifactLock;
use async_trait::async_trait;
use autoroute_api::{OperationContext, PrefixList, RepositoryStorage};
use std::fmt;
use std::sync::Arc;

/// Something prefix entries can be read from.
///
/// A source that does not exist is never supported and has no entries.
#[async_trait]
pub trait PrefixSource: Send + Sync {
    async fn exists(&self) -> Result<bool>;

    async fn supported(&self) -> Result<bool>;

    async fn read_entries(&self) -> Result<Vec<String>>;

    /// Epoch millis, `-1` when unknown.
    async fn last_modified(&self) -> Result<i64>;
}

/// In-memory prefix list, produced by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayListPrefixSource {
    list: PrefixList,
    last_modified: i64,
}

impl ArrayListPrefixSource {
    pub fn new(entries: Vec<String>) -> Self {
        Self::with_last_modified(entries, crate::util::now_millis())
    }

    pub fn with_last_modified(entries: Vec<String>, last_modified: i64) -> Self {
        Self {
            list: PrefixList::supported(entries),
            last_modified,
        }
    }

    pub fn unsupported() -> Self {
        Self {
            list: PrefixList::unsupported(),
            last_modified: crate::util::now_millis(),
        }
    }

    pub fn list(&self) -> &PrefixList {
        &self.list
    }

    pub fn entries(&self) -> &[String] {
        &self.list.entries
    }

    pub fn is_supported(&self) -> bool {
        self.list.supported
    }

    /// Epoch millis of the content this list was built from.
    pub fn modified_at(&self) -> i64 {
        self.last_modified
    }

    pub fn into_entries(self) -> Vec<String> {
        self.list.entries
    }
}

#[async_trait]
impl PrefixSource for ArrayListPrefixSource {
    async fn exists(&self) -> Result<bool> {
        Ok(true)
    }

    async fn supported(&self) -> Result<bool> {
        Ok(self.list.supported)
    }

    async fn read_entries(&self) -> Result<Vec<String>> {
        Ok(self.list.entries.clone())
    }

    async fn last_modified(&self) -> Result<i64> {
        Ok(self.last_modified)
    }
}

/// Prefix file persisted in a repository's storage.
///
/// No locking happens in here: callers take [`FilePrefixSource::lock`] in the
/// mode their operation needs.
#[derive(Clone)]
pub struct FilePrefixSource {
    repository_id: String,
    path: String,
    storage: Arc<dyn RepositoryStorage>,
    marshaller: TextMarshaller,
    lock: ArtifactLock,
}

impl FilePrefixSource {
    pub fn new(
        repository_id: impl Into<String>,
        path: impl Into<String>,
        storage: Arc<dyn RepositoryStorage>,
        marshaller: TextMarshaller,
        lock: ArtifactLock,
    ) -> Self {
        Self {
            repository_id: repository_id.into(),
            path: path.into(),
            storage,
            marshaller,
            lock,
        }
    }

    pub fn repository_id(&self) -> &str {
        &self.repository_id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn lock(&self) -> &ArtifactLock {
        &self.lock
    }

    /// Decoded content together with its last modification time.
    pub async fn read(&self) -> Result<Option<(PrefixList, i64)>> {
        let Some(item) = self.storage.get(&self.path).await? else {
            return Ok(None);
        };
        let list = self.marshaller.unmarshal(&item.content)?;
        Ok(Some((list, item.last_modified)))
    }

    /// Writes `entries` as a supported list. The encoded bytes are decoded once
    /// more before hitting storage, so an oversized list fails here.
    pub async fn write_entries(&self, entries: &[String]) -> Result<()> {
        let list = PrefixList::supported(entries.to_vec());
        self.write(&list).await
    }

    pub async fn write_unsupported(&self) -> Result<()> {
        self.write(&PrefixList::unsupported()).await
    }

    pub async fn delete(&self) -> Result<bool> {
        Ok(self
            .storage
            .delete(&self.path, OperationContext::routing())
            .await?)
    }

    async fn write(&self, list: &PrefixList) -> Result<()> {
        let bytes = self.marshaller.marshal(list);
        let decoded = self.marshaller.unmarshal(&bytes)?;
        if decoded.supported != list.supported || decoded.entries.len() != list.entries.len() {
            return Err(RoutingError::InvalidInput(format!(
                "prefix list of {} does not survive encoding",
                self.repository_id
            )));
        }
        self.storage
            .put(&self.path, &bytes, CONTENT_TYPE, OperationContext::routing())
            .await?;
        Ok(())
    }
}

impl fmt::Debug for FilePrefixSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilePrefixSource")
            .field("repository_id", &self.repository_id)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PrefixSource for FilePrefixSource {
    async fn exists(&self) -> Result<bool> {
        Ok(self.storage.exists(&self.path).await?)
    }

    async fn supported(&self) -> Result<bool> {
        Ok(self.read().await?.is_some_and(|(list, _)| list.supported))
    }

    async fn read_entries(&self) -> Result<Vec<String>> {
        Ok(self
            .read()
            .await?
            .map(|(list, _)| list.entries)
            .unwrap_or_default())
    }

    async fn last_modified(&self) -> Result<i64> {
        Ok(self
            .storage
            .get(&self.path)
            .await?
            .map_or(-1, |item| item.last_modified))
    }
}
