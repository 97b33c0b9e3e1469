use crate::error::Result;
use crate::prefix::matcher::PathMatcher;
use crate::prefix::source::{FilePrefixSource, PrefixSource};
use crate::util::{is_descendant_or_self, normalize};
use std::collections::HashSet;

/// Incremental edits of a persisted prefix list.
///
/// Performs no locking. Callers hold at least the read side of the source's
/// lock from construction through `offer_entry`/`revoke_entry`, and the write
/// side around `reset` + `apply`.
pub struct ListModifier {
    source: FilePrefixSource,
    max_depth: usize,
    current: Vec<String>,
    matcher: PathMatcher,
    to_add: Vec<String>,
    to_remove: HashSet<String>,
}

impl ListModifier {
    pub async fn new(source: FilePrefixSource, max_depth: usize) -> Result<Self> {
        let current = source.read_entries().await?;
        let matcher = PathMatcher::new(&current, usize::MAX)?;
        Ok(Self {
            source,
            max_depth,
            current,
            matcher,
            to_add: Vec::new(),
            to_remove: HashSet::new(),
        })
    }

    /// Queues `entry` (depth capped) for addition unless already covered.
    pub fn offer_entry(&mut self, entry: &str) -> bool {
        let normalized = normalize(entry, self.max_depth);
        if normalized == "/" {
            return false;
        }
        if self.matcher.matches(&normalized) && !self.removal_covers(&normalized) {
            return false;
        }
        if self.to_add.contains(&normalized) {
            return false;
        }
        self.to_add.push(normalized);
        true
    }

    /// Queues removal of every stored entry at or below `entry`.
    pub fn revoke_entry(&mut self, entry: &str) -> bool {
        let normalized = normalize(entry, usize::MAX);
        let before = self.to_add.len();
        self.to_add
            .retain(|queued| !is_descendant_or_self(queued, &normalized));
        let mut changed = before != self.to_add.len();

        if !self.matcher.contains(&normalized) {
            return changed;
        }
        for stored in &self.current {
            if is_descendant_or_self(stored, &normalized) && self.to_remove.insert(stored.clone()) {
                changed = true;
            }
        }
        changed
    }

    pub fn has_changes(&self) -> bool {
        !self.to_add.is_empty() || !self.to_remove.is_empty()
    }

    /// Writes `(current - removed) + added` if anything is queued. Returns
    /// whether the source was written.
    pub async fn apply(&mut self) -> Result<bool> {
        if !self.has_changes() {
            return Ok(false);
        }
        let mut seen = HashSet::new();
        let updated: Vec<String> = self
            .current
            .iter()
            .filter(|e| !self.to_remove.contains(*e))
            .chain(self.to_add.iter())
            .filter(|e| seen.insert(e.to_string()))
            .cloned()
            .collect();

        self.source.write_entries(&updated).await?;
        self.matcher = PathMatcher::new(&updated, usize::MAX)?;
        self.current = updated;
        self.to_add.clear();
        self.to_remove.clear();
        Ok(true)
    }

    /// Re-reads the backing source and drops queued changes.
    pub async fn reset(&mut self) -> Result<()> {
        self.current = self.source.read_entries().await?;
        self.matcher = PathMatcher::new(&self.current, usize::MAX)?;
        self.to_add.clear();
        self.to_remove.clear();
        Ok(())
    }

    pub fn entries(&self) -> &[String] {
        &self.current
    }

    fn removal_covers(&self, path: &str) -> bool {
        self.to_remove
            .iter()
            .any(|removed| is_descendant_or_self(path, removed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefix::marshal::TextMarshaller;
    use crate::runtime::locks::ArtifactLock;
    use crate::storage::FsStorage;
    use std::sync::Arc;

    async fn source_with(dir: &tempfile::TempDir, entries: &[&str]) -> FilePrefixSource {
        let source = FilePrefixSource::new(
            "releases",
            "/.meta/prefixes.txt",
            Arc::new(FsStorage::new(dir.path())),
            TextMarshaller::default(),
            ArtifactLock::default(),
        );
        let entries: Vec<String> = entries.iter().map(|s| s.to_string()).collect();
        source.write_entries(&entries).await.unwrap();
        source
    }

    #[tokio::test]
    async fn test_offer_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_with(&dir, &["/com"]).await;
        let mut modifier = ListModifier::new(source.clone(), 2).await.unwrap();

        assert!(modifier.offer_entry("/org/apache/maven/pom.xml"));
        assert!(!modifier.offer_entry("/org/apache/commons"));
        assert!(!modifier.offer_entry("/com/example"));
        assert!(modifier.apply().await.unwrap());
        assert!(!modifier.apply().await.unwrap());

        assert_eq!(source.read_entries().await.unwrap(), vec!["/com", "/org/apache"]);
    }

    #[tokio::test]
    async fn test_revoke_removes_only_descendants() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_with(&dir, &["/org/apache", "/org/codehaus", "/organic", "/com"]).await;
        let mut modifier = ListModifier::new(source.clone(), 2).await.unwrap();

        assert!(modifier.revoke_entry("/org"));
        assert!(!modifier.revoke_entry("/net"));
        assert!(modifier.apply().await.unwrap());

        assert_eq!(source.read_entries().await.unwrap(), vec!["/organic", "/com"]);
    }

    #[tokio::test]
    async fn test_revoke_below_entry_keeps_it() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_with(&dir, &["/org/apache"]).await;
        let mut modifier = ListModifier::new(source, 2).await.unwrap();

        assert!(!modifier.revoke_entry("/org/apache/maven/pom.xml"));
        assert!(!modifier.has_changes());
    }

    #[tokio::test]
    async fn test_reset_picks_up_concurrent_write() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_with(&dir, &["/com"]).await;
        let mut modifier = ListModifier::new(source.clone(), 2).await.unwrap();
        assert!(modifier.offer_entry("/org/apache"));

        source
            .write_entries(&["/com".to_string(), "/org/apache".to_string()])
            .await
            .unwrap();
        modifier.reset().await.unwrap();
        assert!(!modifier.has_changes());
        assert!(!modifier.offer_entry("/org/apache"));
    }
}
