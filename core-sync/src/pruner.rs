//! # Orphan Pruner
//!
//! Deletes local entries a pass did not account for. Only runs when the
//! user opted into destructive clean-up.

use std::collections::HashSet;
use std::path::Path;
use tracing::info;

use crate::error::Result;
use crate::store::MirrorStore;

pub struct Pruner<'a> {
    store: &'a MirrorStore,
    enabled: bool,
}

impl<'a> Pruner<'a> {
    pub fn new(store: &'a MirrorStore, enabled: bool) -> Self {
        Self { store, enabled }
    }

    /// Delete every entry of `dir` whose name is not in `known`, recursively
    /// for directories. Returns the number of entries removed.
    ///
    /// `kind` only labels the log line.
    pub async fn prune(&self, dir: &Path, known: &HashSet<String>, kind: &str) -> Result<usize> {
        if !self.enabled || !self.store.is_dir(dir).await? {
            return Ok(0);
        }

        let mut deleted = 0;
        for name in self.store.list_entries(dir).await? {
            if known.contains(&name) {
                continue;
            }
            info!("Deleting unknown {}: {}", kind, name);
            self.store.remove_entry(&dir.join(&name)).await?;
            deleted += 1;
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn populate(dir: &Path) {
        std::fs::write(dir.join("1.jpg"), b"x").unwrap();
        std::fs::write(dir.join("1.jpg.metadata"), b"{}").unwrap();
        std::fs::write(dir.join("stale.jpg"), b"x").unwrap();
        std::fs::create_dir(dir.join("Old album - 9")).unwrap();
        std::fs::write(dir.join("Old album - 9").join("metadata"), b"{}").unwrap();
    }

    fn known() -> HashSet<String> {
        ["1.jpg", "1.jpg.metadata"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_prune_removes_unknown_entries() {
        let dir = TempDir::new().unwrap();
        populate(dir.path());
        let store = MirrorStore::new(dir.path());

        let deleted = Pruner::new(&store, true)
            .prune(dir.path(), &known(), "file")
            .await
            .unwrap();

        assert_eq!(deleted, 2);
        let left = store.list_entries(dir.path()).await.unwrap();
        assert_eq!(left.into_iter().collect::<Vec<_>>(), vec!["1.jpg", "1.jpg.metadata"]);
    }

    #[tokio::test]
    async fn test_disabled_prune_deletes_nothing() {
        let dir = TempDir::new().unwrap();
        populate(dir.path());
        let store = MirrorStore::new(dir.path());

        let deleted = Pruner::new(&store, false)
            .prune(dir.path(), &known(), "file")
            .await
            .unwrap();

        assert_eq!(deleted, 0);
        assert!(dir.path().join("stale.jpg").exists());
    }

    #[tokio::test]
    async fn test_missing_directory_is_noop() {
        let dir = TempDir::new().unwrap();
        let store = MirrorStore::new(dir.path());

        let deleted = Pruner::new(&store, true)
            .prune(&dir.path().join("Albums"), &HashSet::new(), "album")
            .await
            .unwrap();
        assert_eq!(deleted, 0);
    }
}
