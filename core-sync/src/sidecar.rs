//! # Change Detector
//!
//! Sidecars hold the exact record an entity was last materialized from.
//! Comparison is structural: key order and whitespace in the file do not
//! matter, only the decoded JSON value does.

use serde_json::Value;
use std::io;
use std::path::Path;
use tokio::fs;
use tracing::debug;

use crate::error::{Result, SyncError};
use crate::store::MirrorStore;

/// Load the record stored in a sidecar.
///
/// A missing file yields `None`, as does one that does not parse: both mean
/// "nothing trustworthy was persisted". Any other read failure is fatal.
pub async fn read(path: &Path) -> Result<Option<Value>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(SyncError::io(path, e)),
    };

    match serde_json::from_slice(&bytes) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Ignoring unparseable sidecar");
            Ok(None)
        }
    }
}

/// Whether `fresh` differs from what the sidecar at `path` holds.
pub async fn needs_update(path: &Path, fresh: &Value) -> Result<bool> {
    Ok(read(path).await?.as_ref() != Some(fresh))
}

/// Persist `record` at `path` unconditionally.
pub async fn write(store: &MirrorStore, path: &Path, record: &Value) -> Result<()> {
    let bytes = serde_json::to_vec(record)
        .map_err(|e| SyncError::Metadata(format!("cannot serialize record: {}", e)))?;
    store.write_atomic(path, &bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_sidecar_needs_update() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("1.jpg.metadata");

        assert!(needs_update(&path, &json!({"id": "1"})).await.unwrap());
    }

    #[tokio::test]
    async fn test_structural_equality_ignores_key_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("1.jpg.metadata");
        std::fs::write(&path, r#"{ "lastupdate": "5",  "id": "1" }"#).unwrap();

        assert!(!needs_update(&path, &json!({"id": "1", "lastupdate": "5"}))
            .await
            .unwrap());
        assert!(needs_update(&path, &json!({"id": "1", "lastupdate": "6"}))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_unparseable_sidecar_needs_update() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("1.jpg.metadata");
        std::fs::write(&path, b"{truncated").unwrap();

        assert_eq!(read(&path).await.unwrap(), None);
        assert!(needs_update(&path, &json!({"id": "1"})).await.unwrap());
    }
}
