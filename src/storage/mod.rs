//! Durable record storage: one self-describing JSON document per entity.
//!
//! The port keeps orchestration logic independent of the medium; the default
//! implementation writes `<root>/<kind>_<id>.json` with a temp-file + rename
//! strategy for best-effort atomic replacement.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::Result;

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn put(&self, kind: &str, id: &str, doc: &Value) -> Result<()>;
    async fn get(&self, kind: &str, id: &str) -> Result<Option<Value>>;
    /// Every stored document of the given kind, in no particular order.
    async fn list(&self, kind: &str) -> Result<Vec<Value>>;
    async fn delete(&self, kind: &str, id: &str) -> Result<()>;
}

// ============================================================================
// FileStore
// ============================================================================

pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn entity_path(&self, kind: &str, id: &str) -> PathBuf {
        self.root.join(format!("{kind}_{id}.json"))
    }

    /// Write bytes via a temp file in the same directory, then rename over
    /// the target. Parent directories are created as needed.
    async fn write_atomic(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = {
            let pid = std::process::id();
            let ts = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
            path.with_extension(format!("tmp.{pid}.{ts}"))
        };

        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);

        // On Windows, rename won't overwrite; remove the target first
        #[cfg(windows)]
        if tokio::fs::metadata(path).await.is_ok() {
            let _ = tokio::fs::remove_file(path).await;
        }

        tokio::fs::rename(&tmp, path).await
    }
}

#[async_trait]
impl RecordStore for FileStore {
    async fn put(&self, kind: &str, id: &str, doc: &Value) -> Result<()> {
        let path = self.entity_path(kind, id);
        let bytes = serde_json::to_vec_pretty(doc)?;
        self.write_atomic(&path, &bytes).await?;
        debug!("Persisted {}_{}", kind, id);
        Ok(())
    }

    async fn get(&self, kind: &str, id: &str) -> Result<Option<Value>> {
        let path = self.entity_path(kind, id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, kind: &str) -> Result<Vec<Value>> {
        let prefix = format!("{kind}_");
        let mut docs = Vec::new();

        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(docs),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(&prefix) || !name.ends_with(".json") {
                continue;
            }
            match tokio::fs::read(entry.path()).await {
                Ok(bytes) => match serde_json::from_slice(&bytes) {
                    Ok(doc) => docs.push(doc),
                    // A half-written or corrupted record shouldn't block the rest
                    Err(e) => warn!("Skipping unreadable record {}: {}", name, e),
                },
                Err(e) => warn!("Skipping unreadable record {}: {}", name, e),
            }
        }

        Ok(docs)
    }

    async fn delete(&self, kind: &str, id: &str) -> Result<()> {
        let path = self.entity_path(kind, id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// MemoryStore
// ============================================================================

/// In-process store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryStore {
    docs: Mutex<HashMap<(String, String), Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn put(&self, kind: &str, id: &str, doc: &Value) -> Result<()> {
        self.docs
            .lock()
            .await
            .insert((kind.to_string(), id.to_string()), doc.clone());
        Ok(())
    }

    async fn get(&self, kind: &str, id: &str) -> Result<Option<Value>> {
        Ok(self
            .docs
            .lock()
            .await
            .get(&(kind.to_string(), id.to_string()))
            .cloned())
    }

    async fn list(&self, kind: &str) -> Result<Vec<Value>> {
        Ok(self
            .docs
            .lock()
            .await
            .iter()
            .filter(|((k, _), _)| k == kind)
            .map(|(_, v)| v.clone())
            .collect())
    }

    async fn delete(&self, kind: &str, id: &str) -> Result<()> {
        self.docs
            .lock()
            .await
            .remove(&(kind.to_string(), id.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        let doc = json!({ "id": "abc", "status": "active" });
        store.put("session", "abc", &doc).await.unwrap();

        let loaded = store.get("session", "abc").await.unwrap().unwrap();
        assert_eq!(loaded["status"], "active");
        assert!(store.get("session", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_overwrites_whole_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        store
            .put("workflow", "w1", &json!({ "status": "running", "step": 1 }))
            .await
            .unwrap();
        store
            .put("workflow", "w1", &json!({ "status": "completed" }))
            .await
            .unwrap();

        let loaded = store.get("workflow", "w1").await.unwrap().unwrap();
        assert_eq!(loaded["status"], "completed");
        assert!(loaded.get("step").is_none());
    }

    #[tokio::test]
    async fn test_file_store_list_filters_by_kind() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        store.put("session", "s1", &json!({ "id": "s1" })).await.unwrap();
        store.put("session", "s2", &json!({ "id": "s2" })).await.unwrap();
        store.put("workflow", "w1", &json!({ "id": "w1" })).await.unwrap();

        let sessions = store.list("session").await.unwrap();
        assert_eq!(sessions.len(), 2);
        let workflows = store.list("workflow").await.unwrap();
        assert_eq!(workflows.len(), 1);
    }

    #[tokio::test]
    async fn test_file_store_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        store.put("session", "s1", &json!({})).await.unwrap();
        store.delete("session", "s1").await.unwrap();
        store.delete("session", "s1").await.unwrap();
        assert!(store.get("session", "s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_missing_root_is_empty() {
        let store = FileStore::new("/nonexistent/maestro-test-root");
        assert!(store.list("session").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        store.put("session", "x", &json!({ "ok": true })).await.unwrap();
        assert!(store.get("session", "x").await.unwrap().is_some());
        store.delete("session", "x").await.unwrap();
        assert!(store.get("session", "x").await.unwrap().is_none());
    }
}
