//! File-backed rules store
//!
//! Keeps every location in a single pretty-printed JSON document keyed by
//! the flattened location. Reads go to disk each time so a separate process
//! editing the file is picked up. Writes land in a sibling temp file that is
//! renamed over the document.

use super::{RuleStore, StoreItem, StoreLocation};
use crate::types::AppResult;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

type Document = BTreeMap<String, StoreItem>;

pub struct FileStore {
    path: PathBuf,
    // serializes read-modify-write within this process
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "rules.json".to_string());
        self.path
            .with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4()))
    }

    async fn load(&self) -> AppResult<Document> {
        if !fs::try_exists(&self.path).await? {
            return Ok(Document::new());
        }
        let content = fs::read_to_string(&self.path).await?;
        if content.trim().is_empty() {
            return Ok(Document::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    async fn save(&self, document: &Document) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let content = serde_json::to_string_pretty(document)?;
        // readers only ever see a complete document
        let tmp_path = self.tmp_path();
        if let Err(err) = fs::write(&tmp_path, content).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }
        if let Err(err) = fs::rename(&tmp_path, &self.path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }
        Ok(())
    }
}

#[async_trait]
impl RuleStore for FileStore {
    async fn get(&self, location: &StoreLocation) -> AppResult<Option<StoreItem>> {
        let mut document = self.load().await?;
        Ok(document.remove(&location.flatten()))
    }

    async fn put(&self, location: &StoreLocation, value: serde_json::Value) -> AppResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.load().await?;
        let key = location.flatten();
        let item = match document.remove(&key) {
            Some(existing) => existing.replaced(value),
            None => StoreItem::new(value),
        };
        document.insert(key, item);
        self.save(&document).await?;
        debug!(path = ?self.path, %location, "Wrote rules to file store");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_reads_as_absent() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path().join("reflections.json"));

        assert!(store.get(&StoreLocation::reflections()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_persists_across_instances() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("reflections.json");
        let location = StoreLocation::reflections();

        FileStore::new(path.clone())
            .put(&location, json!({ "ruleset": ["Never use emoji"] }))
            .await
            .unwrap();

        let reopened = FileStore::new(path);
        let item = reopened.get(&location).await.unwrap().unwrap();
        assert_eq!(item.value, json!({ "ruleset": ["Never use emoji"] }));
    }

    #[tokio::test]
    async fn test_write_leaves_only_the_document() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("reflections.json");
        let store = FileStore::new(path.clone());

        for rules in [json!(["a"]), json!(["a", "b"])] {
            store
                .put(&StoreLocation::reflections(), json!({ "ruleset": rules }))
                .await
                .unwrap();
        }

        let entries: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("reflections.json")]);

        let on_disk: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            on_disk["reflection_rules:rules"]["value"],
            json!({ "ruleset": ["a", "b"] })
        );
    }

    #[test]
    fn test_tmp_path_is_a_sibling() {
        let store = FileStore::new(PathBuf::from("/data/reflections.json"));
        let tmp = store.tmp_path();

        assert_eq!(tmp.parent(), Some(std::path::Path::new("/data")));
        assert_ne!(tmp, PathBuf::from("/data/reflections.json"));
    }

    #[tokio::test]
    async fn test_overwrite_keeps_other_locations() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path().join("reflections.json"));

        store
            .put(&StoreLocation::reflections(), json!({ "ruleset": ["a"] }))
            .await
            .unwrap();
        store
            .put(&StoreLocation::thread_reflections(), json!({ "ruleset": ["t"] }))
            .await
            .unwrap();
        store
            .put(&StoreLocation::reflections(), json!({ "ruleset": ["b"] }))
            .await
            .unwrap();

        let post = store.get(&StoreLocation::reflections()).await.unwrap().unwrap();
        let thread = store
            .get(&StoreLocation::thread_reflections())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(post.value, json!({ "ruleset": ["b"] }));
        assert_eq!(thread.value, json!({ "ruleset": ["t"] }));
    }
}
