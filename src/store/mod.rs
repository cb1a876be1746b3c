//! Rules Store
//!
//! Key-value storage for reflection rules. Values live under a
//! `(namespace, key)` location and are small JSON documents; every
//! `put` overwrites the previous value (last writer wins).

pub mod file;
pub mod memory;
pub mod redis;

pub use file::FileStore;
pub use memory::InMemoryStore;
pub use self::redis::RedisStore;

use crate::config::{StoreBackend, StoreConfig};
use crate::types::AppResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const REFLECTIONS_NAMESPACE: &str = "reflection_rules";
pub const REFLECTIONS_KEY: &str = "rules";
pub const THREAD_REFLECTIONS_KEY: &str = "thread_rules";

/// Where a value lives in the store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreLocation {
    pub namespace: Vec<String>,
    pub key: String,
}

impl StoreLocation {
    pub fn new<I, S>(namespace: I, key: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            namespace: namespace.into_iter().map(Into::into).collect(),
            key: key.into(),
        }
    }

    /// `["reflection_rules"]` / `"rules"`
    pub fn reflections() -> Self {
        Self::new([REFLECTIONS_NAMESPACE], REFLECTIONS_KEY)
    }

    /// `["reflection_rules"]` / `"thread_rules"`
    pub fn thread_reflections() -> Self {
        Self::new([REFLECTIONS_NAMESPACE], THREAD_REFLECTIONS_KEY)
    }

    /// Flat string form, e.g. `reflection_rules:rules`
    pub fn flatten(&self) -> String {
        let mut parts = self.namespace.clone();
        parts.push(self.key.clone());
        parts.join(":")
    }
}

impl std::fmt::Display for StoreLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.flatten())
    }
}

/// A stored value with its timestamps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreItem {
    pub value: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoreItem {
    pub fn new(value: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            value,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the value, keeping the creation time
    pub fn replaced(self, value: serde_json::Value) -> Self {
        Self {
            value,
            created_at: self.created_at,
            updated_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn get(&self, location: &StoreLocation) -> AppResult<Option<StoreItem>>;

    async fn put(&self, location: &StoreLocation, value: serde_json::Value) -> AppResult<()>;
}

/// Open the backend selected by configuration
pub async fn open_store(config: &StoreConfig) -> AppResult<Arc<dyn RuleStore>> {
    let store: Arc<dyn RuleStore> = match config.backend {
        StoreBackend::Memory => Arc::new(InMemoryStore::new()),
        StoreBackend::File => Arc::new(FileStore::new(config.path.clone())),
        StoreBackend::Redis => Arc::new(RedisStore::connect(&config.redis_url).await?),
    };
    tracing::debug!(backend = ?config.backend, "Opened rules store");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_flatten() {
        assert_eq!(StoreLocation::reflections().flatten(), "reflection_rules:rules");
        assert_eq!(
            StoreLocation::new(["a", "b"], "c").to_string(),
            "a:b:c"
        );
    }

    #[test]
    fn test_item_replaced_keeps_created_at() {
        let item = StoreItem::new(serde_json::json!({ "ruleset": [] }));
        let created = item.created_at;
        let replaced = item.replaced(serde_json::json!({ "ruleset": ["x"] }));
        assert_eq!(replaced.created_at, created);
        assert!(replaced.updated_at >= created);
        assert_eq!(replaced.value["ruleset"][0], "x");
    }

    #[tokio::test]
    async fn test_open_memory_store() {
        let config = StoreConfig {
            backend: StoreBackend::Memory,
            path: "unused.json".into(),
            redis_url: "redis://localhost:6379".to_string(),
        };
        let store = open_store(&config).await.unwrap();
        assert!(store.get(&StoreLocation::reflections()).await.unwrap().is_none());
    }
}
