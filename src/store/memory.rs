use super::{RuleStore, StoreItem, StoreLocation};
use crate::types::AppResult;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Process-local store, mostly for tests and one-shot runs
#[derive(Default)]
pub struct InMemoryStore {
    items: RwLock<HashMap<StoreLocation, StoreItem>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }
}

#[async_trait]
impl RuleStore for InMemoryStore {
    async fn get(&self, location: &StoreLocation) -> AppResult<Option<StoreItem>> {
        Ok(self.items.read().await.get(location).cloned())
    }

    async fn put(&self, location: &StoreLocation, value: serde_json::Value) -> AppResult<()> {
        let mut items = self.items.write().await;
        let item = match items.remove(location) {
            Some(existing) => existing.replaced(value),
            None => StoreItem::new(value),
        };
        items.insert(location.clone(), item);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_then_get() {
        let store = InMemoryStore::new();
        let location = StoreLocation::reflections();

        assert!(store.get(&location).await.unwrap().is_none());

        store.put(&location, json!({ "ruleset": ["a"] })).await.unwrap();
        store.put(&location, json!({ "ruleset": ["b"] })).await.unwrap();

        let item = store.get(&location).await.unwrap().unwrap();
        assert_eq!(item.value, json!({ "ruleset": ["b"] }));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_locations_are_isolated() {
        let store = InMemoryStore::new();
        store
            .put(&StoreLocation::reflections(), json!({ "ruleset": ["post"] }))
            .await
            .unwrap();

        assert!(store
            .get(&StoreLocation::thread_reflections())
            .await
            .unwrap()
            .is_none());
    }
}
