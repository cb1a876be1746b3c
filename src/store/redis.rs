// Redis-backed rules store
// Each location is one Redis string holding the serialized StoreItem.

use super::{RuleStore, StoreItem, StoreLocation};
use crate::types::AppResult;
use ::redis::aio::ConnectionManager;
use ::redis::AsyncCommands;
use async_trait::async_trait;
use tracing::{debug, info};

const KEY_PREFIX: &str = "post_reflection";

pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> AppResult<Self> {
        let client = ::redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        info!("Connected to Redis rules store");
        Ok(Self { conn })
    }

    fn redis_key(location: &StoreLocation) -> String {
        format!("{}:{}", KEY_PREFIX, location.flatten())
    }
}

#[async_trait]
impl RuleStore for RedisStore {
    async fn get(&self, location: &StoreLocation) -> AppResult<Option<StoreItem>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(Self::redis_key(location)).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, location: &StoreLocation, value: serde_json::Value) -> AppResult<()> {
        let key = Self::redis_key(location);
        let item = match self.get(location).await? {
            Some(existing) => existing.replaced(value),
            None => StoreItem::new(value),
        };
        let raw = serde_json::to_string(&item)?;

        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(&key, raw).await?;
        debug!(key = %key, "Wrote rules to Redis");
        Ok(())
    }
}
