//! Redis-backed cache store.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::CacheStore;

#[derive(Clone)]
pub struct RedisCache {
    manager: ConnectionManager,
}

impl RedisCache {
    /// Connect and return a handle backed by an auto-reconnecting connection
    /// manager. Callers treat a connect failure as "run without cache".
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let manager = client.get_tokio_connection_manager().await?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let mut conn = self.manager.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> anyhow::Result<()> {
        let mut conn = self.manager.clone();
        let _: () = conn.set_ex(key, value, ttl.as_secs() as usize).await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> anyhow::Result<()> {
        let mut conn = self.manager.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    // TODO: replace KEYS with an incremental SCAN once the keyspace outgrows
    // single-digit milliseconds per pattern delete.
    async fn del_pattern(&self, pattern: &str) -> anyhow::Result<()> {
        let mut conn = self.manager.clone();
        let keys: Vec<String> = conn.keys(pattern).await?;
        if !keys.is_empty() {
            let _: () = conn.del(keys).await?;
        }
        Ok(())
    }
}
