//! In-process cache store.
//!
//! Uses moka for TTL-based caching with LRU eviction. Serves as the test
//! double for the redis store and as a degraded fallback when redis is not
//! reachable at startup.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::sync::Cache as MokaCache;
use moka::Expiry;

use super::{glob_match, CacheStore};

/// Each entry carries its own TTL, mirroring per-key expiry in redis.
struct PerEntryExpiry;

impl Expiry<String, (String, Duration)> for PerEntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &(String, Duration),
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.1)
    }
}

pub struct MemoryCache {
    entries: MokaCache<String, (String, Duration)>,
}

impl MemoryCache {
    pub fn new(max_capacity: u64) -> Self {
        Self {
            entries: MokaCache::builder()
                .max_capacity(max_capacity)
                .expire_after(PerEntryExpiry)
                .build(),
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.get(key).map(|(value, _)| value))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> anyhow::Result<()> {
        self.entries.insert(key.to_string(), (value, ttl));
        Ok(())
    }

    async fn del(&self, key: &str) -> anyhow::Result<()> {
        self.entries.invalidate(key);
        Ok(())
    }

    async fn del_pattern(&self, pattern: &str) -> anyhow::Result<()> {
        let matching: Vec<String> = self
            .entries
            .iter()
            .filter(|(key, _)| glob_match(pattern, key))
            .map(|(key, _)| key.as_ref().clone())
            .collect();
        for key in matching {
            self.entries.invalidate(&key);
        }
        Ok(())
    }
}
