//! Read-through cache tier and the invalidation policy consumed by every
//! mutation path.
//!
//! Caching is a performance optimization, not a correctness dependency: any
//! failure in the underlying store degrades to a direct source query and a
//! warning log, never an error response. Entries are whole JSON values
//! written once per TTL; nothing partially updates a cached value.

pub mod memory;
pub mod redis;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Key/value store behind the cache tier (`redis` in production, `memory`
/// in tests and as a degraded fallback).
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    async fn set(&self, key: &str, value: String, ttl: Duration) -> anyhow::Result<()>;
    async fn del(&self, key: &str) -> anyhow::Result<()>;
    /// Delete every key matching a `*`-glob.
    async fn del_pattern(&self, pattern: &str) -> anyhow::Result<()>;
}

/// Time-to-live policy, in one place so reads and eviction agree.
pub mod ttl {
    use std::time::Duration;

    pub const POST: Duration = Duration::from_secs(300);
    pub const FEED: Duration = Duration::from_secs(120);
    pub const FOLLOW_LISTS: Duration = Duration::from_secs(300);
    pub const OWN_PROFILE: Duration = Duration::from_secs(300);
    pub const PUBLIC_PROFILE: Duration = Duration::from_secs(600);
    pub const SEARCH: Duration = Duration::from_secs(300);
}

/// Cache key scheme. Invalidation patterns below depend on these exact
/// shapes; change them only together.
pub mod keys {
    use crate::constants::ANONYMOUS_VIEWER;
    use std::collections::BTreeMap;

    fn viewer_segment(viewer: Option<i32>) -> String {
        match viewer {
            Some(id) => id.to_string(),
            None => ANONYMOUS_VIEWER.to_string(),
        }
    }

    pub fn post(post_id: i32, viewer: Option<i32>) -> String {
        format!("post:{}:{}", post_id, viewer_segment(viewer))
    }

    pub fn post_pattern(post_id: i32) -> String {
        format!("post:{}:*", post_id)
    }

    pub fn feed(user_id: i32, page: u64, limit: u64) -> String {
        format!("feed:{}:{}:{}", user_id, page, limit)
    }

    pub fn feed_pattern(user_id: i32) -> String {
        format!("feed:{}:*", user_id)
    }

    pub fn followers(user_id: i32, page: u64, limit: u64) -> String {
        format!("followers:{}:{}:{}", user_id, page, limit)
    }

    pub fn followers_pattern(user_id: i32) -> String {
        format!("followers:{}:*", user_id)
    }

    pub fn following(user_id: i32, page: u64, limit: u64) -> String {
        format!("following:{}:{}:{}", user_id, page, limit)
    }

    pub fn following_pattern(user_id: i32) -> String {
        format!("following:{}:*", user_id)
    }

    pub fn profile(user_id: i32) -> String {
        format!("user:profile:{}", user_id)
    }

    pub fn own_profile(user_id: i32) -> String {
        format!("user:own:{}", user_id)
    }

    /// `search:{kind}:{md5 of the sorted parameters}`. The BTreeMap keeps
    /// parameter order canonical so equal queries share one entry.
    pub fn search(kind: &str, params: &BTreeMap<&'static str, String>) -> String {
        let joined = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        format!("search:{}:{:x}", kind, md5::compute(joined))
    }
}

/// Match a `*`-glob against a key. `*` spans any run of characters,
/// including none; everything else matches literally.
pub fn glob_match(pattern: &str, candidate: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == candidate;
    }

    let mut pos = 0;
    let last = parts.len() - 1;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            if !candidate.starts_with(part) {
                return false;
            }
            pos = part.len();
        } else if i == last {
            let rest = &candidate[pos..];
            return rest.len() >= part.len() && rest.ends_with(part);
        } else {
            match candidate[pos..].find(part) {
                Some(found) => pos += found + part.len(),
                None => return false,
            }
        }
    }
    true
}

/// Read-through handle shared by every engine component. All operations are
/// soft: a missing or failing store yields cache misses and no-op writes.
#[derive(Clone)]
pub struct Cache {
    store: Option<Arc<dyn CacheStore>>,
}

impl Cache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store: Some(store) }
    }

    /// A cache that never hits; every read goes to the source.
    pub fn disabled() -> Self {
        Self { store: None }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let store = self.store.as_ref()?;
        match store.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    log::warn!("cache entry {} failed to decode, treating as miss: {}", key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                log::warn!("cache get {} failed, falling back to source: {}", key, e);
                None
            }
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                log::warn!("cache value for {} failed to encode: {}", key, e);
                return;
            }
        };
        if let Err(e) = store.set(key, raw, ttl).await {
            log::warn!("cache set {} failed: {}", key, e);
        }
    }

    pub async fn del(&self, key: &str) {
        if let Some(store) = self.store.as_ref() {
            if let Err(e) = store.del(key).await {
                log::warn!("cache del {} failed: {}", key, e);
            }
        }
    }

    pub async fn del_pattern(&self, pattern: &str) {
        if let Some(store) = self.store.as_ref() {
            if let Err(e) = store.del_pattern(pattern).await {
                log::warn!("cache del pattern {} failed: {}", pattern, e);
            }
        }
    }

    // Invalidation policy. Mutation paths call these synchronously before
    // returning; followers' feed caches are deliberately left to expire on
    // their own TTL.

    /// Post created, updated, deleted, liked, or commented on.
    pub async fn invalidate_post(&self, post_id: i32) {
        self.del_pattern(&keys::post_pattern(post_id)).await;
    }

    /// Post created/updated/deleted: the author's own post set changed too.
    pub async fn invalidate_post_mutation(&self, post_id: i32, author_id: i32) {
        self.invalidate_post(post_id).await;
        self.del_pattern(&keys::feed_pattern(author_id)).await;
    }

    /// Follow or unfollow between two users.
    pub async fn invalidate_follow_mutation(&self, follower_id: i32, following_id: i32) {
        self.del_pattern(&keys::followers_pattern(following_id)).await;
        self.del_pattern(&keys::following_pattern(follower_id)).await;
        self.del_pattern(&keys::feed_pattern(follower_id)).await;
    }

    /// Profile or avatar change.
    pub async fn invalidate_profile_mutation(&self, user_id: i32) {
        self.del(&keys::profile(user_id)).await;
        self.del(&keys::own_profile(user_id)).await;
    }
}
