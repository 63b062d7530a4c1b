//! Engine wiring: store seams, cache handle and notification collaborator
//! behind one entry point.
//!
//! The read and mutation operations live in the component modules
//! ([`crate::feed`], [`crate::trending`], [`crate::search`],
//! [`crate::comments`], [`crate::posts`], [`crate::social`]) as `impl`
//! blocks on [`ContentEngine`].

use std::sync::Arc;

use crate::app_config::AppConfig;
use crate::cache::memory::MemoryCache;
use crate::cache::redis::RedisCache;
use crate::cache::Cache;
use crate::error::Result;
use crate::notify::{Notifier, NullNotifier};
use crate::pagination::PageParams;
use crate::store::pg::PgStore;
use crate::store::{ContentStore, RelationshipStore, UserStore};

#[derive(Debug, Clone, Copy)]
pub struct EngineLimits {
    pub default_page_size: u64,
    pub max_page_size: u64,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

pub struct ContentEngine {
    pub(crate) content: Arc<dyn ContentStore>,
    pub(crate) relations: Arc<dyn RelationshipStore>,
    pub(crate) users: Arc<dyn UserStore>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) cache: Cache,
    pub(crate) limits: EngineLimits,
}

impl ContentEngine {
    pub fn new(
        content: Arc<dyn ContentStore>,
        relations: Arc<dyn RelationshipStore>,
        users: Arc<dyn UserStore>,
        cache: Cache,
    ) -> Self {
        Self {
            content,
            relations,
            users,
            notifier: Arc::new(NullNotifier),
            cache,
            limits: EngineLimits::default(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_limits(mut self, limits: EngineLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Production wiring: global Postgres pool plus redis, degrading to the
    /// in-memory cache when redis is unreachable at startup.
    pub async fn connect(config: &AppConfig) -> anyhow::Result<Self> {
        crate::db::init_db(&config.database.url).await?;
        let store = Arc::new(PgStore::from_global());

        let cache = if config.cache.enabled {
            match RedisCache::connect(&config.cache.redis_url).await {
                Ok(redis) => Cache::new(Arc::new(redis)),
                Err(e) => {
                    log::warn!("redis unavailable, using in-memory cache: {}", e);
                    Cache::new(Arc::new(MemoryCache::default()))
                }
            }
        } else {
            Cache::disabled()
        };

        let content: Arc<dyn ContentStore> = store.clone();
        let relations: Arc<dyn RelationshipStore> = store.clone();
        let users: Arc<dyn UserStore> = store;

        Ok(Self::new(content, relations, users, cache).with_limits(config.engine.limits()))
    }

    /// First page at the configured default size, for callers that pass no
    /// explicit pagination.
    pub fn default_page(&self) -> PageParams {
        PageParams::new(1, self.limits.default_page_size)
    }

    pub(crate) fn validate_page(&self, params: PageParams) -> Result<()> {
        params.validate(self.limits.max_page_size)
    }
}
