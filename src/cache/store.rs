//! Cache store abstraction and the in-memory LRU implementation.

use std::{io, num::NonZeroUsize, sync::RwLock};

use async_trait::async_trait;
use lru::LruCache;
use metrics::counter;
use thiserror::Error;
use tracing::debug;

use crate::application::render::RenderResult;

use super::{
    keys::CacheKey,
    lock::{rw_read, rw_write},
};

const SOURCE: &str = "cache::store";

/// Outcome of a cache read. Failures are kept apart from misses so callers
/// can log them, but both lead to a fresh render.
#[derive(Debug)]
pub enum CacheLookup {
    Found(RenderResult),
    NotFound,
    Failed(CacheError),
}

impl CacheLookup {
    pub fn found(self) -> Option<RenderResult> {
        match self {
            Self::Found(result) => Some(result),
            Self::NotFound | Self::Failed(_) => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache io error: {0}")]
    Io(#[from] io::Error),
    #[error("cached entry could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("cache backend error: {message}")]
    Backend { message: String },
}

impl CacheError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

/// Asynchronous storage for rendered documents.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &CacheKey) -> CacheLookup;

    async fn put(&self, key: &CacheKey, result: &RenderResult) -> Result<(), CacheError>;
}

/// Bounded in-process store with LRU eviction.
pub struct MemoryCacheStore {
    entries: RwLock<LruCache<CacheKey, RenderResult>>,
}

impl MemoryCacheStore {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "memory.len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        rw_read(&self.entries, SOURCE, "memory.contains").contains(key)
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &CacheKey) -> CacheLookup {
        // LRU reads reorder entries, so they need the write lock.
        match rw_write(&self.entries, SOURCE, "memory.get").get(key) {
            Some(result) => CacheLookup::Found(result.clone()),
            None => CacheLookup::NotFound,
        }
    }

    async fn put(&self, key: &CacheKey, result: &RenderResult) -> Result<(), CacheError> {
        let evicted = rw_write(&self.entries, SOURCE, "memory.put").push(key.clone(), result.clone());
        if let Some((evicted_key, _)) = evicted
            && evicted_key != *key
        {
            counter!("hubdown_cache_evict_total").increment(1);
            debug!(
                target = SOURCE,
                op = "memory.put",
                result = "evicted",
                cache_key = %evicted_key,
                "Evicted least recently used render"
            );
        }
        Ok(())
    }
}
