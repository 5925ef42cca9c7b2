//! Render cache coordination.
//!
//! - `keys`: deterministic `CacheKey` derivation from markdown and options
//! - `store`: the async `CacheStore` seam plus the in-memory LRU backend
//! - `file`: one JSON file per key under a directory
//! - `config`: backend selection from settings

mod config;
mod file;
mod keys;
pub(crate) mod lock;
mod store;

pub use config::{CacheBackend, CacheConfig};
pub use file::FileCacheStore;
pub use keys::CacheKey;
pub use store::{CacheError, CacheLookup, CacheStore, MemoryCacheStore};
