//! Directory-backed cache store. One JSON file per key.

use std::{
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::application::render::RenderResult;

use super::{
    keys::CacheKey,
    store::{CacheError, CacheLookup, CacheStore},
};

const SOURCE: &str = "cache::file";

/// Stores each render as `<key>.json` under a directory.
///
/// Writes land in a temporary file in the same directory and are renamed
/// into place, so readers never observe a partial entry.
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    dir: Arc<PathBuf>,
}

impl FileCacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir: Arc::new(dir) })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

#[async_trait]
impl CacheStore for FileCacheStore {
    async fn get(&self, key: &CacheKey) -> CacheLookup {
        let started_at = Instant::now();
        let path = self.entry_path(key);

        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return CacheLookup::NotFound,
            Err(err) => return CacheLookup::Failed(err.into()),
        };

        match serde_json::from_str::<RenderResult>(&raw) {
            Ok(result) => {
                debug!(
                    target = SOURCE,
                    op = "file.get",
                    result = "cache_hit",
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    cache_path = %path.display(),
                    "Cached render read from disk"
                );
                CacheLookup::Found(result)
            }
            Err(err) => CacheLookup::Failed(err.into()),
        }
    }

    async fn put(&self, key: &CacheKey, result: &RenderResult) -> Result<(), CacheError> {
        let payload = serde_json::to_vec(result)?;
        let dir = Arc::clone(&self.dir);
        let path = self.entry_path(key);

        tokio::task::spawn_blocking(move || write_entry(&dir, &path, &payload))
            .await
            .map_err(|err| CacheError::backend(format!("cache write task failed: {err}")))?
    }
}

fn write_entry(dir: &Path, path: &Path, payload: &[u8]) -> Result<(), CacheError> {
    let mut file = tempfile::Builder::new()
        .prefix(".entry-")
        .suffix(".json")
        .tempfile_in(dir)?;
    file.write_all(payload)?;
    file.flush()?;

    match file.persist(path) {
        Ok(_) => Ok(()),
        Err(err) if err.error.kind() == ErrorKind::AlreadyExists => Ok(()),
        Err(err) => {
            warn!(
                target = SOURCE,
                op = "file.put",
                result = "persist_error",
                cache_path = %path.display(),
                error = %err.error,
                "Failed to move cache entry into place"
            );
            Err(err.error.into())
        }
    }
}
