//! Cache configuration.
//!
//! Selects the render store backend via `hubdown.toml` or `HUBDOWN__CACHE__*`.

use std::{fmt, num::NonZeroUsize, path::PathBuf, str::FromStr, sync::Arc};

use serde::Deserialize;
use tracing::info;

use super::{
    file::FileCacheStore,
    store::{CacheError, CacheStore, MemoryCacheStore},
};

const DEFAULT_MEMORY_CAPACITY: usize = 256;
const DEFAULT_PIPELINE_CAPACITY: usize = 16;
const DEFAULT_CACHE_DIR: &str = ".hubdown-cache";

/// Where rendered documents are kept between calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    None,
    Memory,
    File,
}

impl FromStr for CacheBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(Self::None),
            "memory" => Ok(Self::Memory),
            "file" => Ok(Self::File),
            other => Err(format!("unknown cache backend `{other}` (none|memory|file)")),
        }
    }
}

impl fmt::Display for CacheBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Memory => "memory",
            Self::File => "file",
        })
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    /// Maximum entries held by the memory backend.
    pub memory_capacity: usize,
    /// Directory used by the file backend.
    pub directory: PathBuf,
    /// Maximum non-default pipelines kept for reuse.
    pub pipeline_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::None,
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            directory: PathBuf::from(DEFAULT_CACHE_DIR),
            pipeline_capacity: DEFAULT_PIPELINE_CAPACITY,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            backend: settings.backend,
            memory_capacity: settings.memory_capacity.get(),
            directory: settings.directory.clone(),
            pipeline_capacity: settings.pipeline_capacity.get(),
        }
    }
}

impl CacheConfig {
    pub fn is_enabled(&self) -> bool {
        self.backend != CacheBackend::None
    }

    /// Returns the memory capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn memory_capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.memory_capacity).unwrap_or(NonZeroUsize::MIN)
    }

    /// Returns the pipeline capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn pipeline_capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.pipeline_capacity).unwrap_or(NonZeroUsize::MIN)
    }

    /// Open the configured store, or `None` when caching is disabled.
    pub fn open_store(&self) -> Result<Option<Arc<dyn CacheStore>>, CacheError> {
        let store: Arc<dyn CacheStore> = match self.backend {
            CacheBackend::None => return Ok(None),
            CacheBackend::Memory => Arc::new(MemoryCacheStore::new(self.memory_capacity_non_zero())),
            CacheBackend::File => Arc::new(FileCacheStore::new(self.directory.clone())?),
        };

        info!(
            target = "cache::config",
            op = "cache::open_store",
            backend = %self.backend,
            "Render cache enabled"
        );
        Ok(Some(store))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert_eq!(config.backend, CacheBackend::None);
        assert!(!config.is_enabled());
        assert_eq!(config.memory_capacity, 256);
        assert_eq!(config.pipeline_capacity, 16);
        assert_eq!(config.directory, PathBuf::from(".hubdown-cache"));
    }

    #[test]
    fn zero_capacities_clamp_to_one() {
        let config = CacheConfig {
            memory_capacity: 0,
            pipeline_capacity: 0,
            ..Default::default()
        };
        assert_eq!(config.memory_capacity_non_zero().get(), 1);
        assert_eq!(config.pipeline_capacity_non_zero().get(), 1);
    }

    #[test]
    fn backend_names_parse_case_insensitively() {
        assert_eq!("Memory".parse::<CacheBackend>(), Ok(CacheBackend::Memory));
        assert_eq!("file".parse::<CacheBackend>(), Ok(CacheBackend::File));
        assert_eq!("off".parse::<CacheBackend>(), Ok(CacheBackend::None));
        assert!("redis".parse::<CacheBackend>().is_err());
    }

    #[test]
    fn disabled_backend_opens_nothing() {
        let store = CacheConfig::default().open_store().expect("open");
        assert!(store.is_none());
    }

    #[test]
    fn file_backend_creates_its_directory() {
        let dir = TempDir::new().expect("tempdir");
        let config = CacheConfig {
            backend: CacheBackend::File,
            directory: dir.path().join("nested/cache"),
            ..Default::default()
        };

        let store = config.open_store().expect("open");
        assert!(store.is_some());
        assert!(config.directory.is_dir());
    }
}
