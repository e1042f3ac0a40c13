//! Selection of the cache storage backend at startup.

use std::sync::Arc;

use tracing::info;

use crate::cache::{CacheConfig, CacheStorage, DiskCacheStorage, MemoryCacheStorage};
use crate::config::{CacheBackend, CacheSettings};

use super::error::InfraError;

/// Build the configured backend behind the `CacheStorage` seam.
pub fn build_storage(settings: &CacheSettings) -> Result<Arc<dyn CacheStorage>, InfraError> {
    let config = CacheConfig::from(settings);

    let storage: Arc<dyn CacheStorage> = match settings.backend {
        CacheBackend::Memory => {
            info!(
                max_entries = config.max_entries_non_zero().get(),
                "using in-memory cache storage"
            );
            Arc::new(MemoryCacheStorage::new(config))
        }
        CacheBackend::Disk => {
            let storage = DiskCacheStorage::new(settings.directory.clone(), &config)?;
            info!(directory = %storage.root().display(), "using disk cache storage");
            Arc::new(storage)
        }
    };

    Ok(storage)
}
