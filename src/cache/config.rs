//! Cache configuration.
//!
//! Injected into the interceptor and the storage backends instead of
//! process-wide constants, so tests can run against isolated stores.

use std::num::NonZeroUsize;

pub const DEFAULT_CACHE_NAME: &str = "wombat-pwa";
pub const DEFAULT_PRECACHE_MANIFEST: [&str; 4] =
    ["./", "./index.html", "./wombat.js", "./wombat_bg.wasm"];
const DEFAULT_MAX_ENTRIES: usize = 200;
const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Cache configuration handed to the interceptor and storage backends,
/// resolved from the validated `[cache]` settings.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Name of the store successful responses are written to.
    pub cache_name: String,
    /// Assets intended for precaching. Carried as configuration only.
    pub precache_manifest: Vec<String>,
    /// Maximum responses per in-memory store.
    pub max_entries: usize,
    /// Largest body, in bytes, that will be stored.
    pub max_body_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_name: DEFAULT_CACHE_NAME.to_string(),
            precache_manifest: DEFAULT_PRECACHE_MANIFEST
                .iter()
                .map(|path| path.to_string())
                .collect(),
            max_entries: DEFAULT_MAX_ENTRIES,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            cache_name: settings.name.clone(),
            precache_manifest: settings.precache_manifest.clone(),
            max_entries: settings.max_entries,
            max_body_bytes: settings.max_body_bytes,
        }
    }
}

impl CacheConfig {
    /// Returns the entry limit as NonZeroUsize, clamping to 1 if zero.
    pub fn max_entries_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_entries).unwrap_or(NonZeroUsize::MIN)
    }
}
