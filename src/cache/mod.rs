//! Wombat cache storage.
//!
//! Named response stores the interceptor writes successful responses into
//! and falls back to when the network is unreachable.
//!
//! - **Memory**: process-wide, LRU-bounded per store
//! - **Disk**: persistent, one directory per store
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! name = "wombat-pwa"
//! backend = "disk"
//! directory = "cache"
//! # ... see config.rs for all options
//! ```

mod config;
mod disk;
mod error;
mod lock;
mod response;
mod store;

pub use config::{CacheConfig, DEFAULT_CACHE_NAME, DEFAULT_PRECACHE_MANIFEST};
pub use disk::{DiskCacheStorage, DiskCacheStore};
pub use error::CacheError;
pub use response::{CachedResponse, declared_length, duplicate_response};
pub use store::{
    CacheStorage, CacheStore, MemoryCacheStorage, MemoryCacheStore, validate_cache_name,
};
