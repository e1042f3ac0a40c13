//! Cache storage seams and the in-memory backend.
//!
//! `CacheStorage` is the host's `caches` object: it opens stores by name and
//! can search all of them. `CacheStore` is a single named store.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use lru::LruCache;
use metrics::counter;
use tracing::debug;

use crate::domain::RequestIdentity;

use super::config::CacheConfig;
use super::error::CacheError;
use super::lock::{read_guard, write_guard};
use super::response::CachedResponse;

const METRIC_CACHE_EVICT: &str = "wombat_cache_evict_total";

/// A single named key-value store of captured responses.
#[async_trait]
pub trait CacheStore: Send + Sync {
    fn name(&self) -> &str;

    /// Look up a stored response for `request`.
    async fn match_request(
        &self,
        request: &RequestIdentity,
    ) -> Result<Option<CachedResponse>, CacheError>;

    /// Upsert `response` under the identity of `request`. Last write wins.
    async fn put(
        &self,
        request: &RequestIdentity,
        response: CachedResponse,
    ) -> Result<(), CacheError>;
}

/// The set of named stores available to the interceptor.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open the store called `name`, creating it on first use.
    async fn open(&self, name: &str) -> Result<Arc<dyn CacheStore>, CacheError>;

    /// Search every known store for `request`.
    async fn match_request(
        &self,
        request: &RequestIdentity,
    ) -> Result<Option<CachedResponse>, CacheError>;
}

/// Reject names that cannot double as a directory name.
pub fn validate_cache_name(name: &str) -> Result<(), CacheError> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(CacheError::InvalidName(name.to_string()))
    }
}

/// LRU-bounded in-memory store.
pub struct MemoryCacheStore {
    name: String,
    entries: RwLock<LruCache<String, CachedResponse>>,
    max_body_bytes: usize,
}

impl MemoryCacheStore {
    pub fn new(name: impl Into<String>, config: &CacheConfig) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(LruCache::new(config.max_entries_non_zero())),
            max_body_bytes: config.max_body_bytes,
        }
    }

    /// Number of stored responses.
    pub fn len(&self) -> usize {
        read_guard(&self.entries, &self.name, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn match_request(
        &self,
        request: &RequestIdentity,
    ) -> Result<Option<CachedResponse>, CacheError> {
        let mut entries = write_guard(&self.entries, &self.name, "match");
        Ok(entries
            .get(&request.cache_key())
            .filter(|entry| entry.matches(request))
            .cloned())
    }

    async fn put(
        &self,
        request: &RequestIdentity,
        response: CachedResponse,
    ) -> Result<(), CacheError> {
        let entry = response.prepare_for(request, self.max_body_bytes)?;
        let key = request.cache_key();

        let evicted = write_guard(&self.entries, &self.name, "put").push(key.clone(), entry);
        if let Some((evicted_key, _)) = evicted
            && evicted_key != key
        {
            counter!(METRIC_CACHE_EVICT, "cache" => self.name.clone()).increment(1);
            debug!(cache = %self.name, key = %evicted_key, "evicted cached response");
        }
        Ok(())
    }
}

/// Process-wide in-memory storage; stores are searched in open order.
pub struct MemoryCacheStorage {
    config: CacheConfig,
    stores: RwLock<Vec<Arc<MemoryCacheStore>>>,
}

impl MemoryCacheStorage {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            stores: RwLock::new(Vec::new()),
        }
    }

    /// Names of the stores opened so far, in open order.
    pub fn names(&self) -> Vec<String> {
        read_guard(&self.stores, "memory", "names")
            .iter()
            .map(|store| store.name.clone())
            .collect()
    }

    /// Open `name` and keep the concrete type, for inspection.
    pub fn open_store(&self, name: &str) -> Result<Arc<MemoryCacheStore>, CacheError> {
        validate_cache_name(name)?;

        if let Some(store) = read_guard(&self.stores, "memory", "open.lookup")
            .iter()
            .find(|store| store.name == name)
        {
            return Ok(Arc::clone(store));
        }

        let mut stores = write_guard(&self.stores, "memory", "open.create");
        // Another task may have created it between the two guards.
        if let Some(store) = stores.iter().find(|store| store.name == name) {
            return Ok(Arc::clone(store));
        }
        let store = Arc::new(MemoryCacheStore::new(name, &self.config));
        stores.push(Arc::clone(&store));
        debug!(cache = name, "opened in-memory cache store");
        Ok(store)
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn CacheStore>, CacheError> {
        let store: Arc<dyn CacheStore> = self.open_store(name)?;
        Ok(store)
    }

    async fn match_request(
        &self,
        request: &RequestIdentity,
    ) -> Result<Option<CachedResponse>, CacheError> {
        let stores: Vec<Arc<MemoryCacheStore>> =
            read_guard(&self.stores, "memory", "match_all").clone();
        for store in stores {
            if let Some(found) = store.match_request(request).await? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderMap, Method, StatusCode, Uri};
    use bytes::Bytes;

    use super::*;

    fn ok(body: &'static str) -> CachedResponse {
        CachedResponse::new(StatusCode::OK, &HeaderMap::new(), Bytes::from_static(body.as_bytes()))
    }

    fn get(uri: &'static str) -> RequestIdentity {
        RequestIdentity::get(Uri::from_static(uri))
    }

    #[tokio::test]
    async fn put_then_match_roundtrip() {
        let storage = MemoryCacheStorage::new(CacheConfig::default());
        let store = storage.open("wombat-pwa").await.expect("open");

        assert!(store.match_request(&get("/data.json")).await.unwrap().is_none());

        store.put(&get("/data.json"), ok("{\"a\":1}")).await.expect("put");

        let cached = store
            .match_request(&get("/data.json"))
            .await
            .unwrap()
            .expect("cached");
        assert_eq!(cached.status(), StatusCode::OK);
        assert_eq!(cached.body(), &Bytes::from_static(b"{\"a\":1}"));
    }

    #[tokio::test]
    async fn put_replaces_previous_entry() {
        let storage = MemoryCacheStorage::new(CacheConfig::default());
        let store = storage.open_store("wombat-pwa").expect("open");

        store.put(&get("/data.json"), ok("old")).await.unwrap();
        store.put(&get("/data.json"), ok("new")).await.unwrap();

        let cached = store.match_request(&get("/data.json")).await.unwrap().unwrap();
        assert_eq!(cached.body(), &Bytes::from_static(b"new"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn non_get_requests_never_match() {
        let storage = MemoryCacheStorage::new(CacheConfig::default());
        let store = storage.open_store("wombat-pwa").expect("open");
        store.put(&get("/data.json"), ok("x")).await.unwrap();

        let head = RequestIdentity::new(
            Method::HEAD,
            Uri::from_static("/data.json"),
            HeaderMap::new(),
        );
        assert!(store.match_request(&head).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn open_returns_the_same_store() {
        let storage = MemoryCacheStorage::new(CacheConfig::default());
        let first = storage.open_store("wombat-pwa").unwrap();
        let second = storage.open_store("wombat-pwa").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(storage.names(), vec!["wombat-pwa".to_string()]);
    }

    #[tokio::test]
    async fn storage_match_searches_every_store_in_open_order() {
        let storage = MemoryCacheStorage::new(CacheConfig::default());
        let older = storage.open_store("assets-v1").unwrap();
        let newer = storage.open_store("wombat-pwa").unwrap();

        newer.put(&get("/index.html"), ok("newer")).await.unwrap();
        assert_eq!(
            storage
                .match_request(&get("/index.html"))
                .await
                .unwrap()
                .unwrap()
                .body(),
            &Bytes::from_static(b"newer")
        );

        older.put(&get("/index.html"), ok("older")).await.unwrap();
        assert_eq!(
            storage
                .match_request(&get("/index.html"))
                .await
                .unwrap()
                .unwrap()
                .body(),
            &Bytes::from_static(b"older")
        );
    }

    #[tokio::test]
    async fn lru_eviction_respects_max_entries() {
        let config = CacheConfig {
            max_entries: 2,
            ..Default::default()
        };
        let storage = MemoryCacheStorage::new(config);
        let store = storage.open_store("wombat-pwa").unwrap();

        store.put(&get("/one"), ok("1")).await.unwrap();
        store.put(&get("/two"), ok("2")).await.unwrap();
        store.put(&get("/three"), ok("3")).await.unwrap();

        assert!(store.match_request(&get("/one")).await.unwrap().is_none());
        assert!(store.match_request(&get("/two")).await.unwrap().is_some());
        assert!(store.match_request(&get("/three")).await.unwrap().is_some());
    }

    #[test]
    fn cache_names_are_validated() {
        assert!(validate_cache_name("wombat-pwa").is_ok());
        assert!(validate_cache_name("assets_v1.2").is_ok());
        assert!(validate_cache_name("").is_err());
        assert!(validate_cache_name("..").is_err());
        assert!(validate_cache_name("a/b").is_err());
    }
}
