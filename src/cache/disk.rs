//! Filesystem-backed cache storage.
//!
//! Layout: one directory per named store under the storage root, one file
//! per entry named after the SHA-256 of the request's cache key. An entry
//! file holds a big-endian `u32` metadata length, the JSON metadata, then the
//! raw body. Writes go to a temporary file that is renamed into place, so a
//! reader sees either the previous entry or the new one.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use tokio::fs;
use metrics::counter;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::RequestIdentity;

use super::config::CacheConfig;
use super::error::CacheError;
use super::lock::{read_guard, write_guard};
use super::response::CachedResponse;
use super::store::{CacheStorage, CacheStore, validate_cache_name};

const ENTRY_EXTENSION: &str = "entry";
const LENGTH_PREFIX: usize = 4;
const METRIC_CACHE_LOOKUP_FAILED: &str = "wombat_cache_lookup_failed_total";

#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    method: String,
    uri: String,
    status: u16,
    headers: Vec<(String, String)>,
    vary: Vec<(String, Option<String>)>,
    #[serde(with = "time::serde::timestamp")]
    stored_at: OffsetDateTime,
}

/// A named store persisted in its own directory.
#[derive(Debug)]
pub struct DiskCacheStore {
    name: String,
    directory: PathBuf,
    max_body_bytes: usize,
}

impl DiskCacheStore {
    fn new(name: &str, directory: PathBuf, max_body_bytes: usize) -> Self {
        Self {
            name: name.to_string(),
            directory,
            max_body_bytes,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn entry_path(&self, request: &RequestIdentity) -> PathBuf {
        let digest = Sha256::digest(request.cache_key().as_bytes());
        self.directory
            .join(format!("{}.{ENTRY_EXTENSION}", hex::encode(digest.as_slice())))
    }
}

#[async_trait]
impl CacheStore for DiskCacheStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn match_request(
        &self,
        request: &RequestIdentity,
    ) -> Result<Option<CachedResponse>, CacheError> {
        let path = self.entry_path(request);
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(CacheError::Io(err)),
        };

        let (meta, body) = decode_entry(&path, Bytes::from(raw))?;
        if meta.method != request.method().as_str() || meta.uri != request.uri().to_string() {
            return Ok(None);
        }

        let entry = entry_from_meta(&path, meta, body)?;
        Ok(entry.matches(request).then_some(entry))
    }

    async fn put(
        &self,
        request: &RequestIdentity,
        response: CachedResponse,
    ) -> Result<(), CacheError> {
        let entry = response.prepare_for(request, self.max_body_bytes)?;
        let encoded = encode_entry(request, &entry)?;

        let path = self.entry_path(request);
        let staging = self
            .directory
            .join(format!(".{}.tmp", Uuid::new_v4().simple()));

        if let Err(err) = fs::write(&staging, &encoded).await {
            let _ = fs::remove_file(&staging).await;
            return Err(CacheError::Io(err));
        }
        if let Err(err) = fs::rename(&staging, &path).await {
            let _ = fs::remove_file(&staging).await;
            return Err(CacheError::Io(err));
        }

        debug!(
            cache = %self.name,
            key = %request.cache_key(),
            bytes = entry.body().len(),
            "persisted cached response"
        );
        Ok(())
    }
}

/// Persistent storage rooted at a directory; stores are searched in name order.
#[derive(Debug)]
pub struct DiskCacheStorage {
    root: PathBuf,
    max_body_bytes: usize,
    stores: RwLock<BTreeMap<String, Arc<DiskCacheStore>>>,
}

impl DiskCacheStorage {
    /// Initialise storage rooted at `root`, creating it if necessary.
    pub fn new(root: PathBuf, config: &CacheConfig) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            max_body_bytes: config.max_body_bytes,
            stores: RwLock::new(BTreeMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Open `name` and keep the concrete type, for inspection.
    pub async fn open_store(&self, name: &str) -> Result<Arc<DiskCacheStore>, CacheError> {
        validate_cache_name(name)?;

        let existing = read_guard(&self.stores, "disk", "open.lookup")
            .get(name)
            .cloned();
        if let Some(store) = existing {
            return Ok(store);
        }

        let directory = self.root.join(name);
        fs::create_dir_all(&directory).await?;

        let mut stores = write_guard(&self.stores, "disk", "open.create");
        let store = stores
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(cache = name, directory = %directory.display(), "opened disk cache store");
                Arc::new(DiskCacheStore::new(name, directory, self.max_body_bytes))
            });
        Ok(Arc::clone(store))
    }

    /// Names of every store present on disk, including ones created by an
    /// earlier process.
    pub async fn names(&self) -> Result<Vec<String>, CacheError> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str()
                && validate_cache_name(name).is_ok()
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

#[async_trait]
impl CacheStorage for DiskCacheStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn CacheStore>, CacheError> {
        let store: Arc<dyn CacheStore> = self.open_store(name).await?;
        Ok(store)
    }

    async fn match_request(
        &self,
        request: &RequestIdentity,
    ) -> Result<Option<CachedResponse>, CacheError> {
        for name in self.names().await? {
            let lookup = match self.open_store(&name).await {
                Ok(store) => store.match_request(request).await,
                Err(err) => Err(err),
            };
            match lookup {
                Ok(Some(found)) => return Ok(Some(found)),
                Ok(None) => {}
                // One unreadable store must not hide entries in the others.
                Err(err) => {
                    counter!(METRIC_CACHE_LOOKUP_FAILED, "reason" => err.kind()).increment(1);
                    warn!(cache = %name, error = %err, "skipping unreadable cache store");
                }
            }
        }
        Ok(None)
    }
}

fn encode_entry(request: &RequestIdentity, entry: &CachedResponse) -> Result<Vec<u8>, CacheError> {
    let meta = EntryMeta {
        method: request.method().as_str().to_string(),
        uri: request.uri().to_string(),
        status: entry.status().as_u16(),
        headers: entry
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
            .collect(),
        vary: entry
            .vary()
            .iter()
            .map(|(k, v)| {
                let value = v.as_ref().and_then(|v| v.to_str().ok()).map(str::to_string);
                (k.to_string(), value)
            })
            .collect(),
        stored_at: entry.stored_at(),
    };

    let meta = serde_json::to_vec(&meta)
        .map_err(|err| CacheError::Buffer(format!("failed to encode entry metadata: {err}")))?;
    let meta_len = u32::try_from(meta.len())
        .map_err(|_| CacheError::Buffer("entry metadata exceeds u32 range".to_string()))?;

    let mut encoded = Vec::with_capacity(LENGTH_PREFIX + meta.len() + entry.body().len());
    encoded.extend_from_slice(&meta_len.to_be_bytes());
    encoded.extend_from_slice(&meta);
    encoded.extend_from_slice(entry.body());
    Ok(encoded)
}

fn decode_entry(path: &Path, raw: Bytes) -> Result<(EntryMeta, Bytes), CacheError> {
    if raw.len() < LENGTH_PREFIX {
        return Err(CacheError::corrupt(path, "truncated length prefix"));
    }
    let mut prefix = [0_u8; LENGTH_PREFIX];
    prefix.copy_from_slice(&raw[..LENGTH_PREFIX]);
    let meta_len = u32::from_be_bytes(prefix) as usize;

    let body_start = LENGTH_PREFIX
        .checked_add(meta_len)
        .filter(|end| *end <= raw.len())
        .ok_or_else(|| CacheError::corrupt(path, "metadata length out of range"))?;

    let meta: EntryMeta = serde_json::from_slice(&raw[LENGTH_PREFIX..body_start])
        .map_err(|err| CacheError::corrupt(path, err.to_string()))?;
    Ok((meta, raw.slice(body_start..)))
}

fn entry_from_meta(path: &Path, meta: EntryMeta, body: Bytes) -> Result<CachedResponse, CacheError> {
    let status = StatusCode::from_u16(meta.status)
        .map_err(|err| CacheError::corrupt(path, err.to_string()))?;

    let mut headers = Vec::with_capacity(meta.headers.len());
    for (name, value) in meta.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| CacheError::corrupt(path, err.to_string()))?;
        let value = HeaderValue::from_str(&value)
            .map_err(|err| CacheError::corrupt(path, err.to_string()))?;
        headers.push((name, value));
    }

    let mut vary = Vec::with_capacity(meta.vary.len());
    for (name, value) in meta.vary {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| CacheError::corrupt(path, err.to_string()))?;
        let value = value
            .map(|value| HeaderValue::from_str(&value))
            .transpose()
            .map_err(|err| CacheError::corrupt(path, err.to_string()))?;
        vary.push((name, value));
    }

    Ok(CachedResponse::from_parts(
        status,
        headers,
        body,
        vary,
        meta.stored_at,
    ))
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderMap, Request, Uri};

    use super::*;

    fn ok(body: &'static str, headers: &[(&'static str, &'static str)]) -> CachedResponse {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.append(*name, HeaderValue::from_static(*value));
        }
        CachedResponse::new(StatusCode::OK, &map, Bytes::from_static(body.as_bytes()))
    }

    fn get(uri: &'static str) -> RequestIdentity {
        RequestIdentity::get(Uri::from_static(uri))
    }

    #[tokio::test]
    async fn entries_survive_a_new_storage_instance() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = CacheConfig::default();

        {
            let storage = DiskCacheStorage::new(dir.path().to_path_buf(), &config).unwrap();
            let store = storage.open("wombat-pwa").await.unwrap();
            store
                .put(
                    &get("/data.json"),
                    ok("{\"a\":1}", &[("content-type", "application/json")]),
                )
                .await
                .unwrap();
        }

        let reopened = DiskCacheStorage::new(dir.path().to_path_buf(), &config).unwrap();
        let cached = reopened
            .match_request(&get("/data.json"))
            .await
            .unwrap()
            .expect("persisted entry");
        assert_eq!(cached.status(), StatusCode::OK);
        assert_eq!(cached.body(), &Bytes::from_static(b"{\"a\":1}"));
        assert_eq!(
            cached.header(&HeaderName::from_static("content-type")),
            Some(&HeaderValue::from_static("application/json"))
        );
    }

    #[tokio::test]
    async fn missing_entry_is_a_miss() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = DiskCacheStorage::new(dir.path().to_path_buf(), &CacheConfig::default())
            .unwrap();
        let store = storage.open("wombat-pwa").await.unwrap();
        assert!(store.match_request(&get("/missing")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn vary_is_persisted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = DiskCacheStorage::new(dir.path().to_path_buf(), &CacheConfig::default())
            .unwrap();
        let store = storage.open("wombat-pwa").await.unwrap();

        let english = RequestIdentity::of(
            &Request::builder()
                .uri("/index.html")
                .header("accept-language", "en")
                .body(())
                .unwrap(),
        );
        store
            .put(&english, ok("hello", &[("vary", "accept-language")]))
            .await
            .unwrap();

        assert!(store.match_request(&english).await.unwrap().is_some());
        assert!(store.match_request(&get("/index.html")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_entry_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = DiskCacheStorage::new(dir.path().to_path_buf(), &CacheConfig::default())
            .unwrap();
        let store = storage.open_store("wombat-pwa").await.unwrap();

        let path = store.entry_path(&get("/data.json"));
        std::fs::write(&path, b"\x00\x00\x00\xffnot json").unwrap();

        let err = store.match_request(&get("/data.json")).await.unwrap_err();
        assert!(matches!(err, CacheError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn names_lists_store_directories_sorted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = DiskCacheStorage::new(dir.path().to_path_buf(), &CacheConfig::default())
            .unwrap();
        storage.open("wombat-pwa").await.unwrap();
        storage.open("assets-v1").await.unwrap();
        std::fs::write(dir.path().join("stray-file"), b"ignored").unwrap();

        assert_eq!(
            storage.names().await.unwrap(),
            vec!["assets-v1".to_string(), "wombat-pwa".to_string()]
        );
    }

    #[tokio::test]
    async fn rejected_puts_leave_no_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = DiskCacheStorage::new(dir.path().to_path_buf(), &CacheConfig::default())
            .unwrap();
        let store = storage.open_store("wombat-pwa").await.unwrap();

        let err = store
            .put(&get("/data.json"), ok("x", &[("vary", "*")]))
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::VaryWildcard));
        assert_eq!(std::fs::read_dir(store.directory()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn corrupt_store_does_not_hide_later_stores() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = DiskCacheStorage::new(dir.path().to_path_buf(), &CacheConfig::default())
            .unwrap();

        let old = storage.open_store("aaa-old").await.unwrap();
        std::fs::write(old.entry_path(&get("/data.json")), b"\x00\x00\x00\xffnot json").unwrap();

        let current = storage.open_store("wombat-pwa").await.unwrap();
        current
            .put(&get("/data.json"), ok("{\"a\":1}", &[]))
            .await
            .unwrap();

        let found = storage
            .match_request(&get("/data.json"))
            .await
            .expect("search succeeds")
            .expect("valid entry found");
        assert_eq!(found.body(), &Bytes::from_static(b"{\"a\":1}"));
    }

    #[tokio::test]
    async fn corrupt_only_entry_is_a_miss_for_the_search() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = DiskCacheStorage::new(dir.path().to_path_buf(), &CacheConfig::default())
            .unwrap();
        let store = storage.open_store("wombat-pwa").await.unwrap();
        std::fs::write(store.entry_path(&get("/data.json")), b"\x00\x00").unwrap();

        assert!(storage.match_request(&get("/data.json")).await.unwrap().is_none());
    }
}
