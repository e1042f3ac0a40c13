//! Network-first request interception with offline fallback.
//!
//! Every intercepted request goes to the network first. A completed
//! exchange is returned as-is; a 2xx one is also copied into the configured
//! cache store by a detached task. When the network fails outright the
//! request is answered from the cache, or with the synthetic network-error
//! response when nothing is stored.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request},
    response::Response,
};
use metrics::counter;
use tracing::{Instrument, debug, instrument, warn};
use uuid::Uuid;

use crate::cache::{
    CacheConfig, CacheError, CacheStorage, CachedResponse, declared_length, duplicate_response,
};
use crate::domain::{RequestIdentity, ResponseOrigin, network_error_response};

use super::fetch::{FetchError, Fetcher};

const METRIC_NETWORK_SUCCESS: &str = "wombat_network_success_total";
const METRIC_NETWORK_FAILURE: &str = "wombat_network_failure_total";
const METRIC_FALLBACK_HIT: &str = "wombat_cache_fallback_hit_total";
const METRIC_FALLBACK_MISS: &str = "wombat_cache_fallback_miss_total";
const METRIC_CACHE_WRITE: &str = "wombat_cache_write_total";
const METRIC_CACHE_WRITE_FAILED: &str = "wombat_cache_write_failed_total";

/// Handler registered with the host's dispatch table.
///
/// `handle` always resolves to a response; failures are folded into the
/// response it returns.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, request: Request<Body>) -> Response;
}

/// Network-first caching strategy.
pub struct NetworkFirst {
    fetcher: Arc<dyn Fetcher>,
    storage: Arc<dyn CacheStorage>,
    config: CacheConfig,
}

impl NetworkFirst {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        storage: Arc<dyn CacheStorage>,
        config: CacheConfig,
    ) -> Self {
        Self {
            fetcher,
            storage,
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Handle a response the network completed with.
    ///
    /// Errors only when the body cannot be read, which the caller treats
    /// like any other network failure.
    async fn from_network(
        &self,
        identity: &RequestIdentity,
        response: Response,
    ) -> Result<Response, FetchError> {
        let status = response.status();
        counter!(METRIC_NETWORK_SUCCESS).increment(1);

        if !status.is_success() {
            debug!(status = status.as_u16(), "returning uncached network response");
            return Ok(with_origin(response, ResponseOrigin::Network));
        }

        // Only GET responses are storable; anything else streams straight through.
        if identity.method() != Method::GET {
            debug!(method = %identity.method(), "returning uncacheable network response");
            return Ok(with_origin(response, ResponseOrigin::Network));
        }

        if let Some(length) = declared_length(&response)
            && length > self.config.max_body_bytes
        {
            record_write_failure(&CacheError::BodyTooLarge {
                size: length,
                limit: self.config.max_body_bytes,
            });
            return Ok(with_origin(response, ResponseOrigin::Network));
        }

        let (response, copy) = duplicate_response(response)
            .await
            .map_err(|err| FetchError::ResponseBody(err.to_string()))?;
        self.spawn_store(identity.clone(), copy);

        Ok(with_origin(response, ResponseOrigin::Network))
    }

    /// Upsert `copy` without holding up the caller. Best effort, at most
    /// once: the outcome is only logged and counted.
    fn spawn_store(&self, identity: RequestIdentity, copy: CachedResponse) {
        let storage = Arc::clone(&self.storage);
        let cache_name = self.config.cache_name.clone();

        tokio::spawn(
            async move {
                let result = match storage.open(&cache_name).await {
                    Ok(store) => store.put(&identity, copy).await,
                    Err(err) => Err(err),
                };
                match result {
                    Ok(()) => {
                        counter!(METRIC_CACHE_WRITE).increment(1);
                        debug!(cache = %cache_name, key = %identity.cache_key(), "stored network response");
                    }
                    Err(err) => record_write_failure(&err),
                }
            }
            .in_current_span(),
        );
    }

    async fn from_cache(&self, identity: &RequestIdentity, error: FetchError) -> Response {
        counter!(METRIC_NETWORK_FAILURE, "kind" => error.kind()).increment(1);
        warn!(error = %error, "network request failed, falling back to cache");

        match self.storage.match_request(identity).await {
            Ok(Some(cached)) => {
                counter!(METRIC_FALLBACK_HIT).increment(1);
                debug!(stored_at = %cached.stored_at(), "serving cached response");
                with_origin(cached.into_response(), ResponseOrigin::Cache)
            }
            Ok(None) => {
                counter!(METRIC_FALLBACK_MISS).increment(1);
                debug!("no cached response, returning network error");
                network_error_response()
            }
            Err(err) => {
                counter!(METRIC_FALLBACK_MISS).increment(1);
                warn!(error = %err, "cache lookup failed, returning network error");
                network_error_response()
            }
        }
    }
}

#[async_trait]
impl RequestHandler for NetworkFirst {
    #[instrument(
        skip_all,
        fields(
            request_id = %Uuid::new_v4(),
            method = %request.method(),
            uri = %request.uri(),
        )
    )]
    async fn handle(&self, request: Request<Body>) -> Response {
        let identity = RequestIdentity::of(&request);

        let outcome = match self.fetcher.fetch(request).await {
            Ok(response) => self.from_network(&identity, response).await,
            Err(err) => Err(err),
        };

        match outcome {
            Ok(response) => response,
            Err(err) => self.from_cache(&identity, err).await,
        }
    }
}

fn with_origin(mut response: Response, origin: ResponseOrigin) -> Response {
    origin.attach(&mut response);
    response
}

fn record_write_failure(error: &CacheError) {
    counter!(METRIC_CACHE_WRITE_FAILED, "reason" => error.kind()).increment(1);
    warn!(error = %error, "failed to store network response");
}
