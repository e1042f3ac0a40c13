use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{HeaderValue, Method, Request, StatusCode, header},
    response::Response,
};
use metrics_util::debugging::DebuggingRecorder;
use wombat_pwa::application::fetch::{FetchError, Fetcher};
use wombat_pwa::application::interceptor::{NetworkFirst, RequestHandler};
use wombat_pwa::cache::{CacheConfig, MemoryCacheStorage};
use wombat_pwa::infra::telemetry::describe_metrics;

struct ToggleNetwork {
    online: AtomicBool,
}

#[async_trait]
impl Fetcher for ToggleNetwork {
    async fn fetch(&self, request: Request<Body>) -> Result<Response, FetchError> {
        if self.online.load(Ordering::SeqCst) {
            let mut response = Response::new(Body::from("ok"));
            if request.uri().path() == "/wildcard" {
                response
                    .headers_mut()
                    .insert(header::VARY, HeaderValue::from_static("*"));
            }
            Ok(response)
        } else {
            Err(FetchError::Timeout)
        }
    }
}

fn request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request should build")
}

#[tokio::test]
async fn interceptor_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");
    describe_metrics();

    let network = Arc::new(ToggleNetwork {
        online: AtomicBool::new(true),
    });
    let config = CacheConfig {
        max_entries: 1,
        ..Default::default()
    };
    let storage = Arc::new(MemoryCacheStorage::new(config.clone()));
    let handler = NetworkFirst::new(network.clone(), storage, config);

    // Two cacheable responses into a one-entry store: write + evict
    for uri in ["/one", "/two"] {
        let response = handler.handle(request(Method::GET, uri)).await;
        assert_eq!(response.status(), StatusCode::OK);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    // Rejected write
    handler.handle(request(Method::GET, "/wildcard")).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Fallback hit and miss
    network.online.store(false, Ordering::SeqCst);
    let hit = handler.handle(request(Method::GET, "/two")).await;
    assert_eq!(hit.status(), StatusCode::OK);
    let miss = handler.handle(request(Method::GET, "/one")).await;
    assert_eq!(miss.status(), StatusCode::BAD_GATEWAY);

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "wombat_network_success_total",
        "wombat_network_failure_total",
        "wombat_cache_fallback_hit_total",
        "wombat_cache_fallback_miss_total",
        "wombat_cache_write_total",
        "wombat_cache_write_failed_total",
        "wombat_cache_evict_total",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
