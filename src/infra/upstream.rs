//! `reqwest`-backed fetcher forwarding requests to the upstream origin.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, Request, Uri, header},
    response::Response,
};
use http_body_util::BodyExt;
use reqwest::{Client, redirect};
use tracing::debug;
use url::Url;

use crate::application::fetch::{FetchError, Fetcher};
use crate::config::UpstreamSettings;

use super::error::InfraError;

/// Connection-level headers that must not be forwarded by a proxy.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Forwards every request to a fixed upstream origin.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: Client,
    upstream: Url,
}

impl ReqwestFetcher {
    pub fn new(settings: &UpstreamSettings) -> Result<Self, InfraError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .connect_timeout(settings.connect_timeout)
            .redirect(redirect::Policy::none())
            .user_agent(concat!("wombat-pwa/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| {
                InfraError::configuration(format!("failed to build upstream client: {err}"))
            })?;

        Ok(Self {
            client,
            upstream: settings.url.clone(),
        })
    }

    pub fn upstream(&self) -> &Url {
        &self.upstream
    }

    /// Map an incoming request URI onto the upstream origin, keeping any
    /// base path the upstream URL carries.
    pub fn target_url(&self, uri: &Uri) -> Url {
        let mut target = self.upstream.clone();
        let base = target.path().trim_end_matches('/').to_string();
        target.set_path(&format!("{base}{}", uri.path()));
        target.set_query(uri.query());
        target
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, request: Request<Body>) -> Result<Response, FetchError> {
        let (parts, body) = request.into_parts();
        let body = BodyExt::collect(body)
            .await
            .map_err(|err| FetchError::RequestBody(err.to_string()))?
            .to_bytes();

        let target = self.target_url(&parts.uri);
        let mut headers = strip_hop_by_hop(parts.headers);
        headers.remove(header::HOST);

        debug!(method = %parts.method, target = %target, "forwarding request upstream");

        let upstream = self
            .client
            .request(parts.method, target)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(classify)?;

        let status = upstream.status();
        let headers = strip_hop_by_hop(upstream.headers().clone());

        // Headers are returned as soon as they arrive; the body follows as a stream.
        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

fn strip_hop_by_hop(mut headers: HeaderMap) -> HeaderMap {
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
    headers
}

fn classify(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else if err.is_connect() {
        FetchError::Connect(err.to_string())
    } else if err.is_builder() {
        FetchError::InvalidRequest(err.to_string())
    } else {
        FetchError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn fetcher(upstream: &str) -> ReqwestFetcher {
        ReqwestFetcher::new(&UpstreamSettings {
            url: Url::parse(upstream).unwrap(),
            timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(1),
        })
        .expect("client builds")
    }

    #[test]
    fn target_url_keeps_path_and_query() {
        let fetcher = fetcher("http://origin.test:8000");
        let target = fetcher.target_url(&Uri::from_static("/data.json?page=2"));
        assert_eq!(target.as_str(), "http://origin.test:8000/data.json?page=2");
    }

    #[test]
    fn target_url_prefixes_upstream_base_path() {
        let fetcher = fetcher("http://origin.test/wombat/");
        let target = fetcher.target_url(&Uri::from_static("/index.html"));
        assert_eq!(target.as_str(), "http://origin.test/wombat/index.html");
    }

    #[test]
    fn hop_by_hop_headers_are_removed() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, "keep-alive".parse().unwrap());
        headers.insert(header::TRANSFER_ENCODING, "chunked".parse().unwrap());
        headers.insert(header::ACCEPT, "*/*".parse().unwrap());

        let headers = strip_hop_by_hop(headers);
        assert!(headers.get(header::CONNECTION).is_none());
        assert!(headers.get(header::TRANSFER_ENCODING).is_none());
        assert!(headers.get(header::ACCEPT).is_some());
    }
}
