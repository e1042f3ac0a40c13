//! Request identity used as the cache key.

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Request, Uri};

/// The parts of an outgoing request that identify it to the cache.
///
/// Captured before the request body is handed to the network so the identity
/// outlives the request itself.
#[derive(Debug, Clone)]
pub struct RequestIdentity {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
}

impl RequestIdentity {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap) -> Self {
        Self {
            method,
            uri,
            headers,
        }
    }

    /// Capture the identity of a request without consuming it.
    pub fn of<B>(request: &Request<B>) -> Self {
        Self::new(
            request.method().clone(),
            request.uri().clone(),
            request.headers().clone(),
        )
    }

    /// Convenience constructor for a bodiless `GET`.
    pub fn get(uri: Uri) -> Self {
        Self::new(Method::GET, uri, HeaderMap::new())
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &HeaderName) -> Option<&HeaderValue> {
        self.headers.get(name)
    }

    /// Primary key: method and full URI. `Vary` headers are compared on match.
    pub fn cache_key(&self) -> String {
        format!("{} {}", self.method, self.uri)
    }
}
