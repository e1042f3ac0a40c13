//! The network primitive the interceptor forwards requests to.

use async_trait::async_trait;
use axum::{body::Body, http::Request, response::Response};
use thiserror::Error;

/// Outright failures of the network primitive.
///
/// A completed exchange with an error status is not a `FetchError`.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to connect to upstream: {0}")]
    Connect(String),
    #[error("upstream request timed out")]
    Timeout,
    #[error("invalid upstream request: {0}")]
    InvalidRequest(String),
    #[error("failed to read request body: {0}")]
    RequestBody(String),
    #[error("failed to read upstream response body: {0}")]
    ResponseBody(String),
    #[error("network error: {0}")]
    Other(String),
}

impl FetchError {
    /// Short label for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Connect(_) => "connect",
            FetchError::Timeout => "timeout",
            FetchError::InvalidRequest(_) => "invalid_request",
            FetchError::RequestBody(_) => "request_body",
            FetchError::ResponseBody(_) => "response_body",
            FetchError::Other(_) => "other",
        }
    }
}

/// Performs a request against the network.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: Request<Body>) -> Result<Response, FetchError>;
}
