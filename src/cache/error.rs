use std::path::PathBuf;

use axum::http::Method;
use thiserror::Error;

/// Errors raised by cache storage backends.
///
/// None of these reach the caller of the interceptor: a failed write is
/// logged and dropped, a failed lookup is treated as a miss.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("invalid cache name `{0}`")]
    InvalidName(String),
    #[error("only GET requests can be cached, got {0}")]
    UnsupportedMethod(Method),
    #[error("partial content responses cannot be cached")]
    PartialContent,
    #[error("responses varying on `*` cannot be cached")]
    VaryWildcard,
    #[error("response body of {size} bytes exceeds the {limit} byte limit")]
    BodyTooLarge { size: usize, limit: usize },
    #[error("failed to buffer response body: {0}")]
    Buffer(String),
    #[error("corrupt cache entry `{}`: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CacheError {
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Short label for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            CacheError::InvalidName(_) => "invalid_name",
            CacheError::UnsupportedMethod(_) => "unsupported_method",
            CacheError::PartialContent => "partial_content",
            CacheError::VaryWildcard => "vary_wildcard",
            CacheError::BodyTooLarge { .. } => "body_too_large",
            CacheError::Buffer(_) => "buffer",
            CacheError::Corrupt { .. } => "corrupt",
            CacheError::Io(_) => "io",
        }
    }
}
