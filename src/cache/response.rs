//! Captured responses and body duplication.

use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header},
    response::Response,
};
use bytes::Bytes;
use http_body_util::BodyExt;
use time::OffsetDateTime;

use crate::domain::RequestIdentity;

use super::error::CacheError;

/// A response captured for storage: status, headers and a fully buffered body.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    status: StatusCode,
    headers: Vec<(HeaderName, HeaderValue)>,
    body: Bytes,
    vary: Vec<(HeaderName, Option<HeaderValue>)>,
    stored_at: OffsetDateTime,
}

impl CachedResponse {
    pub fn new(status: StatusCode, headers: &HeaderMap, body: Bytes) -> Self {
        let mut stored_headers = Vec::with_capacity(headers.len());
        for (name, value) in headers.iter() {
            stored_headers.push((name.clone(), value.clone()));
        }

        Self {
            status,
            headers: stored_headers,
            body,
            vary: Vec::new(),
            stored_at: OffsetDateTime::now_utc(),
        }
    }

    /// Rebuild an entry read back from persistent storage.
    pub(crate) fn from_parts(
        status: StatusCode,
        headers: Vec<(HeaderName, HeaderValue)>,
        body: Bytes,
        vary: Vec<(HeaderName, Option<HeaderValue>)>,
        stored_at: OffsetDateTime,
    ) -> Self {
        Self {
            status,
            headers,
            body,
            vary,
            stored_at,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &[(HeaderName, HeaderValue)] {
        &self.headers
    }

    pub fn header(&self, name: &HeaderName) -> Option<&HeaderValue> {
        self.headers
            .iter()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, value)| value)
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn vary(&self) -> &[(HeaderName, Option<HeaderValue>)] {
        &self.vary
    }

    pub fn stored_at(&self) -> OffsetDateTime {
        self.stored_at
    }

    /// Check the host's storage rules and snapshot the request headers the
    /// response varies on.
    ///
    /// Mirrors the browser Cache API: only `GET` requests, no `206`, no
    /// `Vary: *`.
    pub fn prepare_for(
        mut self,
        request: &RequestIdentity,
        max_body_bytes: usize,
    ) -> Result<Self, CacheError> {
        if request.method() != Method::GET {
            return Err(CacheError::UnsupportedMethod(request.method().clone()));
        }
        if self.status == StatusCode::PARTIAL_CONTENT {
            return Err(CacheError::PartialContent);
        }
        if self.body.len() > max_body_bytes {
            return Err(CacheError::BodyTooLarge {
                size: self.body.len(),
                limit: max_body_bytes,
            });
        }

        let names = self.vary_names()?;
        self.vary = names
            .into_iter()
            .map(|name| {
                let value = request.header(&name).cloned();
                (name, value)
            })
            .collect();
        Ok(self)
    }

    /// True when `request` may be answered with this entry.
    ///
    /// The caller is responsible for having matched method and URI already.
    pub fn matches(&self, request: &RequestIdentity) -> bool {
        self.vary
            .iter()
            .all(|(name, stored)| request.header(name) == stored.as_ref())
    }

    pub fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;

        let headers = response.headers_mut();
        headers.clear();
        for (name, value) in self.headers {
            headers.append(name, value);
        }

        response
    }

    fn vary_names(&self) -> Result<Vec<HeaderName>, CacheError> {
        let mut names = Vec::new();
        for (name, value) in &self.headers {
            if *name != header::VARY {
                continue;
            }
            let Ok(value) = value.to_str() else {
                continue;
            };
            for token in value.split(',').map(str::trim).filter(|t| !t.is_empty()) {
                if token == "*" {
                    return Err(CacheError::VaryWildcard);
                }
                if let Ok(name) = HeaderName::from_bytes(token.to_ascii_lowercase().as_bytes())
                    && !names.contains(&name)
                {
                    names.push(name);
                }
            }
        }
        Ok(names)
    }
}

/// Buffer a single-consumption response body once and split it into the
/// copy handed back to the caller and the copy handed to the cache.
///
/// Both copies share the same `Bytes`, so reading one never drains the other.
pub async fn duplicate_response(
    response: Response,
) -> Result<(Response, CachedResponse), CacheError> {
    let (parts, body) = response.into_parts();
    let collected = BodyExt::collect(body)
        .await
        .map_err(|error| CacheError::Buffer(error.to_string()))?;
    let bytes = collected.to_bytes();
    let cached = CachedResponse::new(parts.status, &parts.headers, bytes.clone());
    let rebuilt = Response::from_parts(parts, Body::from(bytes));
    Ok((rebuilt, cached))
}

/// Declared body length, when the response advertises one.
pub fn declared_length(response: &Response) -> Option<usize> {
    response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
}
