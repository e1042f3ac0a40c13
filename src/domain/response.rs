//! Response provenance and the synthetic network-error response.

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, StatusCode},
    response::Response,
};

/// Header marking the synthetic network-error response on the wire.
pub const ORIGIN_HEADER: HeaderName = HeaderName::from_static("x-wombat-origin");

const NETWORK_ERROR_MARKER: &str = "network-error";

/// Where a response handed back to the caller came from.
///
/// Stored in the response extensions; never serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseOrigin {
    /// Fresh from the network, any status.
    Network,
    /// Replayed from the cache after a network failure.
    Cache,
    /// Neither network nor cache could answer.
    NetworkError,
}

impl ResponseOrigin {
    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }

    pub fn of(response: &Response) -> Option<Self> {
        response.extensions().get::<Self>().copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResponseOrigin::Network => "network",
            ResponseOrigin::Cache => "cache",
            ResponseOrigin::NetworkError => NETWORK_ERROR_MARKER,
        }
    }
}

/// Build the sentinel returned when both the network and the cache fail.
///
/// HTTP has no status 0, so the wire status is `502 Bad Gateway`; the
/// `x-wombat-origin` header and the [`ResponseOrigin::NetworkError`]
/// extension distinguish it from an upstream 502.
pub fn network_error_response() -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::BAD_GATEWAY;
    response.headers_mut().insert(
        ORIGIN_HEADER,
        HeaderValue::from_static(NETWORK_ERROR_MARKER),
    );
    ResponseOrigin::NetworkError.attach(&mut response);
    response
}

/// True when the response is the synthetic network-error sentinel.
pub fn is_network_error(response: &Response) -> bool {
    match ResponseOrigin::of(response) {
        Some(origin) => origin == ResponseOrigin::NetworkError,
        None => response
            .headers()
            .get(ORIGIN_HEADER)
            .is_some_and(|value| value == NETWORK_ERROR_MARKER),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_error_response_is_marked() {
        let response = network_error_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            ResponseOrigin::of(&response),
            Some(ResponseOrigin::NetworkError)
        );
        assert!(is_network_error(&response));
    }

    #[test]
    fn upstream_bad_gateway_is_not_a_network_error() {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::BAD_GATEWAY;
        ResponseOrigin::Network.attach(&mut response);
        assert!(!is_network_error(&response));
    }

    #[test]
    fn marker_header_survives_without_extension() {
        let mut response = Response::new(Body::empty());
        response
            .headers_mut()
            .insert(ORIGIN_HEADER, HeaderValue::from_static("network-error"));
        assert!(is_network_error(&response));
    }
}
