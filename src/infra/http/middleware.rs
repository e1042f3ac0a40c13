use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};
use tracing::{info, warn};

use crate::domain::ResponseOrigin;

/// Log one line per response, tagged with where the response came from.
pub async fn log_responses(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = start.elapsed().as_millis();

    match ResponseOrigin::of(&response) {
        Some(ResponseOrigin::NetworkError) => warn!(
            target: "wombat::http::response",
            status = status.as_u16(),
            method = %method,
            path = %uri.path(),
            query = uri.query().unwrap_or(""),
            elapsed_ms = elapsed_ms,
            "offline with nothing cached",
        ),
        origin => info!(
            target: "wombat::http::response",
            status = status.as_u16(),
            method = %method,
            path = %uri.path(),
            query = uri.query().unwrap_or(""),
            elapsed_ms = elapsed_ms,
            origin = origin.map(ResponseOrigin::as_str).unwrap_or("unknown"),
            "request served",
        ),
    }

    response
}
