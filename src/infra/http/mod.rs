//! Dispatch table: every request reaching the listener is handed to the
//! registered `RequestHandler`.

mod middleware;

use std::sync::Arc;

use axum::{
    Router,
    extract::{Request, State},
    middleware as axum_middleware,
    response::Response,
};

use crate::application::interceptor::RequestHandler;

pub use middleware::log_responses;

/// Register `handler` as the router fallback so it sees every method and path.
pub fn build_router(handler: Arc<dyn RequestHandler>) -> Router {
    Router::new()
        .fallback(dispatch)
        .layer(axum_middleware::from_fn(log_responses))
        .with_state(handler)
}

async fn dispatch(
    State(handler): State<Arc<dyn RequestHandler>>,
    request: Request,
) -> Response {
    handler.handle(request).await
}
