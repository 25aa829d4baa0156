mod health;
mod transfer;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::Router;

use crate::middleware::rate_limit::{rate_limit_middleware, RateLimitConfig, RateLimiter};
use crate::response::json_error;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let limiter = Arc::new(RateLimiter::new(RateLimitConfig::from_env()));

    Router::new()
        .nest("/health", health::router())
        .nest("/api/health", health::router())
        .nest("/api/transfer", transfer::router())
        .layer(middleware::from_fn_with_state(limiter, rate_limit_middleware))
        .fallback(fallback_handler)
        .with_state(state)
}

async fn fallback_handler() -> Response {
    json_error(StatusCode::NOT_FOUND, "NOT_FOUND", "Route not found").into_response()
}
