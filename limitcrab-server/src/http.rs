//! HTTP front-end
//!
//! # API Endpoints
//!
//! ## POST /rate-limit
//!
//! Check the caller's budget. The client key comes from the `X-Client-ID`
//! header, falling back to the peer address. Responds 200 on allow and 429
//! on deny, with `RateLimit-Limit`, `RateLimit-Remaining`, `RateLimit-Reset`
//! and (on deny) `Retry-After` headers, and a [`RateLimitDecision`] body.
//!
//! ## POST /rate-limit/reset
//!
//! Clear the caller's counters.
//!
//! ## GET /health
//!
//! Liveness probe. Returns "OK" with 200 status.
//!
//! ## GET /metrics
//!
//! Prometheus text format.
//!
//! ## GET /demo/unlimited, GET /demo/limited
//!
//! Demo resources; the latter sits behind the rate-limit middleware.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use axum::Router;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use limitcrab::{RateLimitResponse, RateLimiter};
use serde_json::json;

use crate::metrics::ServerMetrics;
use crate::middleware;
use crate::types::{ErrorResponse, RateLimitDecision, ResetResponse};

/// Deadline applied to every store-backed operation.
pub(crate) const STORE_DEADLINE: Duration = Duration::from_secs(5);

pub struct AppState {
    pub limiter: Arc<dyn RateLimiter>,
    pub metrics: Arc<ServerMetrics>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/rate-limit", post(check_rate_limit))
        .route("/rate-limit/reset", post(reset_rate_limit))
        .route(
            "/demo/limited",
            get(limited_resource).layer(axum::middleware::from_fn_with_state(
                state.clone(),
                middleware::rate_limit,
            )),
        )
        .route("/demo/unlimited", get(unlimited_resource))
        .route("/health", get(|| async { "OK" }))
        .route("/metrics", get(export_metrics))
        .with_state(state)
}

/// The client key: `X-Client-ID` header if present, peer address otherwise.
pub(crate) fn client_key(headers: &HeaderMap, addr: SocketAddr) -> String {
    headers
        .get("x-client-id")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| addr.ip().to_string())
}

/// Run a store-backed operation under the request deadline, flattening
/// engine errors and expiry into a message for the error response.
pub(crate) async fn with_deadline<T, F>(future: F) -> Result<T, String>
where
    F: Future<Output = limitcrab::Result<T>>,
{
    match tokio::time::timeout(STORE_DEADLINE, future).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err("store deadline exceeded".to_string()),
    }
}

pub(crate) fn rate_limit_headers(decision: &RateLimitDecision) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static("ratelimit-limit"),
        HeaderValue::from(decision.limit),
    );
    headers.insert(
        HeaderName::from_static("ratelimit-remaining"),
        HeaderValue::from(decision.remaining),
    );
    headers.insert(
        HeaderName::from_static("ratelimit-reset"),
        HeaderValue::from(decision.reset_after),
    );
    if !decision.allowed {
        headers.insert(header::RETRY_AFTER, HeaderValue::from(decision.retry_after));
    }
    headers
}

pub(crate) fn decision_response(response: &RateLimitResponse) -> Response {
    let decision = RateLimitDecision::from_response(response, SystemTime::now());
    let headers = rate_limit_headers(&decision);
    let status = if decision.allowed {
        StatusCode::OK
    } else {
        StatusCode::TOO_MANY_REQUESTS
    };
    (status, headers, Json(decision)).into_response()
}

pub(crate) fn engine_error_response(state: &AppState, message: String) -> Response {
    state.metrics.record_error();
    tracing::error!("rate limiter error: {message}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "rate limiter error".to_string(),
            message,
        }),
    )
        .into_response()
}

async fn check_rate_limit(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    state.metrics.record_http_request();
    let key = client_key(&headers, addr);

    match with_deadline(state.limiter.is_allowed(&key, SystemTime::now())).await {
        Ok(response) => decision_response(&response),
        Err(message) => engine_error_response(&state, message),
    }
}

async fn reset_rate_limit(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    state.metrics.record_http_request();
    let key = client_key(&headers, addr);

    match with_deadline(state.limiter.reset(&key)).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ResetResponse {
                message: "rate limit reset".to_string(),
                client_id: key,
            }),
        )
            .into_response(),
        Err(message) => engine_error_response(&state, message),
    }
}

async fn export_metrics(State(state): State<Arc<AppState>>) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.export_prometheus(),
    )
        .into_response()
}

async fn unlimited_resource(State(state): State<Arc<AppState>>) -> Response {
    state.metrics.record_http_request();
    Json(json!({
        "message": "Access granted to unlimited resource",
        "resource_id": "unlimited-001",
        "content": "This resource has no rate limiting applied",
    }))
    .into_response()
}

async fn limited_resource(State(state): State<Arc<AppState>>) -> Response {
    state.metrics.record_http_request();
    Json(json!({
        "message": "Access granted to limited resource",
        "resource_id": "limited-001",
        "content": "This resource is protected by the rate limiter",
    }))
    .into_response()
}
