//! Rate-limit middleware for wrapped routes
//!
//! Applies the same key extraction, headers and status mapping as the
//! `/rate-limit` endpoint, but as a layer: allowed requests continue to the
//! inner handler with `RateLimit-*` headers appended, denied requests are
//! answered 429 on the spot.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

use crate::http::{AppState, client_key, engine_error_response, rate_limit_headers, with_deadline};
use crate::types::RateLimitDecision;

pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let key = client_key(request.headers(), addr);

    let response = match with_deadline(state.limiter.is_allowed(&key, SystemTime::now())).await {
        Ok(response) => response,
        Err(message) => return engine_error_response(&state, message),
    };

    let decision = RateLimitDecision::from_response(&response, SystemTime::now());
    let headers = rate_limit_headers(&decision);

    if !decision.allowed {
        let mut denied = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "message": "Too many requests" })),
        )
            .into_response();
        denied.headers_mut().extend(headers);
        return denied;
    }

    let mut response = next.run(request).await;
    response.headers_mut().extend(headers);
    response
}
