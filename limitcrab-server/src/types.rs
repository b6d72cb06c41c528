//! HTTP wire types
//!
//! The JSON shapes returned by the rate-limit endpoints. Durations cross the
//! wire as whole seconds, matching the `RateLimit-*` and `Retry-After`
//! headers set alongside them.

use std::collections::HashMap;
use std::time::SystemTime;

use limitcrab::{MetadataValue, RateLimitResponse};
use serde::{Deserialize, Serialize};

/// Body of a rate-limit decision.
///
/// # Example
///
/// ```json
/// {
///   "allowed": false,
///   "limit": 10,
///   "remaining": 0,
///   "reset_after": 60,
///   "retry_after": 30,
///   "metadata": {"current_count": 10, "window_size": 60}
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitDecision {
    /// Whether the request is allowed
    pub allowed: bool,
    /// The configured bucket size
    pub limit: i64,
    /// Budget left after this call
    pub remaining: i64,
    /// Seconds until the key returns to full capacity
    pub reset_after: i64,
    /// Seconds to wait before retrying (0 when allowed)
    pub retry_after: i64,
    /// Algorithm-specific diagnostics
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, MetadataValue>,
}

impl RateLimitDecision {
    pub fn from_response(response: &RateLimitResponse, now: SystemTime) -> Self {
        let reset_after = response
            .reset_time
            .duration_since(now)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        let retry_after = response
            .retry_after
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        Self {
            allowed: response.allowed,
            limit: response.limit,
            remaining: response.remaining,
            reset_after,
            retry_after,
            metadata: response.metadata.clone(),
        }
    }
}

/// Body of a successful reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetResponse {
    pub message: String,
    pub client_id: String,
}

/// Error response format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short error category
    pub error: String,
    /// The engine's error text
    pub message: String,
}
