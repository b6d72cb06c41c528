//! Metrics collection interface and the instrumentation wrapper
//!
//! Recording stays in a wrapper around the engine instead of inside the
//! engines, so a no-op collector lets tests run with zero metrics overhead
//! and the engines stay pure.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;

use crate::error::Result;
use crate::limiter::{RateLimitResponse, RateLimiter};

/// Receives admission decisions and latencies. Implementations must be safe
/// to call from any number of tasks at once.
pub trait Collector: Send + Sync {
    /// Record one allow/deny decision for `strategy`.
    fn record_decision(&self, strategy: &str, allowed: bool);

    /// Record how long one admission check took for `strategy`.
    fn record_duration(&self, strategy: &str, duration: Duration);
}

/// A collector that discards everything, for tests and metrics-disabled
/// deployments.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCollector;

impl Collector for NoopCollector {
    fn record_decision(&self, _strategy: &str, _allowed: bool) {}

    fn record_duration(&self, _strategy: &str, _duration: Duration) {}
}

/// Wraps any engine, timing admission calls and recording decisions through
/// a [`Collector`].
///
/// Duration is recorded unconditionally; the decision only when the inner
/// call succeeded. Errors pass through untouched, and `reset` is not
/// instrumented.
pub struct MeteredLimiter {
    inner: Box<dyn RateLimiter>,
    collector: Arc<dyn Collector>,
    strategy: String,
}

impl MeteredLimiter {
    pub fn new(
        inner: Box<dyn RateLimiter>,
        collector: Arc<dyn Collector>,
        strategy: impl Into<String>,
    ) -> Self {
        Self {
            inner,
            collector,
            strategy: strategy.into(),
        }
    }
}

#[async_trait]
impl RateLimiter for MeteredLimiter {
    async fn is_allowed(&self, key: &str, timestamp: SystemTime) -> Result<RateLimitResponse> {
        let start = Instant::now();
        let result = self.inner.is_allowed(key, timestamp).await;
        self.collector
            .record_duration(&self.strategy, start.elapsed());

        if let Ok(response) = &result {
            self.collector
                .record_decision(&self.strategy, response.allowed);
        }

        result
    }

    async fn reset(&self, key: &str) -> Result<()> {
        self.inner.reset(key).await
    }
}
