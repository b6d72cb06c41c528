//! Typed strategy configuration
//!
//! These structs mirror the shape embedders load from files or flags: a
//! `strategy` name selecting the active algorithm and one typed sub-config
//! per known strategy. Constructors turn them into the loosely-typed map the
//! factory consumes via
//! [`StrategyConstructor::convert_config`](crate::limiter::StrategyConstructor::convert_config).

use serde::Deserialize;

use crate::strategy;

/// Token bucket settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TokenBucketConfig {
    pub key_prefix: String,
    pub ttl_buffer_seconds: i64,
    pub bucket_size: i64,
    pub refill_rate_per_second: i64,
}

impl Default for TokenBucketConfig {
    fn default() -> Self {
        Self {
            key_prefix: "rl:tb".to_string(),
            ttl_buffer_seconds: 5,
            bucket_size: 100,
            refill_rate_per_second: 10,
        }
    }
}

/// Sliding-window log settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SlidingWindowLogConfig {
    pub key_prefix: String,
    pub ttl_buffer_seconds: i64,
    pub window_size_seconds: u64,
    pub bucket_size: i64,
}

impl Default for SlidingWindowLogConfig {
    fn default() -> Self {
        Self {
            key_prefix: "rl:swl".to_string(),
            ttl_buffer_seconds: 30,
            window_size_seconds: 3600,
            bucket_size: 1000,
        }
    }
}

/// Sliding-window counter settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SlidingWindowCounterConfig {
    pub key_prefix: String,
    pub ttl_buffer_seconds: i64,
    pub window_size_seconds: u64,
    pub bucket_size: i64,
}

impl Default for SlidingWindowCounterConfig {
    fn default() -> Self {
        Self {
            key_prefix: "rl:swc".to_string(),
            ttl_buffer_seconds: 15,
            window_size_seconds: 3600,
            bucket_size: 1000,
        }
    }
}

/// One typed sub-config per known strategy.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StrategiesConfig {
    pub token_bucket: TokenBucketConfig,
    pub sliding_window_log: SlidingWindowLogConfig,
    pub sliding_window_counter: SlidingWindowCounterConfig,
}

/// Top-level rate limiter configuration: the active strategy name and the
/// per-strategy settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimiterConfig {
    pub strategy: String,
    #[serde(default)]
    pub strategies: StrategiesConfig,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            strategy: strategy::SLIDING_WINDOW_COUNTER.to_string(),
            strategies: StrategiesConfig::default(),
        }
    }
}

/// The sum of the typed configs, as handed to a constructor's
/// `convert_config`. Each constructor accepts exactly one variant.
#[derive(Debug, Clone)]
pub enum StrategyConfig {
    TokenBucket(TokenBucketConfig),
    SlidingWindowLog(SlidingWindowLogConfig),
    SlidingWindowCounter(SlidingWindowCounterConfig),
}
