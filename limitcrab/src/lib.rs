//! # Limitcrab
//!
//! Redis-backed distributed rate limiting.
//!
//! Limitcrab keeps per-key counters in Redis so that any number of stateless
//! replicas share one consistent view of each client's budget. Every
//! admission decision is a single atomic Lua script evaluation: the store is
//! the serialization point, and no in-process cache or per-key lock exists.
//!
//! Three interchangeable algorithms implement the same [`RateLimiter`]
//! contract:
//!
//! - [`TokenBucketLimiter`]: continuous refill with fractional accumulation
//! - [`SlidingWindowLogLimiter`]: exact, one sorted-set entry per admission
//! - [`SlidingWindowCounterLimiter`]: two bucketed counters with a linear
//!   blend, approximating the sliding window in O(1) space
//!
//! The [`Factory`] holds a name-keyed registry of strategy constructors and
//! wraps engines with metrics instrumentation when a [`Collector`] is
//! installed; the [`StrategyManager`] selects and builds the engine named by
//! a [`RateLimiterConfig`].
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::SystemTime;
//!
//! use limitcrab::{RateLimiterConfig, RedisScriptStore, StrategyManager};
//!
//! # async fn run() -> limitcrab::Result<()> {
//! let store = RedisScriptStore::connect("redis://127.0.0.1:6379")
//!     .await
//!     .expect("redis");
//! let manager = StrategyManager::new(RateLimiterConfig::default(), Arc::new(store));
//! let limiter = manager.current()?;
//!
//! let response = limiter.is_allowed("user:123", SystemTime::now()).await?;
//! if !response.allowed {
//!     println!("denied, retry after {:?}", response.retry_after);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod factory;
pub mod limiter;
pub mod manager;
pub mod metrics;
pub mod params;
pub mod store;
pub mod strategy;

pub use config::{
    RateLimiterConfig, SlidingWindowCounterConfig, SlidingWindowLogConfig, StrategiesConfig,
    StrategyConfig, TokenBucketConfig,
};
pub use error::{Error, Result};
pub use factory::Factory;
pub use limiter::{
    DEFAULT_TTL_BUFFER_SECONDS, MINIMUM_TTL_SECONDS, MetadataValue, NANOS_PER_SECOND,
    RateLimitResponse, RateLimiter, StrategyConstructor, system_time_from_nanos, unix_nanos,
};
pub use manager::StrategyManager;
pub use metrics::{Collector, MeteredLimiter, NoopCollector};
pub use store::{RedisScriptStore, ScriptArg, ScriptStore, ScriptValue, StoreError};
pub use strategy::sliding_window_counter::SlidingWindowCounterLimiter;
pub use strategy::sliding_window_log::SlidingWindowLogLimiter;
pub use strategy::token_bucket::TokenBucketLimiter;
