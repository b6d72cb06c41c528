//! Sliding-window counter: approximates a true sliding window with two
//! bucketed counters and a linear blend.
//!
//! For window size `W`, requests are counted into fixed buckets aligned on
//! multiples of `W`. The estimate for the last `W` nanoseconds is
//! `floor(current + previous * (1 - progress))` where `progress` is how far
//! the current timestamp sits into its bucket. O(1) space per key, at the
//! cost of assuming the previous window's requests were evenly spread.
//!
//! State lives under two sub-keys, `<base>:current` and `<base>:previous`,
//! each a hash `{count, window_start}`. The `window_start` field is what
//! actually identifies a record's role: after a window rolls, the record
//! still sitting in `:current` is recognized as the previous window by its
//! start time. The allow path also writes the rolled-over count back to
//! `:previous`, so a late-arriving call can recover it after `:current` has
//! been replaced.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::config::{SlidingWindowCounterConfig, StrategyConfig};
use crate::error::{Error, Result};
use crate::limiter::{
    DEFAULT_TTL_BUFFER_SECONDS, MINIMUM_TTL_SECONDS, MetadataValue, NANOS_PER_SECOND,
    RateLimitResponse, RateLimiter, StrategyConstructor, system_time_from_nanos, unix_nanos,
};
use crate::params::{ConfigMap, get_duration, get_i64, get_str};
use crate::store::{ScriptArg, ScriptStore};

use super::{SLIDING_WINDOW_COUNTER, check_arity, reply_i64};

use async_trait::async_trait;

const SCRIPT: &str = r#"
local key = KEYS[1]
local current_window_start = tonumber(ARGV[1])
local previous_window_start = tonumber(ARGV[2])
local bucket_size = tonumber(ARGV[3])
local window_size_nanos = tonumber(ARGV[4])
local ttl_seconds = tonumber(ARGV[5])
local window_progress = tonumber(ARGV[6])

local current_window_key = key .. ':current'
local previous_window_key = key .. ':previous'

local current_count = 0
local previous_count = 0

local current_data = redis.call('HMGET', current_window_key, 'count', 'window_start')
if current_data[1] and current_data[2] then
    local stored_window_start = tonumber(current_data[2])
    if stored_window_start == current_window_start then
        current_count = tonumber(current_data[1])
    elseif stored_window_start == previous_window_start then
        previous_count = tonumber(current_data[1])
    end
end

if previous_count == 0 then
    local previous_data = redis.call('HMGET', previous_window_key, 'count', 'window_start')
    if previous_data[1] and previous_data[2] and tonumber(previous_data[2]) == previous_window_start then
        previous_count = tonumber(previous_data[1])
    end
end

local weighted_count = math.floor(current_count + previous_count * (1 - window_progress))

if weighted_count >= bucket_size then
    local reset_time_nanos = current_window_start + window_size_nanos
    return {0, weighted_count, reset_time_nanos, current_count, previous_count}
end

local new_current_count = current_count + 1
redis.call('HSET', current_window_key, 'count', new_current_count, 'window_start', current_window_start)
redis.call('EXPIRE', current_window_key, ttl_seconds)

redis.call('HSET', previous_window_key, 'count', previous_count, 'window_start', previous_window_start)
redis.call('EXPIRE', previous_window_key, ttl_seconds)

local remaining = math.max(0, bucket_size - weighted_count - 1)
return {1, weighted_count + 1, 0, new_current_count, previous_count, remaining}
"#;

/// Sliding-window counter engine.
pub struct SlidingWindowCounterLimiter {
    window_size_nanos: i64,
    bucket_size: i64,
    key_prefix: String,
    ttl_buffer_seconds: i64,
    store: Arc<dyn ScriptStore>,
}

impl SlidingWindowCounterLimiter {
    pub fn new(config: SlidingWindowCounterConfig, store: Arc<dyn ScriptStore>) -> Result<Self> {
        if config.window_size_seconds == 0 || config.bucket_size <= 0 {
            return Err(Error::invalid_config(
                "sliding window counter: window_size and bucket_size must be positive",
            ));
        }

        let ttl_buffer_seconds = if config.ttl_buffer_seconds <= 0 {
            DEFAULT_TTL_BUFFER_SECONDS
        } else {
            config.ttl_buffer_seconds
        };

        Ok(Self {
            window_size_nanos: config.window_size_seconds as i64 * NANOS_PER_SECOND,
            bucket_size: config.bucket_size,
            key_prefix: config.key_prefix,
            ttl_buffer_seconds,
            store,
        })
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}:{}", self.key_prefix, key)
    }

    /// Project when the blend drops below `bucket_size` again.
    ///
    /// Solves `current + (1 - p) * previous = bucket_size` for the window
    /// progress `p`. With an empty previous window (or a solution past the
    /// window's end) the blend cannot shrink before the window rolls, so the
    /// wait runs to the end of the current window. Advisory only: other
    /// callers may take the slot first.
    fn retry_after_nanos(
        &self,
        current_count: i64,
        previous_count: i64,
        current_window_start: i64,
        now_nanos: i64,
    ) -> i64 {
        let window_end = current_window_start + self.window_size_nanos;
        if previous_count == 0 {
            return (window_end - now_nanos).max(0);
        }

        let required_progress =
            1.0 - (self.bucket_size - current_count) as f64 / previous_count as f64;
        if required_progress >= 1.0 {
            return (window_end - now_nanos).max(0);
        }

        let admissible_at =
            current_window_start + (required_progress * self.window_size_nanos as f64) as i64;
        (admissible_at - now_nanos).max(0)
    }
}

#[async_trait]
impl RateLimiter for SlidingWindowCounterLimiter {
    async fn is_allowed(&self, key: &str, timestamp: SystemTime) -> Result<RateLimitResponse> {
        let storage_key = self.storage_key(key);
        let now_nanos = unix_nanos(timestamp);

        let current_window_start =
            now_nanos.div_euclid(self.window_size_nanos) * self.window_size_nanos;
        let previous_window_start = current_window_start - self.window_size_nanos;

        let time_into_window = now_nanos - current_window_start;
        let window_progress =
            (time_into_window as f64 / self.window_size_nanos as f64).clamp(0.0, 1.0);

        let ttl_seconds = ((self.window_size_nanos / NANOS_PER_SECOND) * 2
            + self.ttl_buffer_seconds)
            .max(MINIMUM_TTL_SECONDS);

        let reply = self
            .store
            .eval(
                SCRIPT,
                &[&storage_key],
                &[
                    ScriptArg::Int(current_window_start),
                    ScriptArg::Int(previous_window_start),
                    ScriptArg::Int(self.bucket_size),
                    ScriptArg::Int(self.window_size_nanos),
                    ScriptArg::Int(ttl_seconds),
                    ScriptArg::Float(window_progress),
                ],
            )
            .await
            .map_err(|e| Error::store(SLIDING_WINDOW_COUNTER, e))?;

        check_arity(SLIDING_WINDOW_COUNTER, &reply, 5)?;
        let allowed = reply_i64(SLIDING_WINDOW_COUNTER, &reply, 0, "allowed flag")?;
        let weighted_count = reply_i64(SLIDING_WINDOW_COUNTER, &reply, 1, "weighted count")?;
        let reset_time_nanos = reply_i64(SLIDING_WINDOW_COUNTER, &reply, 2, "reset time")?;
        let current_count = reply_i64(SLIDING_WINDOW_COUNTER, &reply, 3, "current count")?;
        let previous_count = reply_i64(SLIDING_WINDOW_COUNTER, &reply, 4, "previous count")?;

        let mut metadata = HashMap::new();
        metadata.insert(
            "weighted_count".to_string(),
            MetadataValue::Int(weighted_count),
        );
        metadata.insert(
            "current_count".to_string(),
            MetadataValue::Int(current_count),
        );
        metadata.insert(
            "previous_count".to_string(),
            MetadataValue::Int(previous_count),
        );
        metadata.insert(
            "window_progress".to_string(),
            MetadataValue::Float(window_progress),
        );
        metadata.insert(
            "window_size".to_string(),
            MetadataValue::Int(self.window_size_nanos / NANOS_PER_SECOND),
        );

        let reset_time = if reset_time_nanos > 0 {
            system_time_from_nanos(reset_time_nanos)
        } else {
            system_time_from_nanos(current_window_start + self.window_size_nanos)
        };

        if allowed == 1 {
            let remaining = if reply.len() > 5 {
                reply_i64(SLIDING_WINDOW_COUNTER, &reply, 5, "remaining")?
            } else {
                0
            };

            return Ok(RateLimitResponse {
                allowed: true,
                limit: self.bucket_size,
                remaining,
                reset_time,
                retry_after: None,
                metadata,
            });
        }

        let retry_nanos = self.retry_after_nanos(
            current_count,
            previous_count,
            current_window_start,
            now_nanos,
        );

        Ok(RateLimitResponse {
            allowed: false,
            limit: self.bucket_size,
            remaining: 0,
            reset_time,
            retry_after: Some(Duration::from_nanos(retry_nanos as u64)),
            metadata,
        })
    }

    async fn reset(&self, key: &str) -> Result<()> {
        let storage_key = self.storage_key(key);
        let current_window_key = format!("{storage_key}:current");
        let previous_window_key = format!("{storage_key}:previous");
        self.store
            .del(&[&current_window_key, &previous_window_key])
            .await
            .map_err(|e| Error::store(SLIDING_WINDOW_COUNTER, e))?;
        Ok(())
    }
}

/// Registry constructor for [`SlidingWindowCounterLimiter`].
pub struct SlidingWindowCounterConstructor;

impl StrategyConstructor for SlidingWindowCounterConstructor {
    fn name(&self) -> &'static str {
        SLIDING_WINDOW_COUNTER
    }

    fn new_from_config(
        &self,
        config: &ConfigMap,
        store: Arc<dyn ScriptStore>,
    ) -> Result<Box<dyn RateLimiter>> {
        let window_size = get_duration(config, "window_size")?;
        let config = SlidingWindowCounterConfig {
            window_size_seconds: window_size.as_secs(),
            bucket_size: get_i64(config, "bucket_size")?,
            key_prefix: get_str(config, "key_prefix")?,
            ttl_buffer_seconds: get_i64(config, "ttl_buffer_seconds")?,
        };
        Ok(Box::new(SlidingWindowCounterLimiter::new(config, store)?))
    }

    fn convert_config(&self, config: &StrategyConfig) -> Result<ConfigMap> {
        let StrategyConfig::SlidingWindowCounter(cfg) = config else {
            return Err(Error::invalid_config(
                "sliding window counter: expected sliding window counter configuration",
            ));
        };

        let mut map = ConfigMap::new();
        map.insert("key_prefix".to_string(), cfg.key_prefix.clone().into());
        map.insert(
            "ttl_buffer_seconds".to_string(),
            cfg.ttl_buffer_seconds.into(),
        );
        map.insert(
            "window_size".to_string(),
            Duration::from_secs(cfg.window_size_seconds).into(),
        );
        map.insert("bucket_size".to_string(), cfg.bucket_size.into());
        Ok(map)
    }
}
