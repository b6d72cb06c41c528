//! Sliding-window log: every admitted request's timestamp goes into a
//! sorted set, and at most `bucket_size` timestamps may fall within the last
//! `window_size`. Exact, at the cost of one set member per admission.
//!
//! Members are `<timestamp_nanos>:<random>`. The random suffix keeps
//! same-nanosecond admissions from collapsing onto a single member, and it is
//! generated engine-side: the store seeds script-local `math.random`
//! deterministically, which would defeat the whole point.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::{SlidingWindowLogConfig, StrategyConfig};
use crate::error::{Error, Result};
use crate::limiter::{
    DEFAULT_TTL_BUFFER_SECONDS, MetadataValue, NANOS_PER_SECOND, RateLimitResponse, RateLimiter,
    StrategyConstructor, unix_nanos,
};
use crate::params::{ConfigMap, get_duration, get_i64, get_str};
use crate::store::{ScriptArg, ScriptStore};

use super::{SLIDING_WINDOW_LOG, check_arity, reply_i64};

use async_trait::async_trait;

const SCRIPT: &str = r#"
local key = KEYS[1]
local window_start_nanos = tonumber(ARGV[1])
local current_timestamp_nanos = tonumber(ARGV[2])
local bucket_size = tonumber(ARGV[3])
local window_size_seconds = tonumber(ARGV[4])
local ttl_buffer_seconds = tonumber(ARGV[5])
local member_suffix = ARGV[6]

redis.call('ZREMRANGEBYSCORE', key, '-inf', window_start_nanos)

local current_count = redis.call('ZCARD', key)

if current_count >= bucket_size then
    local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
    local reset_time_seconds = 0
    if #oldest > 0 then
        local oldest_timestamp_nanos = tonumber(oldest[2])
        reset_time_seconds = (oldest_timestamp_nanos + (window_size_seconds * 1000000000)) / 1000000000
    end
    return {0, current_count, reset_time_seconds}
end

local member = current_timestamp_nanos .. ':' .. member_suffix
redis.call('ZADD', key, current_timestamp_nanos, member)

local ttl_seconds = math.max(60, window_size_seconds + ttl_buffer_seconds)
redis.call('EXPIRE', key, ttl_seconds)

return {1, current_count + 1, 0, bucket_size - current_count - 1}
"#;

/// Sliding-window log engine.
pub struct SlidingWindowLogLimiter {
    window_size_seconds: i64,
    bucket_size: i64,
    key_prefix: String,
    ttl_buffer_seconds: i64,
    store: Arc<dyn ScriptStore>,
}

impl SlidingWindowLogLimiter {
    pub fn new(config: SlidingWindowLogConfig, store: Arc<dyn ScriptStore>) -> Result<Self> {
        if config.window_size_seconds == 0 || config.bucket_size <= 0 {
            return Err(Error::invalid_config(
                "sliding window log: window_size and bucket_size must be positive",
            ));
        }

        let ttl_buffer_seconds = if config.ttl_buffer_seconds <= 0 {
            DEFAULT_TTL_BUFFER_SECONDS
        } else {
            config.ttl_buffer_seconds
        };

        Ok(Self {
            window_size_seconds: config.window_size_seconds as i64,
            bucket_size: config.bucket_size,
            key_prefix: config.key_prefix,
            ttl_buffer_seconds,
            store,
        })
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}:{}", self.key_prefix, key)
    }
}

#[async_trait]
impl RateLimiter for SlidingWindowLogLimiter {
    async fn is_allowed(&self, key: &str, timestamp: SystemTime) -> Result<RateLimitResponse> {
        let storage_key = self.storage_key(key);
        let now_nanos = unix_nanos(timestamp);
        let window_start_nanos = now_nanos - self.window_size_seconds * NANOS_PER_SECOND;

        let reply = self
            .store
            .eval(
                SCRIPT,
                &[&storage_key],
                &[
                    ScriptArg::Int(window_start_nanos),
                    ScriptArg::Int(now_nanos),
                    ScriptArg::Int(self.bucket_size),
                    ScriptArg::Int(self.window_size_seconds),
                    ScriptArg::Int(self.ttl_buffer_seconds),
                    ScriptArg::Int(rand::random::<i64>()),
                ],
            )
            .await
            .map_err(|e| Error::store(SLIDING_WINDOW_LOG, e))?;

        check_arity(SLIDING_WINDOW_LOG, &reply, 3)?;
        let allowed = reply_i64(SLIDING_WINDOW_LOG, &reply, 0, "allowed flag")?;
        let current_count = reply_i64(SLIDING_WINDOW_LOG, &reply, 1, "current count")?;
        let reset_time_seconds = reply_i64(SLIDING_WINDOW_LOG, &reply, 2, "reset time")?;

        let mut metadata = HashMap::new();
        metadata.insert(
            "current_count".to_string(),
            MetadataValue::Int(current_count),
        );
        metadata.insert(
            "window_size".to_string(),
            MetadataValue::Int(self.window_size_seconds),
        );

        // A denied call reports when the oldest logged request ages out; an
        // allowed call resets once the full window has passed.
        let reset_time = if reset_time_seconds > 0 {
            UNIX_EPOCH + Duration::from_secs(reset_time_seconds as u64)
        } else {
            timestamp + Duration::from_secs(self.window_size_seconds as u64)
        };

        if allowed == 1 {
            let remaining = if reply.len() > 3 {
                reply_i64(SLIDING_WINDOW_LOG, &reply, 3, "remaining")?
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

        let retry_after = reset_time
            .duration_since(timestamp)
            .unwrap_or(Duration::ZERO);

        Ok(RateLimitResponse {
            allowed: false,
            limit: self.bucket_size,
            remaining: 0,
            reset_time,
            retry_after: Some(retry_after),
            metadata,
        })
    }

    async fn reset(&self, key: &str) -> Result<()> {
        let storage_key = self.storage_key(key);
        self.store
            .del(&[&storage_key])
            .await
            .map_err(|e| Error::store(SLIDING_WINDOW_LOG, e))?;
        Ok(())
    }
}

/// Registry constructor for [`SlidingWindowLogLimiter`].
pub struct SlidingWindowLogConstructor;

impl StrategyConstructor for SlidingWindowLogConstructor {
    fn name(&self) -> &'static str {
        SLIDING_WINDOW_LOG
    }

    fn new_from_config(
        &self,
        config: &ConfigMap,
        store: Arc<dyn ScriptStore>,
    ) -> Result<Box<dyn RateLimiter>> {
        let window_size = get_duration(config, "window_size")?;
        let config = SlidingWindowLogConfig {
            window_size_seconds: window_size.as_secs(),
            bucket_size: get_i64(config, "bucket_size")?,
            key_prefix: get_str(config, "key_prefix")?,
            ttl_buffer_seconds: get_i64(config, "ttl_buffer_seconds")?,
        };
        Ok(Box::new(SlidingWindowLogLimiter::new(config, store)?))
    }

    fn convert_config(&self, config: &StrategyConfig) -> Result<ConfigMap> {
        let StrategyConfig::SlidingWindowLog(cfg) = config else {
            return Err(Error::invalid_config(
                "sliding window log: expected sliding window log configuration",
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
