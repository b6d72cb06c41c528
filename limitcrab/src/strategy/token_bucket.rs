//! Token bucket: a budget of `bucket_size` tokens refilled continuously at
//! `refill_rate_per_second`, with fractional accumulation.
//!
//! Stored state per key is a hash `{tokens, last_refill_time_nanos}`. A key
//! that does not exist yet is treated as a full bucket, so the first
//! admission for a client always succeeds (given `bucket_size >= 1`).
//!
//! The script returns the token count as a decimal string: the store's
//! scripting layer truncates Lua floats to integers on the way out, and the
//! fractional part is exactly what the retry arithmetic needs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::config::{StrategyConfig, TokenBucketConfig};
use crate::error::{Error, Result};
use crate::limiter::{
    DEFAULT_TTL_BUFFER_SECONDS, MetadataValue, RateLimitResponse, RateLimiter,
    StrategyConstructor, system_time_from_nanos, unix_nanos,
};
use crate::params::{ConfigMap, get_i64, get_str};
use crate::store::{ScriptArg, ScriptStore};

use super::{TOKEN_BUCKET, check_arity, reply_f64, reply_i64};

use async_trait::async_trait;

const SCRIPT: &str = r#"
local key = KEYS[1]
local bucket_size = tonumber(ARGV[1])
local refill_rate = tonumber(ARGV[2])
local current_time_nanos = tonumber(ARGV[3])
local ttl_buffer_seconds = tonumber(ARGV[4])

local bucket = redis.call('HMGET', key, 'tokens', 'last_refill_time_nanos')
local tokens = bucket_size
local last_refill_time_nanos = current_time_nanos

if bucket[1] then
    tokens = tonumber(bucket[1])
end
if bucket[2] then
    last_refill_time_nanos = tonumber(bucket[2])
end

local elapsed_seconds = (current_time_nanos - last_refill_time_nanos) / 1000000000
tokens = math.min(bucket_size, tokens + elapsed_seconds * refill_rate)

local ttl_seconds = math.max(60, math.ceil(bucket_size / refill_rate + ttl_buffer_seconds))

if tokens < 1 then
    local next_token_time_nanos = current_time_nanos + ((1 - tokens) / refill_rate) * 1000000000
    redis.call('HSET', key, 'tokens', tokens, 'last_refill_time_nanos', current_time_nanos)
    redis.call('EXPIRE', key, ttl_seconds)
    return {0, tostring(tokens), next_token_time_nanos}
end

local remaining = tokens - 1
redis.call('HSET', key, 'tokens', remaining, 'last_refill_time_nanos', current_time_nanos)
redis.call('EXPIRE', key, ttl_seconds)

local full_time_nanos = current_time_nanos + ((bucket_size - remaining) / refill_rate) * 1000000000
return {1, tostring(remaining), full_time_nanos}
"#;

/// Token bucket engine.
pub struct TokenBucketLimiter {
    bucket_size: i64,
    refill_rate_per_second: i64,
    key_prefix: String,
    ttl_buffer_seconds: i64,
    store: Arc<dyn ScriptStore>,
}

impl TokenBucketLimiter {
    pub fn new(config: TokenBucketConfig, store: Arc<dyn ScriptStore>) -> Result<Self> {
        if config.bucket_size <= 0 || config.refill_rate_per_second <= 0 {
            return Err(Error::invalid_config(
                "token bucket: bucket_size and refill_rate_per_second must be positive",
            ));
        }

        let ttl_buffer_seconds = if config.ttl_buffer_seconds <= 0 {
            DEFAULT_TTL_BUFFER_SECONDS
        } else {
            config.ttl_buffer_seconds
        };

        Ok(Self {
            bucket_size: config.bucket_size,
            refill_rate_per_second: config.refill_rate_per_second,
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
impl RateLimiter for TokenBucketLimiter {
    async fn is_allowed(&self, key: &str, timestamp: SystemTime) -> Result<RateLimitResponse> {
        let storage_key = self.storage_key(key);
        let now_nanos = unix_nanos(timestamp);

        let reply = self
            .store
            .eval(
                SCRIPT,
                &[&storage_key],
                &[
                    ScriptArg::Int(self.bucket_size),
                    ScriptArg::Int(self.refill_rate_per_second),
                    ScriptArg::Int(now_nanos),
                    ScriptArg::Int(self.ttl_buffer_seconds),
                ],
            )
            .await
            .map_err(|e| Error::store(TOKEN_BUCKET, e))?;

        check_arity(TOKEN_BUCKET, &reply, 3)?;
        let allowed = reply_i64(TOKEN_BUCKET, &reply, 0, "allowed flag")?;
        let tokens = reply_f64(TOKEN_BUCKET, &reply, 1, "tokens")?;
        let time_nanos = reply_i64(TOKEN_BUCKET, &reply, 2, "time")?;

        let mut metadata = HashMap::new();
        metadata.insert(
            "bucket_size".to_string(),
            MetadataValue::Int(self.bucket_size),
        );
        metadata.insert(
            "refill_rate".to_string(),
            MetadataValue::Int(self.refill_rate_per_second),
        );

        if allowed == 1 {
            metadata.insert("bucket_full_time".to_string(), MetadataValue::Int(time_nanos));

            return Ok(RateLimitResponse {
                allowed: true,
                limit: self.bucket_size,
                remaining: tokens.floor() as i64,
                reset_time: system_time_from_nanos(time_nanos),
                retry_after: None,
                metadata,
            });
        }

        metadata.insert("current_tokens".to_string(), MetadataValue::Float(tokens));
        metadata.insert("next_token_time".to_string(), MetadataValue::Int(time_nanos));

        let retry_nanos = (time_nanos - now_nanos).max(0);

        Ok(RateLimitResponse {
            allowed: false,
            limit: self.bucket_size,
            remaining: 0,
            reset_time: system_time_from_nanos(time_nanos),
            retry_after: Some(Duration::from_nanos(retry_nanos as u64)),
            metadata,
        })
    }

    async fn reset(&self, key: &str) -> Result<()> {
        let storage_key = self.storage_key(key);
        self.store
            .del(&[&storage_key])
            .await
            .map_err(|e| Error::store(TOKEN_BUCKET, e))?;
        Ok(())
    }
}

/// Registry constructor for [`TokenBucketLimiter`].
pub struct TokenBucketConstructor;

impl StrategyConstructor for TokenBucketConstructor {
    fn name(&self) -> &'static str {
        TOKEN_BUCKET
    }

    fn new_from_config(
        &self,
        config: &ConfigMap,
        store: Arc<dyn ScriptStore>,
    ) -> Result<Box<dyn RateLimiter>> {
        let config = TokenBucketConfig {
            bucket_size: get_i64(config, "bucket_size")?,
            refill_rate_per_second: get_i64(config, "refill_rate_per_second")?,
            key_prefix: get_str(config, "key_prefix")?,
            ttl_buffer_seconds: get_i64(config, "ttl_buffer_seconds")?,
        };
        Ok(Box::new(TokenBucketLimiter::new(config, store)?))
    }

    fn convert_config(&self, config: &StrategyConfig) -> Result<ConfigMap> {
        let StrategyConfig::TokenBucket(cfg) = config else {
            return Err(Error::invalid_config(
                "token bucket: expected token bucket configuration",
            ));
        };

        let mut map = ConfigMap::new();
        map.insert("key_prefix".to_string(), cfg.key_prefix.clone().into());
        map.insert(
            "ttl_buffer_seconds".to_string(),
            cfg.ttl_buffer_seconds.into(),
        );
        map.insert("bucket_size".to_string(), cfg.bucket_size.into());
        map.insert(
            "refill_rate_per_second".to_string(),
            cfg.refill_rate_per_second.into(),
        );
        Ok(map)
    }
}
