//! The shared admission contract
//!
//! Every engine implements [`RateLimiter`]: one atomic admission check and
//! one reset. The caller supplies the timestamp, which keeps engines
//! deterministic in tests and means bucketing is computed relative to the
//! provided time rather than server time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::StrategyConfig;
use crate::error::Result;
use crate::params::ConfigMap;
use crate::store::ScriptStore;

/// Nanoseconds per second, the unit conversion used throughout the scripts.
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Minimum TTL applied to any stored key, guarding against premature
/// expiration.
pub const MINIMUM_TTL_SECONDS: i64 = 60;

/// Default buffer added to key TTLs to absorb clock drift and network
/// latency between replica and store.
pub const DEFAULT_TTL_BUFFER_SECONDS: i64 = 60;

/// An algorithm-specific diagnostic carried in
/// [`RateLimitResponse::metadata`].
///
/// Timestamps are carried as unix nanoseconds in the `Int` variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Int(i64),
    Float(f64),
    Str(String),
}

/// Result of a single admission check.
///
/// Produced once per call and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct RateLimitResponse {
    /// Whether the request is allowed.
    pub allowed: bool,
    /// The configured bucket size.
    pub limit: i64,
    /// Budget left after this call (0 when denied).
    pub remaining: i64,
    /// When the key is expected to return to full capacity, or when a denied
    /// request becomes admissible.
    pub reset_time: SystemTime,
    /// Advisory wait before retrying; present only when denied.
    pub retry_after: Option<Duration>,
    /// Algorithm-specific diagnostics (current token count, counter split,
    /// window progress, ...).
    pub metadata: HashMap<String, MetadataValue>,
}

/// A rate-limiting engine.
///
/// Implementations are reentrant: there is no per-key in-process lock, and
/// all per-key mutation happens inside a single atomic script evaluation on
/// the store.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Consult the store atomically and decide whether the request
    /// identified by `key` at `timestamp` is admitted.
    async fn is_allowed(&self, key: &str, timestamp: SystemTime) -> Result<RateLimitResponse>;

    /// Remove all store state for `key`. Idempotent; resetting an absent key
    /// is not an error.
    async fn reset(&self, key: &str) -> Result<()>;
}

impl std::fmt::Debug for dyn RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn RateLimiter")
    }
}

/// Builds one kind of engine, either from a loosely-typed config map or from
/// the matching typed config.
///
/// The map shape is the bridge between typed configuration and the
/// [`Factory`](crate::factory::Factory) registry: it stays untyped so future
/// strategies can define their own keys without touching the factory.
pub trait StrategyConstructor: Send + Sync {
    /// The registry name, e.g. `"token_bucket"`.
    fn name(&self) -> &'static str;

    /// Read required fields from `config`, validate them, and construct the
    /// engine.
    fn new_from_config(
        &self,
        config: &ConfigMap,
        store: Arc<dyn ScriptStore>,
    ) -> Result<Box<dyn RateLimiter>>;

    /// Convert the strongly-typed configuration into the map shape
    /// [`new_from_config`](StrategyConstructor::new_from_config) consumes.
    fn convert_config(&self, config: &StrategyConfig) -> Result<ConfigMap>;
}

/// Unix timestamp of `t` in nanoseconds; negative for pre-epoch instants.
pub fn unix_nanos(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_nanos() as i64,
        Err(e) => -(e.duration().as_nanos() as i64),
    }
}

/// Inverse of [`unix_nanos`].
pub fn system_time_from_nanos(nanos: i64) -> SystemTime {
    if nanos >= 0 {
        UNIX_EPOCH + Duration::from_nanos(nanos as u64)
    } else {
        UNIX_EPOCH - Duration::from_nanos(nanos.unsigned_abs())
    }
}
