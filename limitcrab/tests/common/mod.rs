//! An in-memory [`ScriptStore`] that emulates the three admission scripts'
//! state transitions, so scenario tests run deterministically without Redis.
//!
//! The emulation follows the scripts' arithmetic: counters and timestamps go
//! through f64 the way Lua numbers do, fractional token counts cross the
//! boundary as decimal strings, and other floats are truncated to integers
//! on the way out.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use limitcrab::{ScriptArg, ScriptStore, ScriptValue, StoreError};

type StoreResult<T> = Result<T, StoreError>;

#[derive(Default)]
struct Inner {
    hashes: HashMap<String, HashMap<String, String>>,
    zsets: HashMap<String, Vec<(i64, String)>>,
    ttls: HashMap<String, i64>,
}

/// In-memory stand-in for the scripting store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

fn arg_i64(args: &[ScriptArg], index: usize) -> i64 {
    match args[index] {
        ScriptArg::Int(v) => v,
        ScriptArg::Float(v) => v as i64,
    }
}

fn arg_f64(args: &[ScriptArg], index: usize) -> f64 {
    match args[index] {
        ScriptArg::Int(v) => v as f64,
        ScriptArg::Float(v) => v,
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored hash field, for invariant assertions.
    pub fn hash_field(&self, key: &str, field: &str) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .hashes
            .get(key)
            .and_then(|h| h.get(field).cloned())
    }

    /// Scores currently held in a sorted set, ascending.
    pub fn zset_scores(&self, key: &str) -> Vec<i64> {
        self.inner
            .lock()
            .unwrap()
            .zsets
            .get(key)
            .map(|entries| entries.iter().map(|(score, _)| *score).collect())
            .unwrap_or_default()
    }

    /// Members currently held in a sorted set.
    pub fn zset_members(&self, key: &str) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .zsets
            .get(key)
            .map(|entries| entries.iter().map(|(_, member)| member.clone()).collect())
            .unwrap_or_default()
    }

    /// The TTL last applied to a key, in seconds.
    pub fn ttl(&self, key: &str) -> Option<i64> {
        self.inner.lock().unwrap().ttls.get(key).copied()
    }

    fn token_bucket(&self, key: &str, args: &[ScriptArg]) -> Vec<ScriptValue> {
        let bucket_size = arg_i64(args, 0) as f64;
        let refill_rate = arg_i64(args, 1) as f64;
        let now_nanos = arg_i64(args, 2);
        let ttl_buffer = arg_i64(args, 3) as f64;

        let mut inner = self.inner.lock().unwrap();

        let mut tokens = bucket_size;
        let mut last_refill_nanos = now_nanos as f64;
        if let Some(hash) = inner.hashes.get(key) {
            if let Some(stored) = hash.get("tokens") {
                tokens = stored.parse().unwrap();
            }
            if let Some(stored) = hash.get("last_refill_time_nanos") {
                last_refill_nanos = stored.parse().unwrap();
            }
        }

        let elapsed_seconds = (now_nanos as f64 - last_refill_nanos) / 1e9;
        tokens = bucket_size.min(tokens + elapsed_seconds * refill_rate);

        let ttl_seconds = 60f64.max((bucket_size / refill_rate + ttl_buffer).ceil()) as i64;

        if tokens < 1.0 {
            let next_token_nanos = now_nanos as f64 + ((1.0 - tokens) / refill_rate) * 1e9;
            let hash = inner.hashes.entry(key.to_string()).or_default();
            hash.insert("tokens".to_string(), tokens.to_string());
            hash.insert(
                "last_refill_time_nanos".to_string(),
                now_nanos.to_string(),
            );
            inner.ttls.insert(key.to_string(), ttl_seconds);
            return vec![
                ScriptValue::Int(0),
                ScriptValue::Str(tokens.to_string()),
                ScriptValue::Int(next_token_nanos as i64),
            ];
        }

        let remaining = tokens - 1.0;
        let hash = inner.hashes.entry(key.to_string()).or_default();
        hash.insert("tokens".to_string(), remaining.to_string());
        hash.insert(
            "last_refill_time_nanos".to_string(),
            now_nanos.to_string(),
        );
        inner.ttls.insert(key.to_string(), ttl_seconds);

        let full_time_nanos = now_nanos as f64 + ((bucket_size - remaining) / refill_rate) * 1e9;
        vec![
            ScriptValue::Int(1),
            ScriptValue::Str(remaining.to_string()),
            ScriptValue::Int(full_time_nanos as i64),
        ]
    }

    fn sliding_window_log(&self, key: &str, args: &[ScriptArg]) -> Vec<ScriptValue> {
        let window_start_nanos = arg_i64(args, 0);
        let now_nanos = arg_i64(args, 1);
        let bucket_size = arg_i64(args, 2);
        let window_size_seconds = arg_i64(args, 3);
        let ttl_buffer = arg_i64(args, 4);
        let member_suffix = arg_i64(args, 5);

        let mut inner = self.inner.lock().unwrap();
        let entries = inner.zsets.entry(key.to_string()).or_default();
        entries.retain(|(score, _)| *score > window_start_nanos);

        let current_count = entries.len() as i64;

        if current_count >= bucket_size {
            let reset_time_seconds = entries
                .iter()
                .map(|(score, _)| *score)
                .min()
                .map(|oldest| {
                    ((oldest + window_size_seconds * 1_000_000_000) as f64 / 1e9) as i64
                })
                .unwrap_or(0);
            return vec![
                ScriptValue::Int(0),
                ScriptValue::Int(current_count),
                ScriptValue::Int(reset_time_seconds),
            ];
        }

        entries.push((now_nanos, format!("{now_nanos}:{member_suffix}")));
        entries.sort_by_key(|(score, _)| *score);

        let ttl_seconds = 60.max(window_size_seconds + ttl_buffer);
        inner.ttls.insert(key.to_string(), ttl_seconds);

        vec![
            ScriptValue::Int(1),
            ScriptValue::Int(current_count + 1),
            ScriptValue::Int(0),
            ScriptValue::Int(bucket_size - current_count - 1),
        ]
    }

    fn sliding_window_counter(&self, key: &str, args: &[ScriptArg]) -> Vec<ScriptValue> {
        let current_window_start = arg_i64(args, 0);
        let previous_window_start = arg_i64(args, 1);
        let bucket_size = arg_i64(args, 2);
        let window_size_nanos = arg_i64(args, 3);
        let ttl_seconds = arg_i64(args, 4);
        let window_progress = arg_f64(args, 5);

        let current_window_key = format!("{key}:current");
        let previous_window_key = format!("{key}:previous");

        let mut inner = self.inner.lock().unwrap();

        let read_record = |hashes: &HashMap<String, HashMap<String, String>>, k: &str| {
            let hash = hashes.get(k)?;
            let count: i64 = hash.get("count")?.parse().ok()?;
            let window_start: i64 = hash.get("window_start")?.parse().ok()?;
            Some((count, window_start))
        };

        let mut current_count = 0i64;
        let mut previous_count = 0i64;

        if let Some((count, stored_start)) = read_record(&inner.hashes, &current_window_key) {
            if stored_start == current_window_start {
                current_count = count;
            } else if stored_start == previous_window_start {
                previous_count = count;
            }
        }

        if previous_count == 0 {
            if let Some((count, stored_start)) = read_record(&inner.hashes, &previous_window_key) {
                if stored_start == previous_window_start {
                    previous_count = count;
                }
            }
        }

        let weighted_count =
            (current_count as f64 + previous_count as f64 * (1.0 - window_progress)).floor() as i64;

        if weighted_count >= bucket_size {
            let reset_time_nanos = current_window_start + window_size_nanos;
            return vec![
                ScriptValue::Int(0),
                ScriptValue::Int(weighted_count),
                ScriptValue::Int(reset_time_nanos),
                ScriptValue::Int(current_count),
                ScriptValue::Int(previous_count),
            ];
        }

        let new_current_count = current_count + 1;
        let hash = inner.hashes.entry(current_window_key.clone()).or_default();
        hash.insert("count".to_string(), new_current_count.to_string());
        hash.insert(
            "window_start".to_string(),
            current_window_start.to_string(),
        );
        inner.ttls.insert(current_window_key, ttl_seconds);

        let hash = inner.hashes.entry(previous_window_key.clone()).or_default();
        hash.insert("count".to_string(), previous_count.to_string());
        hash.insert(
            "window_start".to_string(),
            previous_window_start.to_string(),
        );
        inner.ttls.insert(previous_window_key, ttl_seconds);

        let remaining = (bucket_size - weighted_count - 1).max(0);
        vec![
            ScriptValue::Int(1),
            ScriptValue::Int(weighted_count + 1),
            ScriptValue::Int(0),
            ScriptValue::Int(new_current_count),
            ScriptValue::Int(previous_count),
            ScriptValue::Int(remaining),
        ]
    }
}

#[async_trait]
impl ScriptStore for MemoryStore {
    async fn eval(
        &self,
        script: &str,
        keys: &[&str],
        args: &[ScriptArg],
    ) -> StoreResult<Vec<ScriptValue>> {
        let key = keys[0];
        if script.contains("last_refill_time_nanos") {
            Ok(self.token_bucket(key, args))
        } else if script.contains("ZREMRANGEBYSCORE") {
            Ok(self.sliding_window_log(key, args))
        } else if script.contains("previous_window_key") {
            Ok(self.sliding_window_counter(key, args))
        } else {
            Err(StoreError::UnexpectedReply("unknown script".to_string()))
        }
    }

    async fn del(&self, keys: &[&str]) -> StoreResult<i64> {
        let mut inner = self.inner.lock().unwrap();
        let mut removed = 0;
        for key in keys {
            let existed =
                inner.hashes.remove(*key).is_some() | inner.zsets.remove(*key).is_some();
            inner.ttls.remove(*key);
            if existed {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
