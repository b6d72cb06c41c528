//! Integration tests against a real Redis instance.
//!
//! Ignored by default. Start a local Redis (or point `REDIS_URL` somewhere)
//! and run:
//!
//! ```bash
//! REDIS_URL=redis://127.0.0.1:6379 cargo test -p limitcrab -- --ignored
//! ```

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use limitcrab::{
    RateLimiter, RedisScriptStore, SlidingWindowCounterConfig, SlidingWindowCounterLimiter,
    SlidingWindowLogConfig, SlidingWindowLogLimiter, TokenBucketConfig, TokenBucketLimiter,
};

async fn store() -> Arc<RedisScriptStore> {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    Arc::new(RedisScriptStore::connect(&url).await.expect("redis"))
}

/// A key unlikely to collide with anything else in the database.
fn unique_key(label: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{label}-{nanos}")
}

#[tokio::test]
#[ignore]
async fn test_token_bucket_against_redis() {
    let store = store().await;
    let limiter = TokenBucketLimiter::new(
        TokenBucketConfig {
            key_prefix: "it:tb".to_string(),
            ttl_buffer_seconds: 5,
            bucket_size: 3,
            refill_rate_per_second: 1,
        },
        store,
    )
    .unwrap();

    let key = unique_key("burst");
    let t0 = SystemTime::now();

    for expected_remaining in [2, 1, 0] {
        let response = limiter.is_allowed(&key, t0).await.unwrap();
        assert!(response.allowed);
        assert_eq!(response.remaining, expected_remaining);
    }

    let denied = limiter.is_allowed(&key, t0).await.unwrap();
    assert!(!denied.allowed);
    let retry = denied.retry_after.unwrap();
    assert!(retry > Duration::from_millis(900) && retry <= Duration::from_secs(1));

    // Fractional tokens survive the decimal-string boundary.
    let half_later = limiter
        .is_allowed(&key, t0 + Duration::from_millis(500))
        .await
        .unwrap();
    assert!(!half_later.allowed);
    assert_eq!(half_later.retry_after, Some(Duration::from_millis(500)));

    assert!(
        limiter
            .is_allowed(&key, t0 + Duration::from_secs(1))
            .await
            .unwrap()
            .allowed
    );

    limiter.reset(&key).await.unwrap();
    let fresh = limiter.is_allowed(&key, t0).await.unwrap();
    assert!(fresh.allowed);
    assert_eq!(fresh.remaining, 2);
    limiter.reset(&key).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_sliding_window_log_against_redis() {
    let store = store().await;
    let limiter = SlidingWindowLogLimiter::new(
        SlidingWindowLogConfig {
            key_prefix: "it:swl".to_string(),
            ttl_buffer_seconds: 5,
            window_size_seconds: 10,
            bucket_size: 3,
        },
        store,
    )
    .unwrap();

    let key = unique_key("log");
    let t0 = SystemTime::now();

    for offset in [0, 3, 6] {
        let response = limiter
            .is_allowed(&key, t0 + Duration::from_secs(offset))
            .await
            .unwrap();
        assert!(response.allowed, "admission at +{offset}s should pass");
    }

    let denied = limiter
        .is_allowed(&key, t0 + Duration::from_secs(8))
        .await
        .unwrap();
    assert!(!denied.allowed);
    assert!(denied.retry_after.unwrap() <= Duration::from_secs(10));

    // The oldest entry has aged out one window after t0.
    let response = limiter
        .is_allowed(&key, t0 + Duration::from_secs(11))
        .await
        .unwrap();
    assert!(response.allowed);

    limiter.reset(&key).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_sliding_window_counter_against_redis() {
    let store = store().await;
    let limiter = SlidingWindowCounterLimiter::new(
        SlidingWindowCounterConfig {
            key_prefix: "it:swc".to_string(),
            ttl_buffer_seconds: 5,
            window_size_seconds: 10,
            bucket_size: 5,
        },
        store,
    )
    .unwrap();

    let key = unique_key("counter");
    // Align on a window boundary so the whole burst lands in one bucket.
    let now_secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs();
    let t0 = UNIX_EPOCH + Duration::from_secs(now_secs - now_secs % 10);

    for _ in 0..5 {
        assert!(limiter.is_allowed(&key, t0).await.unwrap().allowed);
    }

    let denied = limiter.is_allowed(&key, t0).await.unwrap();
    assert!(!denied.allowed);
    assert!(denied.retry_after.unwrap() <= Duration::from_secs(10));

    // Into the next window the blend decays and admissions resume.
    let next_window = limiter
        .is_allowed(&key, t0 + Duration::from_secs(15))
        .await
        .unwrap();
    assert!(next_window.allowed);
    assert_eq!(
        next_window.metadata.get("previous_count"),
        Some(&limitcrab::MetadataValue::Int(5))
    );

    limiter.reset(&key).await.unwrap();
}
