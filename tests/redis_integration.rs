//! Redis Integration Tests
//!
//! These tests need a running Redis server and are ignored by default:
//!
//! ```text
//! BITANALYTICS_REDIS_URL=redis://127.0.0.1:6379 cargo test --test redis_integration -- --ignored
//! ```
//!
//! Every test uses its own key prefix and deletes its keys afterwards, so
//! they can run in parallel against a shared server.

use bitanalytics::config::{Config, TrackingConfig};
use bitanalytics::redis::{HealthStatus, RedisBitmapStore, RedisConfig};
use bitanalytics::store::BitmapStore;
use bitanalytics::{BitAnalytics, BitOperator, Bucket};
use chrono::{TimeZone, Utc};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Test Helpers
// =============================================================================

static PREFIX_COUNTER: AtomicU32 = AtomicU32::new(0);

fn redis_url() -> String {
    std::env::var("BITANALYTICS_REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

/// Unique prefix per test and process
fn unique_prefix() -> String {
    format!(
        "bitanalyticstest{}x{}",
        std::process::id(),
        PREFIX_COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

async fn create_analytics() -> (Arc<RedisBitmapStore>, BitAnalytics) {
    let store = Arc::new(
        RedisBitmapStore::new(RedisConfig::with_url(redis_url()))
            .await
            .expect("Redis must be running for ignored tests"),
    );
    let options = TrackingConfig {
        key_prefix: unique_prefix(),
        ..Default::default()
    };
    let analytics = BitAnalytics::with_options(store.clone(), options).unwrap();
    analytics.delete_all_events().await.unwrap();
    (store, analytics)
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
#[ignore] // Needs Redis: BITANALYTICS_REDIS_URL=... cargo test --test redis_integration -- --ignored
async fn test_mark_and_query() {
    let (_, analytics) = create_analytics().await;
    let at = Utc.with_ymd_and_hms(2014, 1, 17, 10, 0, 0).unwrap();

    analytics.mark_event("active", 123, &at, true).await.unwrap();
    analytics.mark_event("active", 23232, &at, false).await.unwrap();

    let month = analytics.month_events("active", 2014, 1).unwrap();
    let week = analytics.week_events("active", 2014, 3).unwrap();
    let hour = analytics.hour_events("active", 2014, 1, 17, 10).unwrap();

    assert_eq!(month.count().await.unwrap(), 2);
    assert!(week.is_present(23232).await.unwrap());
    assert!(hour.is_present(123).await.unwrap());
    assert!(!hour.is_present(23232).await.unwrap());

    let missing = analytics.day_events("active", 2014, 1, 18).unwrap();
    assert!(!missing.exists().await.unwrap());
    assert_eq!(missing.count().await.unwrap(), 0);

    assert_eq!(analytics.delete_all_events().await.unwrap(), 4);
}

#[tokio::test]
#[ignore] // Needs Redis: BITANALYTICS_REDIS_URL=... cargo test --test redis_integration -- --ignored
async fn test_bit_operations_and_cleanup() {
    let (store, analytics) = create_analytics().await;
    let jan = Utc.with_ymd_and_hms(2014, 1, 10, 12, 0, 0).unwrap();
    let feb = Utc.with_ymd_and_hms(2014, 2, 10, 12, 0, 0).unwrap();

    analytics.mark_event("active", 123, &jan, false).await.unwrap();
    analytics.mark_event("active", 224, &jan, false).await.unwrap();
    analytics.mark_event("active", 123, &feb, false).await.unwrap();

    let m0 = analytics.month_events("active", 2014, 1).unwrap();
    let m1 = analytics.month_events("active", 2014, 2).unwrap();

    let and = analytics.bit_op_and(&[&m0, &m1]).await.unwrap();
    assert_eq!(and.count().await.unwrap(), 1);
    let or = analytics.bit_op_or(&[&m0, &m1]).await.unwrap();
    assert_eq!(or.count().await.unwrap(), 2);
    let xor = analytics.bit_op(BitOperator::Xor, &[&m0, &m1]).await.unwrap();
    assert!(xor.is_present(224).await.unwrap());

    let nested = analytics.bit_op_and(&[&and, &m1]).await.unwrap();
    assert!(nested.is_present(123).await.unwrap());
    assert!(store.exists(nested.key()).await.unwrap());

    assert_eq!(analytics.delete_temporary_bitop_keys().await.unwrap(), 4);
    assert!(m0.exists().await.unwrap());
    assert!(!and.exists().await.unwrap());

    analytics.delete_all_events().await.unwrap();
    assert!(!m0.exists().await.unwrap());
}

#[tokio::test]
#[ignore] // Needs Redis: BITANALYTICS_REDIS_URL=... cargo test --test redis_integration -- --ignored
async fn test_scan_cleanup_over_many_keys() {
    let (store, analytics) = create_analytics().await;

    for day in 1..=28 {
        for hour in 0..24 {
            let at = Utc.with_ymd_and_hms(2015, 2, day, hour, 0, 0).unwrap();
            analytics.mark_event("active", 1, &at, true).await.unwrap();
        }
    }

    let pattern = analytics.keys().events_pattern();
    let keys = store.keys_matching(&pattern).await.unwrap();
    // 1 month + ISO weeks 5 to 9 + 28 days + 672 hours
    assert_eq!(keys.len(), 706);

    assert_eq!(analytics.delete_all_events().await.unwrap(), 706);
    assert!(store.keys_matching(&pattern).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore] // Needs Redis: BITANALYTICS_REDIS_URL=... cargo test --test redis_integration -- --ignored
async fn test_health_and_metrics() {
    let (store, analytics) = create_analytics().await;
    assert_eq!(store.health_check().await, HealthStatus::Healthy);

    let at = Utc.with_ymd_and_hms(2014, 1, 17, 10, 0, 0).unwrap();
    analytics.mark_event("active", 1, &at, false).await.unwrap();

    let metrics = store.metrics();
    assert!(metrics.commands_executed > 0);
    assert_eq!(metrics.command_failures, 0);

    analytics.delete_all_events().await.unwrap();
}

#[tokio::test]
#[ignore] // Needs Redis: BITANALYTICS_REDIS_URL=... cargo test --test redis_integration -- --ignored
async fn test_connect_from_config() {
    let mut config = Config::default();
    config.redis.url = redis_url();
    config.redis.connection_timeout_ms = 2_000;
    config.tracking.key_prefix = unique_prefix();

    let analytics = BitAnalytics::connect(&config).await.unwrap();
    assert_eq!(analytics.store().store_id(), "redis-bitmap-v1");
    analytics.mark_event_now("active", 42).await.unwrap();
    assert!(analytics.delete_all_events().await.unwrap() >= 3);
}

#[tokio::test]
async fn test_unreachable_server_is_connection_error() {
    let config = RedisConfig::with_url("redis://127.0.0.1:1")
        .connection_timeout(Duration::from_millis(500));

    let err = RedisBitmapStore::new(config)
        .await
        .err()
        .expect("port 1 should refuse connections");
    assert!(err.is_connection());
}
