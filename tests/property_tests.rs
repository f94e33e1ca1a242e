//! Property Tests for Marking and Bit Operations
//!
//! Uses property-based testing (proptest) over the in-memory store to check
//! set semantics of buckets and bit operations against a `BTreeSet` model.

use bitanalytics::{
    store::InMemoryBitmapStore, BitAnalytics, BitOperator, Bucket, EventBucket, TimeBucket,
};
use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::runtime::Runtime;

// =============================================================================
// Test Data Strategies
// =============================================================================

/// Small identifier sets, dense enough to collide
fn id_set() -> impl Strategy<Value = BTreeSet<u64>> {
    prop::collection::btree_set(
        prop_oneof![0u64..64, 0u64..4096, Just(0u64), Just(7u64), Just(8u64)],
        0..40,
    )
}

fn operator() -> impl Strategy<Value = BitOperator> {
    prop_oneof![
        Just(BitOperator::And),
        Just(BitOperator::Or),
        Just(BitOperator::Xor),
    ]
}

/// Event names that pass key validation
fn event_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9:.-]{0,15}".prop_filter("reserved", |s| s != "bitop")
}

// =============================================================================
// Helpers
// =============================================================================

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("Failed to build runtime")
}

async fn bucket_with(analytics: &BitAnalytics, month: u32, ids: &BTreeSet<u64>) -> EventBucket {
    let bucket = analytics.month_events("active", 2014, month).unwrap();
    for id in ids {
        bucket.mark_present(*id).await.unwrap();
    }
    bucket
}

async fn members(bucket: &dyn Bucket, candidates: &BTreeSet<u64>) -> BTreeSet<u64> {
    let mut present = BTreeSet::new();
    for id in candidates {
        if bucket.is_present(*id).await.unwrap() {
            present.insert(*id);
        }
    }
    present
}

fn model(operator: BitOperator, sets: &[&BTreeSet<u64>]) -> BTreeSet<u64> {
    let universe: BTreeSet<u64> = sets.iter().flat_map(|s| s.iter().copied()).collect();
    universe
        .into_iter()
        .filter(|id| {
            let hits = sets.iter().filter(|s| s.contains(id)).count();
            match operator {
                BitOperator::And => hits == sets.len(),
                BitOperator::Or => hits > 0,
                BitOperator::Xor => hits % 2 == 1,
            }
        })
        .collect()
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_marking_is_idempotent_and_counted(ids in id_set(), repeats in 1usize..3) {
        runtime().block_on(async {
            let analytics = BitAnalytics::new(Arc::new(InMemoryBitmapStore::new()));
            let bucket = analytics.month_events("active", 2014, 1).unwrap();
            for _ in 0..repeats {
                for id in &ids {
                    bucket.mark_present(*id).await.unwrap();
                }
            }

            prop_assert_eq!(bucket.count().await.unwrap(), ids.len() as u64);
            prop_assert_eq!(bucket.exists().await.unwrap(), !ids.is_empty());
            for id in &ids {
                prop_assert!(bucket.is_present(*id).await.unwrap());
            }
            Ok(())
        })?;
    }

    #[test]
    fn prop_bit_ops_match_set_model(
        op in operator(),
        a in id_set(),
        b in id_set(),
        c in id_set(),
    ) {
        runtime().block_on(async {
            let analytics = BitAnalytics::new(Arc::new(InMemoryBitmapStore::new()));
            let ba = bucket_with(&analytics, 1, &a).await;
            let bb = bucket_with(&analytics, 2, &b).await;
            let bc = bucket_with(&analytics, 3, &c).await;

            let derived = analytics.bit_op(op, &[&ba, &bb, &bc]).await.unwrap();
            let expected = model(op, &[&a, &b, &c]);

            let universe: BTreeSet<u64> = a.iter().chain(&b).chain(&c).copied().collect();
            prop_assert_eq!(members(&derived, &universe).await, expected.clone());
            prop_assert_eq!(derived.count().await.unwrap(), expected.len() as u64);
            Ok(())
        })?;
    }

    #[test]
    fn prop_and_or_bounds(a in id_set(), b in id_set()) {
        runtime().block_on(async {
            let analytics = BitAnalytics::new(Arc::new(InMemoryBitmapStore::new()));
            let ba = bucket_with(&analytics, 1, &a).await;
            let bb = bucket_with(&analytics, 2, &b).await;

            let and = analytics.bit_op_and(&[&ba, &bb]).await.unwrap().count().await.unwrap();
            let or = analytics.bit_op_or(&[&ba, &bb]).await.unwrap().count().await.unwrap();
            let (ca, cb) = (a.len() as u64, b.len() as u64);

            prop_assert!(and <= ca.min(cb));
            prop_assert!(or >= ca.max(cb));
            prop_assert_eq!(and + or, ca + cb);
            Ok(())
        })?;
    }

    #[test]
    fn prop_nested_and_equals_flat_and(a in id_set(), b in id_set(), c in id_set()) {
        runtime().block_on(async {
            let analytics = BitAnalytics::new(Arc::new(InMemoryBitmapStore::new()));
            let ba = bucket_with(&analytics, 1, &a).await;
            let bb = bucket_with(&analytics, 2, &b).await;
            let bc = bucket_with(&analytics, 3, &c).await;

            let inner = analytics.bit_op_and(&[&ba, &bb]).await.unwrap();
            let nested = analytics.bit_op_and(&[&inner, &bc]).await.unwrap();
            let flat = analytics.bit_op_and(&[&ba, &bb, &bc]).await.unwrap();

            prop_assert_ne!(nested.key(), flat.key());
            prop_assert_eq!(nested.count().await.unwrap(), flat.count().await.unwrap());
            Ok(())
        })?;
    }

    #[test]
    fn prop_events_are_isolated(
        first in event_name(),
        second in event_name(),
        id in 0u64..100_000,
    ) {
        prop_assume!(first != second);
        runtime().block_on(async {
            let analytics = BitAnalytics::new(Arc::new(InMemoryBitmapStore::new()));
            let at = Utc.with_ymd_and_hms(2014, 6, 15, 12, 0, 0).unwrap();
            analytics.mark_event(&first, id, &at, true).await.unwrap();

            for time_bucket in [
                TimeBucket::month(2014, 6).unwrap(),
                TimeBucket::week(2014, 24).unwrap(),
                TimeBucket::day(2014, 6, 15).unwrap(),
                TimeBucket::hour(2014, 6, 15, 12).unwrap(),
            ] {
                let marked = analytics.events(&first, time_bucket).unwrap();
                let other = analytics.events(&second, time_bucket).unwrap();
                prop_assert!(marked.is_present(id).await.unwrap());
                prop_assert!(!other.is_present(id).await.unwrap());
                prop_assert!(!other.exists().await.unwrap());
            }
            Ok(())
        })?;
    }
}
