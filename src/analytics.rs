//! High-level analytics API
//!
//! [`BitAnalytics`] owns the store handle and hands out fully constructed
//! bucket handles, so a bucket can never exist without its store.
//!
//! # Example
//!
//! ```rust
//! use bitanalytics::{BitAnalytics, Bucket};
//! use bitanalytics::store::InMemoryBitmapStore;
//! use chrono::{Datelike, Utc};
//! use std::sync::Arc;
//!
//! # async fn example() -> bitanalytics::Result<()> {
//! let analytics = BitAnalytics::new(Arc::new(InMemoryBitmapStore::new()));
//!
//! // Mark id 1 as active, and task completed for id 252
//! analytics.mark_event_now("active", 1).await?;
//! analytics.mark_event_now("tasks:completed", 252).await?;
//!
//! let now = Utc::now();
//! let active = analytics.month_events("active", now.year(), now.month())?;
//! assert!(active.is_present(1).await?);
//! assert_eq!(active.count().await?, 1);
//! # Ok(())
//! # }
//! ```

use crate::bitop::{BitOperationEngine, DerivedBucket};
use crate::bucket::{Bucket, EventBucket};
use crate::config::{Config, TrackingConfig};
use crate::error::{Error, Result};
use crate::keys::KeyBuilder;
use crate::recorder::EventRecorder;
use crate::redis::RedisBitmapStore;
use crate::store::BitmapStore;
use crate::types::{BitOperator, Identifier, TimeBucket};
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use tracing::info;

/// Entry point for marking events and querying buckets
#[derive(Clone)]
pub struct BitAnalytics {
    store: Arc<dyn BitmapStore>,
    keys: KeyBuilder,
    recorder: EventRecorder,
    engine: BitOperationEngine,
    options: TrackingConfig,
}

impl BitAnalytics {
    /// Analytics over `store` with default tracking options
    pub fn new(store: Arc<dyn BitmapStore>) -> Self {
        let options = TrackingConfig::default();
        let keys = KeyBuilder::default();
        Self::assemble(store, keys, options)
    }

    /// Analytics over `store` with explicit tracking options
    pub fn with_options(store: Arc<dyn BitmapStore>, options: TrackingConfig) -> Result<Self> {
        options.validate()?;
        let keys = options.key_builder()?;
        Ok(Self::assemble(store, keys, options))
    }

    /// Connect to the configured Redis server
    pub async fn connect(config: &Config) -> Result<Self> {
        config.validate()?;
        let store = RedisBitmapStore::new(config.redis.to_redis_config()).await?;
        Self::with_options(Arc::new(store), config.tracking.clone())
    }

    fn assemble(store: Arc<dyn BitmapStore>, keys: KeyBuilder, options: TrackingConfig) -> Self {
        let max = options.max_identifier;
        info!(
            store = store.store_id(),
            prefix = keys.prefix(),
            track_hourly = options.track_hourly,
            "Bit analytics ready"
        );
        Self {
            recorder: EventRecorder::new(store.clone(), keys.clone(), max),
            engine: BitOperationEngine::new(store.clone(), keys.clone(), max),
            store,
            keys,
            options,
        }
    }

    /// Store handle
    pub fn store(&self) -> &Arc<dyn BitmapStore> {
        &self.store
    }

    /// Key builder in use
    pub fn keys(&self) -> &KeyBuilder {
        &self.keys
    }

    /// Tracking options in use
    pub fn options(&self) -> &TrackingConfig {
        &self.options
    }

    /// Event recorder
    pub fn recorder(&self) -> &EventRecorder {
        &self.recorder
    }

    /// Bit operation engine
    pub fn engine(&self) -> &BitOperationEngine {
        &self.engine
    }

    // --- Marking ---

    /// Mark `identifier` for `event_name` now (UTC), with the configured
    /// hourly default
    pub async fn mark_event_now(&self, event_name: &str, identifier: Identifier) -> Result<()> {
        self.mark_event(event_name, identifier, &Utc::now(), self.options.track_hourly)
            .await
    }

    /// Mark `identifier` for `event_name` at `at` (converted to UTC)
    pub async fn mark_event<Tz: TimeZone>(
        &self,
        event_name: &str,
        identifier: Identifier,
        at: &DateTime<Tz>,
        track_hourly: bool,
    ) -> Result<()> {
        self.recorder
            .mark_event(event_name, identifier, at, track_hourly)
            .await
    }

    // --- Buckets ---

    /// Bucket for `event_name` at any time coordinate
    pub fn events(&self, event_name: &str, time_bucket: TimeBucket) -> Result<EventBucket> {
        EventBucket::new(
            self.store.clone(),
            &self.keys,
            event_name,
            time_bucket,
            self.options.max_identifier,
        )
    }

    /// Monthly bucket
    pub fn month_events(&self, event_name: &str, year: i32, month: u32) -> Result<EventBucket> {
        self.events(event_name, TimeBucket::month(year, month)?)
    }

    /// ISO-week bucket; `iso_year` is the ISO week-numbering year
    pub fn week_events(&self, event_name: &str, iso_year: i32, week: u32) -> Result<EventBucket> {
        self.events(event_name, TimeBucket::week(iso_year, week)?)
    }

    /// Daily bucket
    pub fn day_events(&self, event_name: &str, year: i32, month: u32, day: u32) -> Result<EventBucket> {
        self.events(event_name, TimeBucket::day(year, month, day)?)
    }

    /// Hourly bucket
    pub fn hour_events(
        &self,
        event_name: &str,
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
    ) -> Result<EventBucket> {
        self.events(event_name, TimeBucket::hour(year, month, day, hour)?)
    }

    // --- Bit operations ---

    /// Combine `sources` with `operator`
    pub async fn bit_op(&self, operator: BitOperator, sources: &[&dyn Bucket]) -> Result<DerivedBucket> {
        self.engine.combine(operator, sources).await
    }

    /// Identifiers present in every source
    pub async fn bit_op_and(&self, sources: &[&dyn Bucket]) -> Result<DerivedBucket> {
        self.bit_op(BitOperator::And, sources).await
    }

    /// Identifiers present in at least one source
    pub async fn bit_op_or(&self, sources: &[&dyn Bucket]) -> Result<DerivedBucket> {
        self.bit_op(BitOperator::Or, sources).await
    }

    /// Identifiers present in an odd number of sources
    pub async fn bit_op_xor(&self, sources: &[&dyn Bucket]) -> Result<DerivedBucket> {
        self.bit_op(BitOperator::Xor, sources).await
    }

    // --- Cleanup ---

    /// Delete every key under the prefix, including temporary keys
    pub async fn delete_all_events(&self) -> Result<u64> {
        let removed = self.store.delete_matching(&self.keys.events_pattern()).await?;
        info!(removed, prefix = self.keys.prefix(), "Deleted all event keys");
        Ok(removed)
    }

    /// Delete the temporary keys written by bit operations
    pub async fn delete_temporary_bitop_keys(&self) -> Result<u64> {
        self.engine.delete_temporary_keys().await
    }
}

impl std::fmt::Debug for BitAnalytics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitAnalytics")
            .field("store", &self.store.store_id())
            .field("keys", &self.keys)
            .field("options", &self.options)
            .finish()
    }
}

impl TryFrom<(Arc<dyn BitmapStore>, &Config)> for BitAnalytics {
    type Error = Error;

    fn try_from((store, config): (Arc<dyn BitmapStore>, &Config)) -> Result<Self> {
        Self::with_options(store, config.tracking.clone())
    }
}
