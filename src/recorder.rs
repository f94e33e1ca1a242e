//! Multi-granularity event marking
//!
//! Marking an event sets the identifier's bit in the month, ISO week and day
//! buckets of the timestamp (and the hour bucket when hourly tracking is on).
//! All writes go to the store as one batch.
//!
//! The batch is one round trip but not a transaction. A concurrent reader can
//! see the month bit before the hour bit, and an interrupted batch can leave
//! some buckets marked and others not. Callers should treat `mark_event` as
//! all-or-some.

use crate::bucket::EventBucket;
use crate::error::Result;
use crate::keys::KeyBuilder;
use crate::store::{BitWrite, BitmapStore};
use crate::types::{check_identifier, Granularity, Identifier, TimeBucket};
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

/// Granularities written by every mark, coarsest first
const DAILY_GRANULARITIES: [Granularity; 3] =
    [Granularity::Month, Granularity::Week, Granularity::Day];

/// Records identifiers into every bucket covering a timestamp
#[derive(Clone)]
pub struct EventRecorder {
    store: Arc<dyn BitmapStore>,
    keys: KeyBuilder,
    max_identifier: Identifier,
}

impl EventRecorder {
    /// Create a recorder writing through `store`
    pub fn new(store: Arc<dyn BitmapStore>, keys: KeyBuilder, max_identifier: Identifier) -> Self {
        Self {
            store,
            keys,
            max_identifier,
        }
    }

    /// Time coordinates covering `at`: month, week, day and optionally hour
    pub fn buckets_for<Tz: TimeZone>(at: &DateTime<Tz>, include_hourly: bool) -> Vec<TimeBucket> {
        let utc = at.with_timezone(&Utc);
        let mut buckets: Vec<TimeBucket> = DAILY_GRANULARITIES
            .iter()
            .map(|granularity| TimeBucket::at(*granularity, utc))
            .collect();
        if include_hourly {
            buckets.push(TimeBucket::at(Granularity::Hour, utc));
        }
        buckets
    }

    /// Bucket handles for `event_name` covering `at`, without writing
    pub fn event_buckets<Tz: TimeZone>(
        &self,
        event_name: &str,
        at: &DateTime<Tz>,
        include_hourly: bool,
    ) -> Result<Vec<EventBucket>> {
        Self::buckets_for(at, include_hourly)
            .into_iter()
            .map(|time_bucket| {
                EventBucket::new(
                    self.store.clone(),
                    &self.keys,
                    event_name,
                    time_bucket,
                    self.max_identifier,
                )
            })
            .collect()
    }

    /// Mark `identifier` present for `event_name` at `at`
    ///
    /// Every key is built and validated before anything is written, so an
    /// invalid event name or identifier never results in a partial write.
    pub async fn mark_event<Tz: TimeZone>(
        &self,
        event_name: &str,
        identifier: Identifier,
        at: &DateTime<Tz>,
        include_hourly: bool,
    ) -> Result<()> {
        check_identifier(identifier, self.max_identifier)?;

        let writes = Self::buckets_for(at, include_hourly)
            .iter()
            .map(|time_bucket| {
                self.keys
                    .build_key(event_name, time_bucket)
                    .map(|key| BitWrite::new(key, identifier))
            })
            .collect::<Result<Vec<_>>>()?;

        if let Err(e) = self.store.set_bits(&writes).await {
            warn!(
                event = event_name,
                identifier,
                buckets = writes.len(),
                "Failed to mark event: {}",
                e
            );
            return Err(e);
        }

        debug!(
            event = event_name,
            identifier,
            buckets = writes.len(),
            "Marked event"
        );
        Ok(())
    }
}
