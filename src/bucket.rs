//! Event buckets
//!
//! A bucket is one bitmap in the store. [`Bitmap`] binds a store handle to a
//! key; [`EventBucket`] and [`DerivedBucket`](crate::bitop::DerivedBucket)
//! both wrap one and share the read/delete contract through [`Bucket`].
//!
//! # Example
//!
//! ```rust
//! use bitanalytics::bucket::{Bucket, EventBucket};
//! use bitanalytics::keys::KeyBuilder;
//! use bitanalytics::store::InMemoryBitmapStore;
//! use bitanalytics::types::{TimeBucket, MAX_BIT_OFFSET};
//! use std::sync::Arc;
//!
//! # async fn example() -> bitanalytics::Result<()> {
//! let store = Arc::new(InMemoryBitmapStore::new());
//! let bucket = EventBucket::new(
//!     store,
//!     &KeyBuilder::default(),
//!     "active",
//!     TimeBucket::day(2012, 10, 23)?,
//!     MAX_BIT_OFFSET,
//! )?;
//!
//! bucket.mark_present(123).await?;
//! assert!(bucket.is_present(123).await?);
//! assert_eq!(bucket.count().await?, 1);
//! # Ok(())
//! # }
//! ```

use crate::error::Result;
use crate::keys::KeyBuilder;
use crate::store::BitmapStore;
use crate::types::{check_identifier, Granularity, Identifier, TimeBucket};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// A store handle bound to one key
#[derive(Clone)]
pub struct Bitmap {
    store: Arc<dyn BitmapStore>,
    key: String,
    max_identifier: Identifier,
}

impl Bitmap {
    /// Bind `key` in `store`; identifiers above `max_identifier` are rejected
    pub fn new(store: Arc<dyn BitmapStore>, key: impl Into<String>, max_identifier: Identifier) -> Self {
        Self {
            store,
            key: key.into(),
            max_identifier,
        }
    }

    /// Storage key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Store handle
    pub fn store(&self) -> &Arc<dyn BitmapStore> {
        &self.store
    }

    /// Largest identifier accepted
    pub fn max_identifier(&self) -> Identifier {
        self.max_identifier
    }

    /// Set the bit for `identifier`
    pub async fn set(&self, identifier: Identifier) -> Result<()> {
        check_identifier(identifier, self.max_identifier)?;
        self.store.set_bit(&self.key, identifier).await?;
        Ok(())
    }

    /// Read the bit for `identifier`
    ///
    /// Identifiers above the limit can never be marked, so they read as
    /// absent without a round trip.
    pub async fn get(&self, identifier: Identifier) -> Result<bool> {
        if identifier > self.max_identifier {
            return Ok(false);
        }
        self.store.get_bit(&self.key, identifier).await
    }

    /// Population count
    pub async fn count(&self) -> Result<u64> {
        self.store.bit_count(&self.key).await
    }

    /// Raw key existence
    pub async fn exists(&self) -> Result<bool> {
        self.store.exists(&self.key).await
    }

    /// Remove the key
    pub async fn delete(&self) -> Result<()> {
        self.store.delete(std::slice::from_ref(&self.key)).await?;
        Ok(())
    }
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bitmap")
            .field("store", &self.store.store_id())
            .field("key", &self.key)
            .field("max_identifier", &self.max_identifier)
            .finish()
    }
}

/// Read and delete operations shared by every bucket kind
///
/// Anything implementing `Bucket` can be an operand of a bit operation.
#[async_trait]
pub trait Bucket: Send + Sync {
    /// The bitmap this bucket reads
    fn bitmap(&self) -> &Bitmap;

    /// Storage key
    fn key(&self) -> &str {
        self.bitmap().key()
    }

    /// True if `identifier` is recorded; absent buckets record nothing
    async fn is_present(&self, identifier: Identifier) -> Result<bool> {
        self.bitmap().get(identifier).await
    }

    /// Number of distinct identifiers recorded
    async fn count(&self) -> Result<u64> {
        self.bitmap().count().await
    }

    /// True if the key holds any value at all
    ///
    /// This is a raw existence check: a bit-operation result whose bits are
    /// all zero still exists.
    async fn exists(&self) -> Result<bool> {
        self.bitmap().exists().await
    }

    /// Remove the bucket; no-op if absent
    async fn delete(&self) -> Result<()> {
        self.bitmap().delete().await
    }
}

/// Bucket for one event at one time coordinate
#[derive(Debug, Clone)]
pub struct EventBucket {
    event_name: String,
    time_bucket: TimeBucket,
    bitmap: Bitmap,
}

impl EventBucket {
    /// Build the bucket for `event_name` at `time_bucket`
    ///
    /// Fails with `InvalidArgument` if the event name or coordinate is
    /// rejected by the key scheme.
    pub fn new(
        store: Arc<dyn BitmapStore>,
        keys: &KeyBuilder,
        event_name: impl Into<String>,
        time_bucket: TimeBucket,
        max_identifier: Identifier,
    ) -> Result<Self> {
        let event_name = event_name.into();
        let key = keys.build_key(&event_name, &time_bucket)?;
        Ok(Self {
            event_name,
            time_bucket,
            bitmap: Bitmap::new(store, key, max_identifier),
        })
    }

    /// Record `identifier`; idempotent
    pub async fn mark_present(&self, identifier: Identifier) -> Result<()> {
        self.bitmap.set(identifier).await
    }

    /// Event name
    pub fn event_name(&self) -> &str {
        &self.event_name
    }

    /// Time coordinate
    pub fn time_bucket(&self) -> TimeBucket {
        self.time_bucket
    }

    /// Granularity
    pub fn granularity(&self) -> Granularity {
        self.time_bucket.granularity()
    }
}

impl Bucket for EventBucket {
    fn bitmap(&self) -> &Bitmap {
        &self.bitmap
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryBitmapStore;
    use crate::types::MAX_BIT_OFFSET;

    fn bucket(store: &Arc<InMemoryBitmapStore>, event: &str) -> EventBucket {
        EventBucket::new(
            store.clone(),
            &KeyBuilder::default(),
            event,
            TimeBucket::month(2014, 1).unwrap(),
            MAX_BIT_OFFSET,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_absent_bucket_reads_as_empty() {
        let store = Arc::new(InMemoryBitmapStore::new());
        let b = bucket(&store, "active");

        assert!(!b.is_present(123).await.unwrap());
        assert_eq!(b.count().await.unwrap(), 0);
        assert!(!b.exists().await.unwrap());
        // Deleting an absent bucket is a no-op
        b.delete().await.unwrap();
    }

    #[tokio::test]
    async fn test_mark_is_idempotent() {
        let store = Arc::new(InMemoryBitmapStore::new());
        let b = bucket(&store, "active");

        b.mark_present(123).await.unwrap();
        b.mark_present(123).await.unwrap();
        b.mark_present(7).await.unwrap();

        assert_eq!(b.count().await.unwrap(), 2);
        assert!(b.is_present(123).await.unwrap());
        assert!(!b.is_present(124).await.unwrap());
        assert!(b.exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_delete() {
        let store = Arc::new(InMemoryBitmapStore::new());
        let b = bucket(&store, "active");
        b.mark_present(1).await.unwrap();

        b.delete().await.unwrap();
        assert!(!b.exists().await.unwrap());
        assert_eq!(b.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_events_are_isolated() {
        let store = Arc::new(InMemoryBitmapStore::new());
        let active = bucket(&store, "active");
        let completed = bucket(&store, "tasks:completed");

        active.mark_present(5).await.unwrap();
        assert!(!completed.is_present(5).await.unwrap());
        assert_eq!(completed.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_identifier_limit() {
        let store = Arc::new(InMemoryBitmapStore::new());
        let b = EventBucket::new(
            store.clone(),
            &KeyBuilder::default(),
            "active",
            TimeBucket::day(2014, 1, 1).unwrap(),
            1_000,
        )
        .unwrap();

        assert!(b.mark_present(1_001).await.unwrap_err().is_invalid_argument());
        b.mark_present(1_000).await.unwrap();
        // Rejected writes never reach the store
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_read_above_limit_is_absent() {
        let store = Arc::new(InMemoryBitmapStore::new());
        let b = EventBucket::new(
            store.clone(),
            &KeyBuilder::default(),
            "active",
            TimeBucket::month(2014, 1).unwrap(),
            1_000,
        )
        .unwrap();
        b.mark_present(5).await.unwrap();
        let before = store.round_trips();

        assert!(!b.is_present(1_001).await.unwrap());
        assert!(!b.is_present(u64::MAX).await.unwrap());
        assert_eq!(store.round_trips(), before);
        assert!(b.is_present(5).await.unwrap());
    }

    #[tokio::test]
    async fn test_store_errors_propagate() {
        let store = Arc::new(InMemoryBitmapStore::new());
        let b = bucket(&store, "active");
        store.set_available(false);

        assert!(b.mark_present(1).await.unwrap_err().is_connection());
        assert!(b.is_present(1).await.unwrap_err().is_connection());
        assert!(b.count().await.unwrap_err().is_connection());
        assert!(b.exists().await.unwrap_err().is_connection());
        assert!(b.delete().await.unwrap_err().is_connection());
    }

    #[test]
    fn test_bucket_identity() {
        let store = Arc::new(InMemoryBitmapStore::new());
        let b = bucket(&store, "active");

        assert_eq!(b.key(), "bitanalytics_active_2014-1");
        assert_eq!(b.event_name(), "active");
        assert_eq!(b.granularity(), Granularity::Month);
        assert!(format!("{:?}", b.bitmap()).contains("in-memory-v1"));
    }

    #[test]
    fn test_invalid_event_name() {
        let store = Arc::new(InMemoryBitmapStore::new());
        let err = EventBucket::new(
            store,
            &KeyBuilder::default(),
            "new_signups",
            TimeBucket::month(2014, 1).unwrap(),
            MAX_BIT_OFFSET,
        )
        .unwrap_err();
        assert!(err.is_invalid_argument());
    }
}
