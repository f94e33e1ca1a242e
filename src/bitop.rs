//! Bit operations across buckets
//!
//! [`BitOperationEngine::combine`] runs BITOP eagerly and stores the result
//! under a temporary key `{prefix}_bitop_{OP}_{source keys joined by '-'}`.
//! The returned [`DerivedBucket`] is itself a [`Bucket`], so operations nest:
//!
//! ```rust
//! use bitanalytics::bitop::BitOperationEngine;
//! use bitanalytics::bucket::{Bucket, EventBucket};
//! use bitanalytics::keys::KeyBuilder;
//! use bitanalytics::store::{BitmapStore, InMemoryBitmapStore};
//! use bitanalytics::types::{BitOperator, TimeBucket, MAX_BIT_OFFSET};
//! use std::sync::Arc;
//!
//! # async fn example() -> bitanalytics::Result<()> {
//! let store: Arc<dyn BitmapStore> = Arc::new(InMemoryBitmapStore::new());
//! let keys = KeyBuilder::default();
//! let month = |m| {
//!     EventBucket::new(store.clone(), &keys, "active", TimeBucket::month(2012, m)?, MAX_BIT_OFFSET)
//! };
//! let (september, october) = (month(9)?, month(10)?);
//!
//! let engine = BitOperationEngine::new(store.clone(), keys.clone(), MAX_BIT_OFFSET);
//! let both = engine.combine(BitOperator::And, &[&september, &october]).await?;
//! let nested = engine.combine(BitOperator::And, &[&both, &october]).await?;
//! assert_eq!(nested.count().await?, both.count().await?);
//!
//! // Temporary keys are not cleaned up automatically
//! engine.delete_temporary_keys().await?;
//! # Ok(())
//! # }
//! ```
//!
//! Temporary key names follow the order of the sources, so `AND(a, b)` and
//! `AND(b, a)` are stored twice even though they hold the same bits.
//!
//! Nested source keys are joined with `-` and not delimited, so different
//! expressions can map to the same key. `AND(OR(x, y), z)` and
//! `AND(OR(x, y, z))` share one temporary key, and whichever runs last
//! overwrites the other's result.

use crate::bucket::{Bitmap, Bucket};
use crate::error::{Error, Result};
use crate::keys::KeyBuilder;
use crate::store::BitmapStore;
use crate::types::{BitOperator, Identifier};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of a bit operation over other buckets
///
/// Derived buckets are only created, read and deleted; nothing marks them.
#[derive(Debug, Clone)]
pub struct DerivedBucket {
    operator: BitOperator,
    source_keys: Vec<String>,
    bitmap: Bitmap,
}

impl DerivedBucket {
    /// Operator that produced this bucket
    pub fn operator(&self) -> BitOperator {
        self.operator
    }

    /// Keys of the operands, in the order they were combined
    pub fn source_keys(&self) -> &[String] {
        &self.source_keys
    }
}

impl Bucket for DerivedBucket {
    fn bitmap(&self) -> &Bitmap {
        &self.bitmap
    }
}

/// Combines buckets with AND / OR / XOR
#[derive(Clone)]
pub struct BitOperationEngine {
    store: Arc<dyn BitmapStore>,
    keys: KeyBuilder,
    max_identifier: Identifier,
}

impl BitOperationEngine {
    /// Create an engine writing results through `store`
    pub fn new(store: Arc<dyn BitmapStore>, keys: KeyBuilder, max_identifier: Identifier) -> Self {
        Self {
            store,
            keys,
            max_identifier,
        }
    }

    /// Combine `sources` with `operator` and persist the result
    ///
    /// XOR over more than two sources keeps identifiers present in an odd
    /// number of them.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `sources` is empty; `Connection` if BITOP fails.
    pub async fn combine(
        &self,
        operator: BitOperator,
        sources: &[&dyn Bucket],
    ) -> Result<DerivedBucket> {
        if sources.is_empty() {
            return Err(Error::invalid_argument(format!(
                "{} needs at least one source bucket",
                operator
            )));
        }

        let source_keys: Vec<String> = sources.iter().map(|b| b.key().to_string()).collect();
        let dest = self.keys.build_temp_key(operator, &source_keys)?;

        let len = match self.store.bit_op(operator, &dest, &source_keys).await {
            Ok(len) => len,
            Err(e) => {
                warn!(operator = %operator, dest = %dest, "Bit operation failed: {}", e);
                return Err(e);
            },
        };

        debug!(
            operator = %operator,
            sources = source_keys.len(),
            dest = %dest,
            bytes = len,
            "Bit operation stored"
        );

        Ok(DerivedBucket {
            operator,
            source_keys,
            bitmap: Bitmap::new(self.store.clone(), dest, self.max_identifier),
        })
    }

    /// Combine with an operator given by name (`"AND"`, `"or"`, ...)
    pub async fn combine_named(&self, operator: &str, sources: &[&dyn Bucket]) -> Result<DerivedBucket> {
        let operator = operator.parse::<BitOperator>()?;
        self.combine(operator, sources).await
    }

    /// Remove every temporary key; returns how many were removed
    pub async fn delete_temporary_keys(&self) -> Result<u64> {
        let removed = self.store.delete_matching(&self.keys.temp_pattern()).await?;
        info!(removed, "Deleted temporary bit operation keys");
        Ok(removed)
    }
}
