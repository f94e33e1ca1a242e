//! Bitmap store abstraction
//!
//! The analytics core only needs a handful of bit-level commands from its
//! backend. [`BitmapStore`] is that seam; the crate ships two backends:
//!
//! - [`RedisBitmapStore`](crate::redis::RedisBitmapStore) for production
//! - [`InMemoryBitmapStore`] for tests and single-process use
//!
//! Every method is a single store command except [`BitmapStore::set_bits`],
//! which sends its writes as one non-transactional batch.

pub mod memory;

pub use memory::InMemoryBitmapStore;

use crate::error::Result;
use crate::types::{BitOperator, Identifier};
use async_trait::async_trait;

/// One bit write in a batch: set `offset` of `key` to 1
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitWrite {
    /// Target key
    pub key: String,
    /// Bit offset
    pub offset: Identifier,
}

impl BitWrite {
    /// Create a bit write
    pub fn new(key: impl Into<String>, offset: Identifier) -> Self {
        Self {
            key: key.into(),
            offset,
        }
    }
}

/// Key-value store with bit-addressable string values
#[async_trait]
pub trait BitmapStore: Send + Sync + 'static {
    /// Unique identifier for this store backend
    fn store_id(&self) -> &str;

    /// SETBIT key offset 1; returns the previous bit value
    async fn set_bit(&self, key: &str, offset: Identifier) -> Result<bool>;

    /// SETBIT for every write, sent as one batch
    ///
    /// Each write is atomic on its own; the batch is not. If the batch fails
    /// part way, some writes may already be applied.
    async fn set_bits(&self, writes: &[BitWrite]) -> Result<()>;

    /// GETBIT key offset; an absent key reads as 0
    async fn get_bit(&self, key: &str, offset: Identifier) -> Result<bool>;

    /// BITCOUNT key; an absent key counts 0
    async fn bit_count(&self, key: &str) -> Result<u64>;

    /// BITOP operator dest sources...; returns the length of the result in bytes
    async fn bit_op(&self, operator: BitOperator, dest: &str, sources: &[String]) -> Result<u64>;

    /// EXISTS key
    async fn exists(&self, key: &str) -> Result<bool>;

    /// DEL keys...; returns how many keys were removed
    async fn delete(&self, keys: &[String]) -> Result<u64>;

    /// All keys matching a glob pattern
    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>>;

    /// Remove every key matching a glob pattern; returns how many were removed
    async fn delete_matching(&self, pattern: &str) -> Result<u64> {
        let keys = self.keys_matching(pattern).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        self.delete(&keys).await
    }
}
