//! Redis implementation of [`BitmapStore`]
//!
//! | Operation        | Redis                                   |
//! |------------------|-----------------------------------------|
//! | `set_bit`        | `SETBIT key offset 1`                   |
//! | `set_bits`       | pipelined `SETBIT`s (no MULTI/EXEC)     |
//! | `get_bit`        | `GETBIT key offset`                     |
//! | `bit_count`      | `BITCOUNT key`                          |
//! | `bit_op`         | `BITOP op dest src...`                  |
//! | `exists`         | `EXISTS key`                            |
//! | `delete`         | `DEL key...` in batches of `scan_count` |
//! | `keys_matching`  | `SCAN cursor MATCH pattern COUNT n`     |
//!
//! Key listing uses incremental `SCAN` rather than `KEYS`, so cleanup does
//! not block the server on large keyspaces. Keys created while a scan is in
//! progress may or may not be returned.

use super::connection::{HealthStatus, PoolMetricsSnapshot, RedisConfig, RedisPool};
use crate::error::Result;
use crate::store::{BitWrite, BitmapStore};
use crate::types::{BitOperator, Identifier};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Bitmap store backed by Redis strings
pub struct RedisBitmapStore {
    pool: Arc<RedisPool>,
}

impl RedisBitmapStore {
    /// Connect to Redis and create the store
    pub async fn new(config: RedisConfig) -> Result<Self> {
        let pool = Arc::new(RedisPool::new(config).await?);
        info!("Redis bitmap store initialized");
        Ok(Self { pool })
    }

    /// Create a store on an existing pool
    pub fn from_pool(pool: Arc<RedisPool>) -> Self {
        Self { pool }
    }

    /// Underlying connection pool
    pub fn pool(&self) -> &RedisPool {
        &self.pool
    }

    /// PING the server and update the pool health status
    pub async fn health_check(&self) -> HealthStatus {
        self.pool.health_check().await
    }

    /// Pool metrics snapshot
    pub fn metrics(&self) -> PoolMetricsSnapshot {
        self.pool.metrics()
    }

    fn batch_size(&self) -> usize {
        self.pool.config().scan_count.max(1)
    }
}

#[async_trait]
impl BitmapStore for RedisBitmapStore {
    fn store_id(&self) -> &str {
        "redis-bitmap-v1"
    }

    async fn set_bit(&self, key: &str, offset: Identifier) -> Result<bool> {
        let key = key.to_string();
        self.pool
            .execute("SETBIT", move |mut conn| async move {
                redis::cmd("SETBIT")
                    .arg(key)
                    .arg(offset)
                    .arg(1)
                    .query_async::<bool>(&mut conn)
                    .await
            })
            .await
    }

    async fn set_bits(&self, writes: &[BitWrite]) -> Result<()> {
        if writes.is_empty() {
            return Ok(());
        }

        // Plain pipeline: one round trip, no MULTI/EXEC
        let mut pipe = redis::pipe();
        for write in writes {
            pipe.cmd("SETBIT")
                .arg(&write.key)
                .arg(write.offset)
                .arg(1)
                .ignore();
        }

        self.pool
            .execute("SETBIT pipeline", move |mut conn| async move {
                pipe.query_async::<()>(&mut conn).await
            })
            .await?;

        debug!(writes = writes.len(), "Pipelined SETBIT batch applied");
        Ok(())
    }

    async fn get_bit(&self, key: &str, offset: Identifier) -> Result<bool> {
        let key = key.to_string();
        self.pool
            .execute("GETBIT", move |mut conn| async move {
                redis::cmd("GETBIT")
                    .arg(key)
                    .arg(offset)
                    .query_async::<bool>(&mut conn)
                    .await
            })
            .await
    }

    async fn bit_count(&self, key: &str) -> Result<u64> {
        let key = key.to_string();
        self.pool
            .execute("BITCOUNT", move |mut conn| async move {
                redis::cmd("BITCOUNT")
                    .arg(key)
                    .query_async::<u64>(&mut conn)
                    .await
            })
            .await
    }

    async fn bit_op(&self, operator: BitOperator, dest: &str, sources: &[String]) -> Result<u64> {
        let dest = dest.to_string();
        let sources = sources.to_vec();
        self.pool
            .execute("BITOP", move |mut conn| async move {
                redis::cmd("BITOP")
                    .arg(operator.as_str())
                    .arg(dest)
                    .arg(sources)
                    .query_async::<u64>(&mut conn)
                    .await
            })
            .await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.pool
            .execute("EXISTS", move |mut conn| async move {
                redis::cmd("EXISTS")
                    .arg(key)
                    .query_async::<bool>(&mut conn)
                    .await
            })
            .await
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        let mut removed = 0;
        for chunk in keys.chunks(self.batch_size()) {
            let chunk = chunk.to_vec();
            removed += self
                .pool
                .execute("DEL", move |mut conn| async move {
                    redis::cmd("DEL").arg(chunk).query_async::<u64>(&mut conn).await
                })
                .await?;
        }
        Ok(removed)
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>> {
        let count = self.batch_size();
        let mut cursor: u64 = 0;
        // SCAN may return a key more than once
        let mut keys = BTreeSet::new();

        loop {
            let pattern = pattern.to_string();
            let (next, batch) = self
                .pool
                .execute("SCAN", move |mut conn| async move {
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(pattern)
                        .arg("COUNT")
                        .arg(count)
                        .query_async::<(u64, Vec<String>)>(&mut conn)
                        .await
                })
                .await?;

            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(pattern, matched = keys.len(), "SCAN complete");
        Ok(keys.into_iter().collect())
    }
}
