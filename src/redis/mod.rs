//! Redis backend for bitmap analytics
//!
//! Every bucket is a plain Redis string manipulated with the bit commands
//! (`SETBIT`, `GETBIT`, `BITCOUNT`, `BITOP`).
//!
//! ```text
//! Redis Schema:
//! bitanalytics_{event}_{Y}-{M}              month bitmap
//! bitanalytics_{event}_W{isoY}-{isoW}       ISO week bitmap
//! bitanalytics_{event}_{Y}-{M}-{D}          day bitmap
//! bitanalytics_{event}_{Y}-{M}-{D}-{H}      hour bitmap
//! bitanalytics_bitop_{OP}_{k1}-{k2}-...     bit operation result
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use bitanalytics::redis::{RedisBitmapStore, RedisConfig};
//! use bitanalytics::store::BitmapStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = RedisBitmapStore::new(RedisConfig::default()).await?;
//! assert_eq!(store.store_id(), "redis-bitmap-v1");
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod store;
pub mod util;

pub use connection::{HealthStatus, PoolMetricsSnapshot, RedisConfig, RedisPool};
pub use store::RedisBitmapStore;
