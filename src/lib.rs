//! Bitanalytics - Bitmap event analytics on Redis
//!
//! This library tracks which integer identifiers performed which named
//! events, bucketed by time:
//! - One bitmap per (event, month / ISO week / day / hour), one bit per identifier
//! - Single round trip marking of every granularity
//! - AND / OR / XOR combinations of buckets, nestable
//! - Pluggable bitmap store (Redis, in-memory)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bitop;
pub mod bucket;
pub mod error;
pub mod keys;
pub mod recorder;
pub mod store;
pub mod types;

/// High-level analytics facade
pub mod analytics;

/// Configuration management with TOML support
pub mod config;

/// Tracing subscriber setup
pub mod logging;

/// Redis bitmap store
/// Provides a SETBIT/BITOP based store over a shared multiplexed connection
pub mod redis;

// Re-export main types
pub use analytics::BitAnalytics;
pub use bitop::{BitOperationEngine, DerivedBucket};
pub use bucket::{Bucket, EventBucket};
pub use config::Config;
pub use error::{Error, Result};
pub use keys::KeyBuilder;
pub use recorder::EventRecorder;
pub use store::{BitmapStore, InMemoryBitmapStore};
pub use types::{BitOperator, Granularity, Identifier, TimeBucket};
