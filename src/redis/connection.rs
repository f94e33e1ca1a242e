//! Shared Redis connection for the bitmap store
//!
//! One multiplexed connection carries every command; Redis pipelines them
//! over a single socket. A semaphore caps how many commands are in flight.
//!
//! - Connect timeout only; commands themselves are not timed out
//! - A dropped connection is discarded and re-dialled on the next command
//! - Commands are never retried; the caller decides what to do on failure
//!
//! # Example
//!
//! ```rust,no_run
//! use bitanalytics::redis::{RedisConfig, RedisPool};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = RedisPool::new(RedisConfig::with_url("redis://localhost:6379").pool_size(8)).await?;
//! let status = pool.health_check().await;
//! println!("{:?} after {} commands", status, pool.metrics().commands_executed);
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use redis::aio::MultiplexedConnection;
use redis::{Client, RedisError};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, RwLock, Semaphore};
use tracing::{debug, warn};

use super::util::{describe_target, error_kind_name, redis_failure};

/// Largest accepted `pool_size`
const MAX_IN_FLIGHT: u32 = 1000;

/// PING slower than this reports [`HealthStatus::Degraded`]
const DEGRADED_PING: Duration = Duration::from_millis(100);

/// Redis connection settings
#[derive(Clone, Debug)]
pub struct RedisConfig {
    /// `redis://` or `rediss://` URL, credentials allowed
    pub url: String,

    /// Commands allowed in flight at once (default 16)
    pub pool_size: u32,

    /// Time allowed to establish the connection (default 5s)
    pub connection_timeout: Duration,

    /// `COUNT` hint for SCAN and batch size for DEL (default 500)
    pub scan_count: usize,

    /// Connect over TLS; needs the `redis-tls` feature and a `rediss://` URL
    pub tls_enabled: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            pool_size: 16,
            connection_timeout: Duration::from_secs(5),
            scan_count: 500,
            tls_enabled: false,
        }
    }
}

impl RedisConfig {
    /// Defaults with `url`
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Commands allowed in flight at once
    pub fn pool_size(mut self, size: u32) -> Self {
        self.pool_size = size;
        self
    }

    /// Connect timeout
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// SCAN `COUNT` hint and DEL batch size
    pub fn scan_count(mut self, count: usize) -> Self {
        self.scan_count = count;
        self
    }

    /// TLS on or off
    pub fn tls(mut self, enabled: bool) -> Self {
        self.tls_enabled = enabled;
        self
    }

    /// Check settings before dialling; the message names the bad setting
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.url.trim().is_empty() {
            return Err("redis.url is empty".to_string());
        }
        if !(1..=MAX_IN_FLIGHT).contains(&self.pool_size) {
            return Err(format!(
                "redis.pool_size {} is out of range [1, {}]",
                self.pool_size, MAX_IN_FLIGHT
            ));
        }
        if self.scan_count == 0 {
            return Err("redis.scan_count must be at least 1".to_string());
        }
        if cfg!(not(feature = "redis-tls")) && self.tls_enabled {
            return Err(
                "redis.tls_enabled needs the crate built with the 'redis-tls' feature".to_string(),
            );
        }
        let secure_scheme = self.url.starts_with("rediss://");
        if self.tls_enabled != secure_scheme {
            return Err(format!(
                "redis.tls_enabled = {} does not match the URL scheme ({})",
                self.tls_enabled,
                if secure_scheme { "rediss://" } else { "redis://" }
            ));
        }
        Ok(())
    }
}

/// Counters updated by every command sent through the pool
#[derive(Debug, Default)]
struct PoolCounters {
    connects: AtomicU64,
    connect_failures: AtomicU64,
    commands: AtomicU64,
    command_failures: AtomicU64,
    latency_us: AtomicU64,
}

impl PoolCounters {
    fn connected(&self) {
        self.connects.fetch_add(1, Ordering::Relaxed);
    }

    fn connect_failed(&self) {
        self.connect_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn command_ok(&self, elapsed: Duration) {
        self.commands.fetch_add(1, Ordering::Relaxed);
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.latency_us.fetch_add(micros, Ordering::Relaxed);
    }

    fn command_failed(&self) {
        self.command_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> PoolMetricsSnapshot {
        let commands_executed = self.commands.load(Ordering::Relaxed);
        let latency = self.latency_us.load(Ordering::Relaxed);
        PoolMetricsSnapshot {
            connections_created: self.connects.load(Ordering::Relaxed),
            connection_failures: self.connect_failures.load(Ordering::Relaxed),
            commands_executed,
            command_failures: self.command_failures.load(Ordering::Relaxed),
            average_latency_us: match commands_executed {
                0 => 0.0,
                n => latency as f64 / n as f64,
            },
        }
    }
}

/// Point-in-time copy of the pool counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolMetricsSnapshot {
    /// Successful connects, including reconnects
    pub connections_created: u64,
    /// Failed or timed-out connects
    pub connection_failures: u64,
    /// Commands and pipelines that succeeded (a pipeline counts once)
    pub commands_executed: u64,
    /// Commands and pipelines that failed
    pub command_failures: u64,
    /// Mean latency of successful commands, in microseconds
    pub average_latency_us: f64,
}

/// Result of the last connect or health check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Connected and answering
    Healthy,
    /// Answering, but PING took longer than 100ms
    Degraded,
    /// Connection dropped or PING failed
    Unhealthy,
    /// Nothing checked yet
    Unknown,
}

/// Multiplexed Redis connection shared by all store commands
pub struct RedisPool {
    client: Client,
    /// `None` until connected, and again after the connection dropped
    connection: RwLock<Option<MultiplexedConnection>>,
    config: RedisConfig,
    counters: PoolCounters,
    in_flight: Arc<Semaphore>,
    health: RwLock<HealthStatus>,
}

impl RedisPool {
    /// Validate `config` and connect
    ///
    /// Fails with `Configuration` for bad settings and `Connection` if the
    /// server cannot be reached within the connect timeout.
    pub async fn new(config: RedisConfig) -> Result<Self> {
        config.validate().map_err(Error::Configuration)?;

        let client = Client::open(config.url.as_str())
            .map_err(|e| redis_failure(&config.url, "Invalid Redis URL", e))?;

        let pool = Self {
            client,
            connection: RwLock::new(None),
            in_flight: Arc::new(Semaphore::new(config.pool_size as usize)),
            config,
            counters: PoolCounters::default(),
            health: RwLock::new(HealthStatus::Unknown),
        };
        pool.connect().await?;

        debug!(
            target_addr = %describe_target(&pool.config.url),
            pool_size = pool.config.pool_size,
            "Redis pool ready"
        );
        Ok(pool)
    }

    /// Return the cached connection, dialling one if there is none
    ///
    /// The write lock is held across the dial so concurrent callers that
    /// found the cache empty share a single new connection.
    async fn connect(&self) -> Result<MultiplexedConnection> {
        let mut slot = self.connection.write().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }

        let conn = self.dial().await?;
        *slot = Some(conn.clone());
        drop(slot);

        *self.health.write().await = HealthStatus::Healthy;
        Ok(conn)
    }

    async fn dial(&self) -> Result<MultiplexedConnection> {
        let started = Instant::now();
        let dial = self.client.get_multiplexed_async_connection();

        match tokio::time::timeout(self.config.connection_timeout, dial).await {
            Ok(Ok(conn)) => {
                self.counters.connected();
                debug!(elapsed = ?started.elapsed(), "Connected to Redis");
                Ok(conn)
            },
            Ok(Err(e)) => {
                self.counters.connect_failed();
                Err(redis_failure(&self.config.url, "Redis connection failed", e))
            },
            Err(_) => {
                self.counters.connect_failed();
                Err(Error::connection(format!(
                    "Connecting to {} timed out after {:?}",
                    describe_target(&self.config.url),
                    self.config.connection_timeout
                )))
            },
        }
    }

    /// Wait for an in-flight slot and hand out the shared connection
    ///
    /// Re-dials once if the previous connection was dropped. The slot is
    /// freed when the returned guard is dropped.
    pub async fn get(&self) -> Result<PooledConnection> {
        let permit = self
            .in_flight
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::connection("Redis pool is closed"))?;

        let cached = self.connection.read().await.clone();
        let conn = match cached {
            Some(conn) => conn,
            None => self.connect().await?,
        };
        Ok(PooledConnection {
            conn,
            _permit: permit,
        })
    }

    /// Run one command or pipeline; `context` names it in errors and logs
    ///
    /// A dropped connection is forgotten so the next call re-dials. The
    /// failed command is not re-sent.
    pub async fn execute<F, Fut, T>(&self, context: &str, command: F) -> Result<T>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: Future<Output = std::result::Result<T, RedisError>>,
    {
        let guard = self.get().await?;
        let started = Instant::now();

        let outcome = command(guard.conn.clone()).await;
        drop(guard);

        match outcome {
            Ok(value) => {
                self.counters.command_ok(started.elapsed());
                Ok(value)
            },
            Err(e) => {
                self.counters.command_failed();
                if e.is_connection_dropped() || e.is_io_error() {
                    self.connection.write().await.take();
                    *self.health.write().await = HealthStatus::Unhealthy;
                }
                warn!(command = context, kind = error_kind_name(&e), "Redis command failed");
                Err(redis_failure(&self.config.url, context, e))
            },
        }
    }

    /// PING the server and record the outcome
    pub async fn health_check(&self) -> HealthStatus {
        let started = Instant::now();
        let pong = self
            .execute("PING", |mut conn| async move {
                redis::cmd("PING").query_async::<String>(&mut conn).await
            })
            .await;

        let status = match pong {
            Err(_) => HealthStatus::Unhealthy,
            Ok(_) if started.elapsed() > DEGRADED_PING => HealthStatus::Degraded,
            Ok(_) => HealthStatus::Healthy,
        };
        *self.health.write().await = status;
        status
    }

    /// Last recorded health, or `Unknown` while a check is updating it
    pub fn health_status(&self) -> HealthStatus {
        self.health
            .try_read()
            .map(|status| *status)
            .unwrap_or(HealthStatus::Unknown)
    }

    /// Counter snapshot
    pub fn metrics(&self) -> PoolMetricsSnapshot {
        self.counters.snapshot()
    }

    /// Settings in use
    pub fn config(&self) -> &RedisConfig {
        &self.config
    }
}

/// The shared connection plus an in-flight slot
pub struct PooledConnection {
    conn: MultiplexedConnection,
    _permit: OwnedSemaphorePermit,
}

impl std::ops::Deref for PooledConnection {
    type Target = MultiplexedConnection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl std::ops::DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}
