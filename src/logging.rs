//! Tracing subscriber setup
//!
//! The library only emits `tracing` events; installing a subscriber is up to
//! the application. [`init_tracing`] is a convenience for binaries and tests.

use crate::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber
///
/// `RUST_LOG` takes precedence over `level`. Returns `false` if a global
/// subscriber was already installed, in which case nothing changes.
pub fn init_tracing(level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .is_ok()
}

/// Install a global fmt subscriber from the `[logging]` section
pub fn init_from_config(config: &LoggingConfig) -> bool {
    init_tracing(&config.log_level)
}
