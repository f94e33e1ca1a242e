//! Error types for bitmap analytics

use thiserror::Error;

/// Main error type for the crate
///
/// Absent keys are never an error: a missing bucket reads as an empty
/// bitmap (`count() == 0`, `is_present() == false`, `exists() == false`).
#[derive(Error, Debug)]
pub enum Error {
    /// Store unreachable or a store command failed
    ///
    /// The message never contains credentials; the original client error is
    /// kept as the error source.
    #[error("Connection error: {message}")]
    Connection {
        /// Credential-safe description of the failure
        message: String,
        /// Underlying Redis client error, if the failure came from Redis
        #[source]
        source: Option<redis::RedisError>,
    },

    /// Caller supplied an argument the key scheme or store cannot accept
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error (configuration files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a connection error without an underlying client error
    pub fn connection(message: impl Into<String>) -> Self {
        Error::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Build a connection error that wraps a Redis client error
    pub fn from_redis(message: impl Into<String>, source: redis::RedisError) -> Self {
        Error::Connection {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Build an invalid-argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }

    /// True if the store could not be reached or rejected a command
    pub fn is_connection(&self) -> bool {
        matches!(self, Error::Connection { .. })
    }

    /// True if the caller passed an invalid argument
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Error::InvalidArgument(_))
    }
}

/// Validation errors for configuration values
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Value is out of allowed range
    #[error("{field} value {value} is out of range [{min}, {max}]")]
    OutOfRange {
        /// Field name being validated
        field: String,
        /// The invalid value
        value: String,
        /// Minimum allowed value
        min: String,
        /// Maximum allowed value
        max: String,
    },

    /// Invalid format
    #[error("Invalid format for {field}: {message}")]
    InvalidFormat {
        /// Field name being validated
        field: String,
        /// Description of the format error
        message: String,
    },
}

impl From<ValidationError> for Error {
    fn from(e: ValidationError) -> Self {
        Error::Configuration(e.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
