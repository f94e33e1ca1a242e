//! Storage key scheme
//!
//! ```text
//! {prefix}_{event}_{year}-{month}                   month bucket
//! {prefix}_{event}_W{iso_year}-{iso_week}           ISO week bucket
//! {prefix}_{event}_{year}-{month}-{day}             day bucket
//! {prefix}_{event}_{year}-{month}-{day}-{hour}      hour bucket
//! {prefix}_bitop_{OP}_{source1}-{source2}-...       derived (temporary) bucket
//! ```
//!
//! Time suffixes never contain the `_` delimiter and event names may not
//! either, so the last `_` of an event key always separates event name and
//! suffix.

use crate::error::{Error, Result};
use crate::types::{BitOperator, TimeBucket};

/// Default key prefix
pub const DEFAULT_PREFIX: &str = "bitanalytics";

/// Separator between prefix, event name and time suffix
pub const KEY_DELIMITER: char = '_';

/// Namespace segment of temporary keys written by bit operations
pub const BITOP_SEGMENT: &str = "bitop";

const GLOB_METACHARACTERS: [char; 4] = ['*', '?', '[', ']'];

/// Builds storage keys for event and derived buckets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBuilder {
    prefix: String,
}

impl Default for KeyBuilder {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }
}

impl KeyBuilder {
    /// Create a key builder with a custom prefix
    ///
    /// The prefix is used in glob patterns for cleanup, so it may not contain
    /// glob metacharacters or the key delimiter.
    pub fn new(prefix: impl Into<String>) -> Result<Self> {
        let prefix = prefix.into();
        validate_prefix(&prefix)?;
        Ok(Self { prefix })
    }

    /// The configured prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Key of the bucket for `event_name` at `bucket`
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the event name is empty, contains `_`, is the
    /// reserved name `bitop`, or the time coordinate is invalid.
    pub fn build_key(&self, event_name: &str, bucket: &TimeBucket) -> Result<String> {
        validate_event_name(event_name)?;
        bucket.validate()?;
        Ok(format!(
            "{}{}{}{}{}",
            self.prefix,
            KEY_DELIMITER,
            event_name,
            KEY_DELIMITER,
            bucket.suffix()
        ))
    }

    /// Key of the derived bucket for `operator` over `source_keys`
    ///
    /// Sources are joined in the order given, so AND(a, b) and AND(b, a)
    /// land on different keys.
    pub fn build_temp_key<S: AsRef<str>>(
        &self,
        operator: BitOperator,
        source_keys: &[S],
    ) -> Result<String> {
        if source_keys.is_empty() {
            return Err(Error::invalid_argument(
                "bit operation needs at least one source bucket",
            ));
        }

        let joined = source_keys
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join("-");

        Ok(format!(
            "{}{}{}{}",
            self.temp_key_prefix(),
            operator.as_str(),
            KEY_DELIMITER,
            joined
        ))
    }

    /// Leading part shared by every temporary key, e.g. `bitanalytics_bitop_`
    pub fn temp_key_prefix(&self) -> String {
        format!(
            "{}{}{}{}",
            self.prefix, KEY_DELIMITER, BITOP_SEGMENT, KEY_DELIMITER
        )
    }

    /// Glob matching every key this builder can produce
    pub fn events_pattern(&self) -> String {
        format!("{}{}*", self.prefix, KEY_DELIMITER)
    }

    /// Glob matching only temporary bit-operation keys
    pub fn temp_pattern(&self) -> String {
        format!("{}*", self.temp_key_prefix())
    }

    /// True if `key` was produced by [`build_temp_key`](Self::build_temp_key)
    pub fn is_temp_key(&self, key: &str) -> bool {
        key.starts_with(&self.temp_key_prefix())
    }
}

/// Check an event name against the key scheme
pub fn validate_event_name(event_name: &str) -> Result<()> {
    if event_name.is_empty() {
        return Err(Error::invalid_argument("event name cannot be empty"));
    }
    if event_name.contains(KEY_DELIMITER) {
        return Err(Error::invalid_argument(format!(
            "event name '{}' contains the key delimiter '{}'",
            event_name, KEY_DELIMITER
        )));
    }
    if event_name == BITOP_SEGMENT {
        return Err(Error::invalid_argument(format!(
            "event name '{}' is reserved for bit operation results",
            BITOP_SEGMENT
        )));
    }
    Ok(())
}

fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() {
        return Err(Error::invalid_argument("key prefix cannot be empty"));
    }
    if prefix.contains(KEY_DELIMITER) || prefix.contains(GLOB_METACHARACTERS) {
        return Err(Error::invalid_argument(format!(
            "key prefix '{}' may not contain '{}' or glob metacharacters",
            prefix, KEY_DELIMITER
        )));
    }
    Ok(())
}
