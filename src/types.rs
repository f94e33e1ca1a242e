//! Core data types for bitmap analytics
//!
//! # Key Types
//!
//! - **`Granularity`**: time resolution of a bucket (hour, day, ISO week, month)
//! - **`TimeBucket`**: a validated time coordinate at one granularity
//! - **`BitOperator`**: AND / OR / XOR used to combine buckets
//! - **`Identifier`**: the bit offset an id is recorded at
//!
//! # Example
//!
//! ```rust
//! use bitanalytics::types::{Granularity, TimeBucket};
//! use chrono::{TimeZone, Utc};
//!
//! let at = Utc.with_ymd_and_hms(2014, 12, 29, 10, 0, 0).unwrap();
//!
//! // Calendar month and ISO week can disagree on the year
//! assert_eq!(TimeBucket::at(Granularity::Month, at).suffix(), "2014-12");
//! assert_eq!(TimeBucket::at(Granularity::Week, at).suffix(), "W2015-01");
//! ```

use crate::error::{Error, Result};
use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier recorded in a bucket; used directly as the bit offset
pub type Identifier = u64;

/// Largest bit offset Redis accepts for SETBIT/GETBIT (2^32 - 1)
///
/// A bitmap holding this offset occupies 512 MiB.
pub const MAX_BIT_OFFSET: Identifier = u32::MAX as Identifier;

/// Largest calendar year accepted in a time coordinate
pub const MAX_YEAR: i32 = 9999;

/// Reject identifiers above the configured limit before they reach the store
pub fn check_identifier(identifier: Identifier, max_identifier: Identifier) -> Result<()> {
    if identifier > max_identifier {
        return Err(Error::invalid_argument(format!(
            "identifier {} exceeds maximum {}",
            identifier, max_identifier
        )));
    }
    Ok(())
}

/// Time resolution of an event bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// One bucket per UTC hour
    Hour,
    /// One bucket per UTC calendar day
    Day,
    /// One bucket per ISO-8601 week
    Week,
    /// One bucket per calendar month
    Month,
}

impl Granularity {
    /// All granularities, finest first
    pub const ALL: [Granularity; 4] = [
        Granularity::Hour,
        Granularity::Day,
        Granularity::Week,
        Granularity::Month,
    ];

    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Hour => "hour",
            Granularity::Day => "day",
            Granularity::Week => "week",
            Granularity::Month => "month",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated time coordinate at one granularity
///
/// Weekly buckets use the ISO year, which differs from the calendar year for
/// the first and last days of some years.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeBucket {
    /// Calendar month
    Month {
        /// Calendar year
        year: i32,
        /// Month, 1-12
        month: u32,
    },
    /// ISO-8601 week
    Week {
        /// ISO week-numbering year
        iso_year: i32,
        /// ISO week, 1-53
        week: u32,
    },
    /// Calendar day
    Day {
        /// Calendar year
        year: i32,
        /// Month, 1-12
        month: u32,
        /// Day of month
        day: u32,
    },
    /// Hour of a calendar day (UTC)
    Hour {
        /// Calendar year
        year: i32,
        /// Month, 1-12
        month: u32,
        /// Day of month
        day: u32,
        /// Hour, 0-23
        hour: u32,
    },
}

impl TimeBucket {
    /// Monthly coordinate
    pub fn month(year: i32, month: u32) -> Result<Self> {
        check_year(year)?;
        if !(1..=12).contains(&month) {
            return Err(Error::invalid_argument(format!(
                "month {} is out of range [1, 12]",
                month
            )));
        }
        Ok(TimeBucket::Month { year, month })
    }

    /// ISO-week coordinate
    pub fn week(iso_year: i32, week: u32) -> Result<Self> {
        check_year(iso_year)?;
        // Rejects week 53 in years with only 52 ISO weeks
        if NaiveDate::from_isoywd_opt(iso_year, week, Weekday::Mon).is_none() {
            return Err(Error::invalid_argument(format!(
                "ISO week {} does not exist in {}",
                week, iso_year
            )));
        }
        Ok(TimeBucket::Week { iso_year, week })
    }

    /// Daily coordinate
    pub fn day(year: i32, month: u32, day: u32) -> Result<Self> {
        check_date(year, month, day)?;
        Ok(TimeBucket::Day { year, month, day })
    }

    /// Hourly coordinate
    pub fn hour(year: i32, month: u32, day: u32, hour: u32) -> Result<Self> {
        check_date(year, month, day)?;
        if hour > 23 {
            return Err(Error::invalid_argument(format!(
                "hour {} is out of range [0, 23]",
                hour
            )));
        }
        Ok(TimeBucket::Hour {
            year,
            month,
            day,
            hour,
        })
    }

    /// Coordinate containing `at` at the given granularity
    pub fn at(granularity: Granularity, at: DateTime<Utc>) -> Self {
        match granularity {
            Granularity::Month => TimeBucket::Month {
                year: at.year(),
                month: at.month(),
            },
            Granularity::Week => {
                let iso = at.iso_week();
                TimeBucket::Week {
                    iso_year: iso.year(),
                    week: iso.week(),
                }
            },
            Granularity::Day => TimeBucket::Day {
                year: at.year(),
                month: at.month(),
                day: at.day(),
            },
            Granularity::Hour => TimeBucket::Hour {
                year: at.year(),
                month: at.month(),
                day: at.day(),
                hour: at.hour(),
            },
        }
    }

    /// Granularity of this coordinate
    pub fn granularity(&self) -> Granularity {
        match self {
            TimeBucket::Month { .. } => Granularity::Month,
            TimeBucket::Week { .. } => Granularity::Week,
            TimeBucket::Day { .. } => Granularity::Day,
            TimeBucket::Hour { .. } => Granularity::Hour,
        }
    }

    /// Key suffix for this coordinate
    ///
    /// Calendar parts are unpadded; the ISO week is two digits behind a `W`
    /// marker so it never reads as a month.
    pub fn suffix(&self) -> String {
        match *self {
            TimeBucket::Month { year, month } => format!("{}-{}", year, month),
            TimeBucket::Week { iso_year, week } => format!("W{}-{:02}", iso_year, week),
            TimeBucket::Day { year, month, day } => format!("{}-{}-{}", year, month, day),
            TimeBucket::Hour {
                year,
                month,
                day,
                hour,
            } => format!("{}-{}-{}-{}", year, month, day, hour),
        }
    }

    /// Validate a coordinate built directly from its variant fields
    pub fn validate(&self) -> Result<()> {
        match *self {
            TimeBucket::Month { year, month } => TimeBucket::month(year, month).map(|_| ()),
            TimeBucket::Week { iso_year, week } => TimeBucket::week(iso_year, week).map(|_| ()),
            TimeBucket::Day { year, month, day } => TimeBucket::day(year, month, day).map(|_| ()),
            TimeBucket::Hour {
                year,
                month,
                day,
                hour,
            } => TimeBucket::hour(year, month, day, hour).map(|_| ()),
        }
    }
}

impl fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.granularity(), self.suffix())
    }
}

fn check_year(year: i32) -> Result<()> {
    if !(0..=MAX_YEAR).contains(&year) {
        return Err(Error::invalid_argument(format!(
            "year {} is out of range [0, {}]",
            year, MAX_YEAR
        )));
    }
    Ok(())
}

fn check_date(year: i32, month: u32, day: u32) -> Result<()> {
    check_year(year)?;
    if NaiveDate::from_ymd_opt(year, month, day).is_none() {
        return Err(Error::invalid_argument(format!(
            "{}-{}-{} is not a calendar date",
            year, month, day
        )));
    }
    Ok(())
}

/// Bitwise operator applied across buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BitOperator {
    /// Present in every source
    And,
    /// Present in at least one source
    Or,
    /// Present in an odd number of sources
    Xor,
}

impl BitOperator {
    /// Operator name as sent to BITOP and embedded in temporary keys
    pub fn as_str(&self) -> &'static str {
        match self {
            BitOperator::And => "AND",
            BitOperator::Or => "OR",
            BitOperator::Xor => "XOR",
        }
    }

    /// Apply the operator to one byte of each operand
    pub fn apply(&self, a: u8, b: u8) -> u8 {
        match self {
            BitOperator::And => a & b,
            BitOperator::Or => a | b,
            BitOperator::Xor => a ^ b,
        }
    }
}

impl fmt::Display for BitOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BitOperator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AND" => Ok(BitOperator::And),
            "OR" => Ok(BitOperator::Or),
            "XOR" => Ok(BitOperator::Xor),
            "" => Err(Error::invalid_argument("bit operator cannot be empty")),
            other => Err(Error::invalid_argument(format!(
                "unsupported bit operator '{}' (expected AND, OR or XOR)",
                other
            ))),
        }
    }
}
