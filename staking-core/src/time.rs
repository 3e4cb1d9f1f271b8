//! Block-derived timestamps
//!
//! [`TimePoint`] counts microseconds since the Unix epoch. The host clock
//! must never move backwards between consecutive actions; the engine
//! rejects any action whose timestamp precedes the previous one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Seconds in one day
pub const SECONDS_PER_DAY: i64 = 24 * 3600;

/// Seconds in one week
pub const SECONDS_PER_WEEK: i64 = 7 * SECONDS_PER_DAY;

const MICROS_PER_SECOND: i64 = 1_000_000;

/// Point in time with microsecond resolution
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TimePoint(i64);

impl TimePoint {
    /// Sentinel that never arrives (savings bucket key)
    pub const MAX: TimePoint = TimePoint(i64::MAX);

    /// From microseconds since epoch
    pub const fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    /// From whole seconds since epoch
    pub const fn from_secs(secs: i64) -> Self {
        Self(secs.saturating_mul(MICROS_PER_SECOND))
    }

    /// Microseconds since epoch
    pub fn micros(&self) -> i64 {
        self.0
    }

    /// Whole seconds since epoch
    pub fn secs(&self) -> i64 {
        self.0.div_euclid(MICROS_PER_SECOND)
    }

    /// Midnight (UTC) of the day containing this point
    pub fn start_of_day(&self) -> TimePoint {
        let secs = self.secs();
        TimePoint::from_secs(secs - secs.rem_euclid(SECONDS_PER_DAY))
    }

    /// Shift by whole seconds, saturating at the sentinel
    pub fn plus_secs(&self, secs: i64) -> TimePoint {
        TimePoint(self.0.saturating_add(secs.saturating_mul(MICROS_PER_SECOND)))
    }

    /// Shift by whole days
    pub fn plus_days(&self, days: i64) -> TimePoint {
        self.plus_secs(days.saturating_mul(SECONDS_PER_DAY))
    }

    /// UTC date-time, if representable
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_micros(self.0)
    }
}

impl fmt::Display for TimePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == TimePoint::MAX {
            return write!(f, "never");
        }
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S%.6fZ")),
            None => write!(f, "{}us", self.0),
        }
    }
}
