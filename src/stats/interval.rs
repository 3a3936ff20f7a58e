//! Adaptive bucket-width selection for timelines
//!
//! Chooses a histogram interval so that a time span splits into roughly the
//! requested number of buckets, snapped to whole days, hours or minutes.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

const MINUTE_MS: i128 = 60_000;
const HOUR_MS: i128 = 60 * MINUTE_MS;
const DAY_MS: i128 = 24 * HOUR_MS;

/// Unit an interval is expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntervalUnit {
    /// Whole minutes
    Minute,
    /// Whole hours
    Hour,
    /// Whole days
    Day,
}

impl IntervalUnit {
    /// Interval token suffix
    pub fn suffix(&self) -> &'static str {
        match self {
            IntervalUnit::Minute => "m",
            IntervalUnit::Hour => "h",
            IntervalUnit::Day => "d",
        }
    }

    fn millis(&self) -> i128 {
        match self {
            IntervalUnit::Minute => MINUTE_MS,
            IntervalUnit::Hour => HOUR_MS,
            IntervalUnit::Day => DAY_MS,
        }
    }
}

/// A histogram bucket width: `count` whole `unit`s
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BucketInterval {
    /// Unit of the width
    pub unit: IntervalUnit,
    /// Number of units, always >= 1
    pub count: i64,
}

impl BucketInterval {
    /// Create an interval, flooring `count` at one unit
    pub fn new(unit: IntervalUnit, count: i64) -> Self {
        Self {
            unit,
            count: count.max(1),
        }
    }

    /// Width of one bucket
    pub fn width(&self) -> Duration {
        Duration::milliseconds(self.width_ms())
    }

    /// Width of one bucket in milliseconds
    pub fn width_ms(&self) -> i64 {
        (self.unit.millis() as i64) * self.count
    }

    /// Backend interval token, e.g. `14m`, `3h`, `1d`
    pub fn label(&self) -> String {
        format!("{}{}", self.count, self.unit.suffix())
    }
}

impl fmt::Display for BucketInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Select the bucket interval for a time span
///
/// The raw width is `(utc_end - utc_start) / desired_points`. A raw width of
/// at least one day is expressed in days, at least one hour in hours, and
/// anything shorter in minutes. Both thresholds are inclusive: a raw width of
/// exactly one day selects `1d` and exactly one hour selects `1h`. The raw
/// width is rounded to the nearest whole unit (ties to even) and never drops
/// below one unit, so zero-length and inverted spans yield `1m`.
///
/// A `desired_points` of zero is treated as one.
///
/// # Example
///
/// ```rust
/// use chrono::{Duration, TimeZone, Utc};
/// use event_stats::stats::interval::select_interval;
///
/// let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
/// assert_eq!(select_interval(start, start + Duration::hours(24), 100).label(), "14m");
/// assert_eq!(select_interval(start, start + Duration::days(10), 10).label(), "1d");
/// ```
pub fn select_interval(
    utc_start: DateTime<Utc>,
    utc_end: DateTime<Utc>,
    desired_points: u32,
) -> BucketInterval {
    let span_ms = (utc_end - utc_start).num_milliseconds().max(0) as i128;
    let points = desired_points.max(1) as i128;

    // Compare span / points against each unit without losing the fraction
    let unit = if span_ms >= DAY_MS * points {
        IntervalUnit::Day
    } else if span_ms >= HOUR_MS * points {
        IntervalUnit::Hour
    } else {
        IntervalUnit::Minute
    };

    let count = round_half_even(span_ms, points * unit.millis());
    BucketInterval::new(unit, count as i64)
}

/// Round `numerator / denominator` to the nearest integer, ties to even
fn round_half_even(numerator: i128, denominator: i128) -> i128 {
    let quotient = numerator / denominator;
    let twice_remainder = 2 * (numerator % denominator);

    if twice_remainder > denominator || (twice_remainder == denominator && quotient % 2 == 1) {
        quotient + 1
    } else {
        quotient
    }
}
