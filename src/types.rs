//! Query types accepted by the statistics engine
//!
//! # Key Types
//!
//! - **`StatsQuery`**: time range, opaque filter, display offset and target
//!   data-point count for occurrence statistics
//! - **`TermStatsQuery`**: a `StatsQuery` broken down by one `TermField`
//! - **`TermField`**: the closed set of fields a term breakdown may use
//! - **`DisplayOffset`**: presentation-only shift applied to returned instants
//!
//! # Example
//!
//! ```rust
//! use chrono::{Duration, TimeZone, Utc};
//! use event_stats::types::{DisplayOffset, TermField, TermStatsQuery};
//!
//! let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
//! let query = TermStatsQuery::builder(start, start + Duration::days(7))
//!     .term("stack_id")
//!     .display_offset(DisplayOffset::from_minutes(-300).unwrap())
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(query.term, TermField::StackId);
//! assert_eq!(query.max_terms, 25);
//!
//! // Anything outside the whitelist is rejected up front
//! assert!(TermStatsQuery::builder(start, start).term("user_id").build().is_err());
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Default number of timeline buckets for occurrence statistics
pub const DEFAULT_OCCURRENCE_POINTS: u32 = 100;

/// Default number of timeline buckets per term for term statistics
pub const DEFAULT_TERM_POINTS: u32 = 10;

/// Default number of terms returned by term statistics
pub const DEFAULT_MAX_TERMS: u32 = 25;

/// Largest accepted display offset magnitude, in minutes (23:59)
const MAX_OFFSET_MINUTES: i64 = 24 * 60 - 1;

// ============================================================================
// Term Field
// ============================================================================

/// Fields a term breakdown may group by
///
/// This is a closed set: unknown field names fail with
/// [`Error::InvalidArgument`] when parsed, so an invalid breakdown can never
/// reach request composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermField {
    /// Owning organization identifier
    OrganizationId,
    /// Owning project identifier
    ProjectId,
    /// Stack (grouped error) identifier
    StackId,
    /// Free-form event tags (multi-valued)
    Tags,
}

impl TermField {
    /// Every accepted term field
    pub const ALL: [TermField; 4] = [
        TermField::OrganizationId,
        TermField::ProjectId,
        TermField::StackId,
        TermField::Tags,
    ];

    /// Document field name used by the backend
    pub fn as_str(&self) -> &'static str {
        match self {
            TermField::OrganizationId => "organization_id",
            TermField::ProjectId => "project_id",
            TermField::StackId => "stack_id",
            TermField::Tags => "tags",
        }
    }
}

impl fmt::Display for TermField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TermField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        TermField::ALL
            .iter()
            .copied()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| Error::invalid_argument(format!("Must be a valid term: '{}'", s)))
    }
}

// ============================================================================
// Display Offset
// ============================================================================

/// Presentation-only time shift, in whole minutes
///
/// Applied exactly once to every instant the engine returns. It never changes
/// which documents are queried; it is only forwarded to the backend as the
/// histogram time zone so buckets align to the viewer's local day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DisplayOffset {
    minutes: i64,
}

impl DisplayOffset {
    /// No shift
    pub const ZERO: DisplayOffset = DisplayOffset { minutes: 0 };

    /// Create an offset from signed minutes
    ///
    /// Fails with `InvalidArgument` beyond +/-23:59.
    pub fn from_minutes(minutes: i64) -> Result<Self> {
        if minutes.abs() > MAX_OFFSET_MINUTES {
            return Err(Error::invalid_argument(format!(
                "Display offset of {} minutes is out of range",
                minutes
            )));
        }
        Ok(Self { minutes })
    }

    /// Create an offset from signed hours
    pub fn from_hours(hours: i64) -> Result<Self> {
        Self::from_minutes(hours * 60)
    }

    /// Signed offset in minutes
    pub fn minutes(&self) -> i64 {
        self.minutes
    }

    /// Offset as a duration
    pub fn as_duration(&self) -> Duration {
        Duration::minutes(self.minutes)
    }

    /// Whether this offset shifts anything
    pub fn is_zero(&self) -> bool {
        self.minutes == 0
    }

    /// Shift a UTC instant into display time
    pub fn apply(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        instant + self.as_duration()
    }

    /// Backend time-zone token, `[+-]hh:mm`
    pub fn time_zone(&self) -> String {
        let sign = if self.minutes < 0 { '-' } else { '+' };
        let abs = self.minutes.abs();
        format!("{}{:02}:{:02}", sign, abs / 60, abs % 60)
    }
}

impl fmt::Display for DisplayOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.time_zone())
    }
}

impl FromStr for DisplayOffset {
    type Err = Error;

    /// Parse `hh:mm`, `+hh:mm` or `-hh:mm`
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::invalid_argument(format!("Invalid display offset '{}'", s));

        let trimmed = s.trim();
        let (negative, body) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };

        let (hours, minutes) = body.split_once(':').ok_or_else(invalid)?;
        let hours: i64 = hours.parse().map_err(|_| invalid())?;
        let minutes: i64 = minutes.parse().map_err(|_| invalid())?;
        if !(0..60).contains(&minutes) || hours < 0 {
            return Err(invalid());
        }

        let total = hours * 60 + minutes;
        Self::from_minutes(if negative { -total } else { total })
    }
}

// ============================================================================
// Queries
// ============================================================================

/// Occurrence statistics request
#[derive(Debug, Clone, PartialEq)]
pub struct StatsQuery {
    /// Start of the range, UTC
    pub utc_start: DateTime<Utc>,

    /// End of the range, UTC. Expected to be >= `utc_start`; not validated.
    pub utc_end: DateTime<Utc>,

    /// Opaque backend query string; `None` or blank means match all
    pub filter: Option<String>,

    /// Shift applied to every returned instant
    pub display_offset: DisplayOffset,

    /// Target number of timeline buckets
    pub desired_points: u32,
}

impl StatsQuery {
    /// Create a query over `[utc_start, utc_end]` with default settings
    pub fn new(utc_start: DateTime<Utc>, utc_end: DateTime<Utc>) -> Self {
        Self {
            utc_start,
            utc_end,
            filter: None,
            display_offset: DisplayOffset::ZERO,
            desired_points: DEFAULT_OCCURRENCE_POINTS,
        }
    }

    /// Set the opaque filter string
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Set the display offset
    pub fn with_display_offset(mut self, offset: DisplayOffset) -> Self {
        self.display_offset = offset;
        self
    }

    /// Set the target number of timeline buckets
    pub fn with_desired_points(mut self, points: u32) -> Self {
        self.desired_points = points;
        self
    }
}

/// Term statistics request
#[derive(Debug, Clone, PartialEq)]
pub struct TermStatsQuery {
    /// Range, filter, offset and per-term timeline resolution
    pub stats: StatsQuery,

    /// Field to break the statistics down by
    pub term: TermField,

    /// Maximum number of terms returned
    pub max_terms: u32,
}

impl TermStatsQuery {
    /// Create a term query with default settings
    pub fn new(utc_start: DateTime<Utc>, utc_end: DateTime<Utc>, term: TermField) -> Self {
        Self {
            stats: StatsQuery::new(utc_start, utc_end).with_desired_points(DEFAULT_TERM_POINTS),
            term,
            max_terms: DEFAULT_MAX_TERMS,
        }
    }

    /// Start a builder that accepts the term field by name
    pub fn builder(utc_start: DateTime<Utc>, utc_end: DateTime<Utc>) -> TermStatsQueryBuilder {
        TermStatsQueryBuilder::new(utc_start, utc_end)
    }
}

/// Builder for [`TermStatsQuery`]
///
/// Validation happens in [`build`](Self::build), so an invalid term name is
/// reported before anything is composed or sent.
#[derive(Debug, Clone)]
pub struct TermStatsQueryBuilder {
    stats: StatsQuery,
    term: Option<String>,
    max_terms: u32,
}

impl TermStatsQueryBuilder {
    /// Create a builder over `[utc_start, utc_end]`
    pub fn new(utc_start: DateTime<Utc>, utc_end: DateTime<Utc>) -> Self {
        Self {
            stats: StatsQuery::new(utc_start, utc_end).with_desired_points(DEFAULT_TERM_POINTS),
            term: None,
            max_terms: DEFAULT_MAX_TERMS,
        }
    }

    /// Set the term field by name
    pub fn term(mut self, name: &str) -> Self {
        self.term = Some(name.to_string());
        self
    }

    /// Set the opaque filter string
    pub fn filter(mut self, filter: &str) -> Self {
        self.stats.filter = Some(filter.to_string());
        self
    }

    /// Set the display offset
    pub fn display_offset(mut self, offset: DisplayOffset) -> Self {
        self.stats.display_offset = offset;
        self
    }

    /// Set the maximum number of terms
    pub fn max_terms(mut self, max: u32) -> Self {
        self.max_terms = max;
        self
    }

    /// Set the per-term timeline resolution
    pub fn desired_points(mut self, points: u32) -> Self {
        self.stats.desired_points = points;
        self
    }

    /// Build the query
    pub fn build(self) -> Result<TermStatsQuery> {
        let name = self
            .term
            .ok_or_else(|| Error::invalid_argument("Must be a valid term: none given"))?;
        let term = name.parse::<TermField>()?;

        if self.max_terms == 0 {
            return Err(Error::invalid_argument("max_terms must be > 0"));
        }

        Ok(TermStatsQuery {
            stats: self.stats,
            term,
            max_terms: self.max_terms,
        })
    }
}
