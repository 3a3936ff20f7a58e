//! Typed statistics reports
//!
//! Every instant in these structures has already been shifted by the
//! request's display offset.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Counts for one timeline bucket
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineItem {
    /// Bucket start, offset applied
    pub date: DateTime<Utc>,
    /// Events in the bucket
    pub total: u64,
    /// Distinct stacks in the bucket (estimate)
    pub unique: u64,
    /// First occurrences in the bucket
    pub new: u64,
}

/// Statistics for one term value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TermStatsItem {
    /// Term value
    pub term: String,
    /// Events carrying the term
    pub total: u64,
    /// Distinct stacks carrying the term (estimate)
    pub unique: u64,
    /// First occurrences carrying the term
    pub new: u64,
    /// Earliest event, when the term's timeline is non-empty
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_occurrence: Option<DateTime<Utc>>,
    /// Latest event, when the term's timeline is non-empty
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_occurrence: Option<DateTime<Utc>>,
    /// Per-bucket counts, ascending
    pub timeline: Vec<TimelineItem>,
}

/// Occurrence statistics report
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventStatsResult {
    /// Matching events
    pub total: u64,
    /// Distinct stacks (estimate)
    pub unique: u64,
    /// First occurrences
    pub new: u64,
    /// Per-bucket counts, ascending
    pub timeline: Vec<TimelineItem>,
    /// Start of the reported span
    pub start: DateTime<Utc>,
    /// End of the reported span
    pub end: DateTime<Utc>,
    /// `total` divided by the span in hours; 0 for an empty span
    pub avg_per_hour: f64,
    /// Earliest matching event, when the timeline is non-empty
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_occurrence: Option<DateTime<Utc>>,
    /// Latest matching event, when the timeline is non-empty
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_occurrence: Option<DateTime<Utc>>,
}

/// Term statistics report
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTermStatsResult {
    /// Matching events across all terms
    pub total: u64,
    /// Terms in backend ranking order
    pub terms: Vec<TermStatsItem>,
    /// Effective start, offset applied
    pub start: DateTime<Utc>,
    /// Effective end, offset applied
    pub end: DateTime<Utc>,
}
