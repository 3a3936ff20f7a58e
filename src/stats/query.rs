//! Filter construction and partition planning
//!
//! Turns the caller's opaque filter string and UTC range into a
//! [`QueryPlan`]: a combined filter expression plus the partitions the
//! request must touch and the effective bounds it covers.
//!
//! # Example
//!
//! ```rust
//! use chrono::{Duration, TimeZone, Utc};
//! use event_stats::stats::partition::TimePartitionCatalog;
//! use event_stats::stats::query::{FilterExpr, QueryBuilder};
//!
//! let catalog = TimePartitionCatalog::monthly("events-v1-");
//! let start = Utc.with_ymd_and_hms(2024, 1, 20, 0, 0, 0).unwrap();
//!
//! let plan = QueryBuilder::new(&catalog, "date").build(
//!     Some("project_id:537650f3b77efe23a47914f4"),
//!     start,
//!     start + Duration::days(14),
//! );
//!
//! assert_eq!(plan.partitions, vec!["events-v1-202401", "events-v1-202402"]);
//! assert!(matches!(plan.filter, FilterExpr::And(ref parts) if parts.len() == 2));
//! ```

use chrono::{DateTime, Utc};
use tracing::debug;

use super::partition::{PartitionCatalog, PartitionId};

// ============================================================================
// Filter Expression
// ============================================================================

/// Predicate restricting which documents are aggregated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterExpr {
    /// Every document
    MatchAll,

    /// Backend query-string syntax, forwarded untouched
    QueryString(String),

    /// Inclusive timestamp bound
    DateRange {
        /// Timestamp field
        field: String,
        /// Lower bound, UTC
        start: DateTime<Utc>,
        /// Upper bound, UTC
        end: DateTime<Utc>,
    },

    /// Conjunction of sub-expressions
    And(Vec<FilterExpr>),
}

impl FilterExpr {
    /// Query-string expression; blank strings become `MatchAll`
    pub fn query_string(query: Option<&str>) -> Self {
        match query.map(str::trim) {
            Some(q) if !q.is_empty() => FilterExpr::QueryString(q.to_string()),
            _ => FilterExpr::MatchAll,
        }
    }

    /// Conjunction of `parts`, dropping `MatchAll` and flattening nested `And`
    pub fn and(parts: Vec<FilterExpr>) -> Self {
        let mut flat = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                FilterExpr::MatchAll => {}
                FilterExpr::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }

        match flat.len() {
            0 => FilterExpr::MatchAll,
            1 => flat.remove(0),
            _ => FilterExpr::And(flat),
        }
    }
}

// ============================================================================
// Query Plan
// ============================================================================

/// Filter, partitions and effective bounds for one stats request
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    /// Combined filter expression
    pub filter: FilterExpr,

    /// Partitions to search; may be empty
    pub partitions: Vec<PartitionId>,

    /// Effective lower bound, UTC
    pub effective_start: DateTime<Utc>,

    /// Effective upper bound, UTC
    pub effective_end: DateTime<Utc>,
}

// ============================================================================
// Query Builder
// ============================================================================

/// Builds [`QueryPlan`]s against a partition catalog
pub struct QueryBuilder<'a> {
    catalog: &'a dyn PartitionCatalog,
    timestamp_field: &'a str,
}

impl<'a> QueryBuilder<'a> {
    /// Create a builder bounding `timestamp_field`
    pub fn new(catalog: &'a dyn PartitionCatalog, timestamp_field: &'a str) -> Self {
        Self {
            catalog,
            timestamp_field,
        }
    }

    /// Plan a request over `[utc_start, utc_end]`
    ///
    /// The date bound uses the effective range reported by the catalog, so
    /// retention clamping is reflected in both the filter and the plan.
    pub fn build(
        &self,
        filter: Option<&str>,
        utc_start: DateTime<Utc>,
        utc_end: DateTime<Utc>,
    ) -> QueryPlan {
        let selection = self.catalog.partitions_overlapping(utc_start, utc_end);

        let filter = FilterExpr::and(vec![
            FilterExpr::query_string(filter),
            FilterExpr::DateRange {
                field: self.timestamp_field.to_string(),
                start: selection.effective_start,
                end: selection.effective_end,
            },
        ]);

        debug!(
            partitions = selection.partitions.len(),
            effective_start = %selection.effective_start,
            effective_end = %selection.effective_end,
            "Planned stats query"
        );

        QueryPlan {
            filter,
            partitions: selection.partitions,
            effective_start: selection.effective_start,
            effective_end: selection.effective_end,
        }
    }
}
