//! Backend-neutral aggregation request tree and its composer
//!
//! A request is an explicit tree of named, tagged aggregation nodes. Backend
//! adapters render or evaluate this tree; nothing here knows about a specific
//! search product.
//!
//! ```text
//! filtered: Filter(expr)
//! ├── timeline: DateHistogram(date, interval, tz)      (occurrence)
//! │   ├── tl_unique: Cardinality(stack_id)
//! │   └── tl_new: NewFlagSplit(is_first_occurrence)
//! ├── unique / new / first_occurrence / last_occurrence
//! └── terms: TermsHistogram(field, size)                (term stats)
//!     └── timeline, unique, new, first_occurrence, last_occurrence
//! ```

use super::interval::BucketInterval;
use super::partition::PartitionId;
use super::query::{FilterExpr, QueryPlan};
use crate::config::StatsConfig;
use crate::types::{DisplayOffset, TermField};

/// Aggregation node names shared by the composer and the assembler
pub mod names {
    /// Root filter node
    pub const FILTERED: &str = "filtered";
    /// Date histogram node
    pub const TIMELINE: &str = "timeline";
    /// Terms histogram node
    pub const TERMS: &str = "terms";
    /// Distinct-entity estimate
    pub const UNIQUE: &str = "unique";
    /// First-occurrence split
    pub const NEW: &str = "new";
    /// Distinct-entity estimate inside a timeline bucket
    pub const TL_UNIQUE: &str = "tl_unique";
    /// First-occurrence split inside a timeline bucket
    pub const TL_NEW: &str = "tl_new";
    /// Earliest timestamp
    pub const FIRST_OCCURRENCE: &str = "first_occurrence";
    /// Latest timestamp
    pub const LAST_OCCURRENCE: &str = "last_occurrence";
}

// ============================================================================
// Request Tree
// ============================================================================

/// Which end of a field's range a `MinMax` node reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extremum {
    /// Smallest value
    Min,
    /// Largest value
    Max,
}

/// Kind of an aggregation node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregationKind {
    /// Restrict child aggregations to matching documents
    Filter(FilterExpr),

    /// Fixed-width time buckets
    DateHistogram {
        /// Timestamp field
        field: String,
        /// Bucket width
        interval: BucketInterval,
        /// Minimum documents for a bucket to be returned (0 fills gaps)
        min_doc_count: u64,
        /// Time zone the buckets align to
        time_zone: DisplayOffset,
    },

    /// One bucket per distinct field value, ranked by document count
    TermsHistogram {
        /// Grouping field
        field: String,
        /// Maximum buckets returned
        size: u32,
        /// Minimum documents for a bucket to be returned
        min_doc_count: u64,
    },

    /// Approximate distinct count
    Cardinality {
        /// Counted field
        field: String,
        /// Count below which the estimate should be exact
        precision_threshold: u32,
    },

    /// Minimum or maximum of a timestamp field
    MinMax {
        /// Timestamp field
        field: String,
        /// Which extremum
        extremum: Extremum,
    },

    /// Split on the first-occurrence flag, keeping only the "new" bucket
    NewFlagSplit {
        /// Flag field
        field: String,
        /// Flag value dropped from the split
        exclude: String,
    },
}

/// A named node of the request tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregation {
    /// Name used to find this node's result
    pub name: String,
    /// What the node computes
    pub kind: AggregationKind,
    /// Sub-aggregations evaluated per bucket (or per filter)
    pub children: Vec<Aggregation>,
}

impl Aggregation {
    /// Create a leaf node
    pub fn new(name: &str, kind: AggregationKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            children: Vec::new(),
        }
    }

    /// Attach sub-aggregations
    pub fn with_children(mut self, children: Vec<Aggregation>) -> Self {
        self.children = children;
        self
    }

    /// Direct child by name
    pub fn child(&self, name: &str) -> Option<&Aggregation> {
        self.children.iter().find(|c| c.name == name)
    }
}

/// One complete request: target partitions plus the aggregation tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Partitions to search; unavailable ones are ignored by the backend
    pub partitions: Vec<PartitionId>,
    /// Top-level aggregations
    pub aggregations: Vec<Aggregation>,
}

impl SearchRequest {
    /// Find a node by its path of names from the root
    pub fn find(&self, path: &[&str]) -> Option<&Aggregation> {
        let (first, rest) = path.split_first()?;
        let mut node = self.aggregations.iter().find(|a| a.name == *first)?;
        for name in rest {
            node = node.child(name)?;
        }
        Some(node)
    }
}

// ============================================================================
// Composer
// ============================================================================

/// Builds the two request shapes from a query plan
pub struct RequestComposer<'a> {
    config: &'a StatsConfig,
}

impl<'a> RequestComposer<'a> {
    /// Create a composer using the configured field names
    pub fn new(config: &'a StatsConfig) -> Self {
        Self { config }
    }

    /// Occurrence statistics: filter -> timeline + filter-level reducers
    pub fn occurrence(
        &self,
        plan: &QueryPlan,
        interval: BucketInterval,
        offset: DisplayOffset,
    ) -> SearchRequest {
        let mut children = vec![self.timeline(interval, offset)];
        children.extend(self.reducers(names::UNIQUE, names::NEW));
        children.extend(self.extremes());

        self.filtered(plan, children)
    }

    /// Term statistics: filter -> terms -> per-term timeline + reducers
    pub fn terms(
        &self,
        plan: &QueryPlan,
        interval: BucketInterval,
        offset: DisplayOffset,
        term: TermField,
        max_terms: u32,
    ) -> SearchRequest {
        let mut per_term = vec![self.timeline(interval, offset)];
        per_term.extend(self.reducers(names::UNIQUE, names::NEW));
        per_term.extend(self.extremes());

        let terms = Aggregation::new(
            names::TERMS,
            AggregationKind::TermsHistogram {
                field: term.as_str().to_string(),
                size: max_terms,
                min_doc_count: 0,
            },
        )
        .with_children(per_term);

        self.filtered(plan, vec![terms])
    }

    fn filtered(&self, plan: &QueryPlan, children: Vec<Aggregation>) -> SearchRequest {
        let root = Aggregation::new(names::FILTERED, AggregationKind::Filter(plan.filter.clone()))
            .with_children(children);

        SearchRequest {
            partitions: plan.partitions.clone(),
            aggregations: vec![root],
        }
    }

    fn timeline(&self, interval: BucketInterval, offset: DisplayOffset) -> Aggregation {
        Aggregation::new(
            names::TIMELINE,
            AggregationKind::DateHistogram {
                field: self.config.timestamp_field.clone(),
                interval,
                min_doc_count: 0,
                time_zone: offset,
            },
        )
        .with_children(self.reducers(names::TL_UNIQUE, names::TL_NEW).to_vec())
    }

    fn reducers(&self, unique: &str, new: &str) -> [Aggregation; 2] {
        [
            Aggregation::new(
                unique,
                AggregationKind::Cardinality {
                    field: self.config.distinct_field.clone(),
                    precision_threshold: self.config.precision_threshold,
                },
            ),
            Aggregation::new(
                new,
                AggregationKind::NewFlagSplit {
                    field: self.config.new_flag_field.clone(),
                    exclude: self.config.not_new_value.clone(),
                },
            ),
        ]
    }

    fn extremes(&self) -> [Aggregation; 2] {
        let field = &self.config.timestamp_field;
        [
            Aggregation::new(
                names::FIRST_OCCURRENCE,
                AggregationKind::MinMax {
                    field: field.clone(),
                    extremum: Extremum::Min,
                },
            ),
            Aggregation::new(
                names::LAST_OCCURRENCE,
                AggregationKind::MinMax {
                    field: field.clone(),
                    extremum: Extremum::Max,
                },
            ),
        ]
    }
}
