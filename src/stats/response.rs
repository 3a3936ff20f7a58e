//! Generic aggregation response tree
//!
//! Backends answer a [`SearchRequest`](super::request::SearchRequest) with a
//! tree of named nodes. Each node is a single bucket (filter), a bucket list
//! (histograms) or a scalar metric that may be absent. Lookups never fail: a
//! missing node reads as empty so the assembler can treat sparse responses
//! uniformly.

use chrono::{DateTime, TimeZone, Utc};
use std::collections::BTreeMap;

/// Key of a histogram bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BucketKey {
    /// Bucket start, epoch milliseconds UTC
    Time(i64),
    /// Term value
    Term(String),
}

impl BucketKey {
    /// Bucket start as an instant, for time keys
    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            BucketKey::Time(ms) => Utc.timestamp_millis_opt(*ms).single(),
            BucketKey::Term(_) => None,
        }
    }

    /// Key rendered as a term string
    pub fn as_term(&self) -> String {
        match self {
            BucketKey::Time(ms) => ms.to_string(),
            BucketKey::Term(term) => term.clone(),
        }
    }
}

/// A bucket inside a histogram node
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    /// Bucket key
    pub key: BucketKey,
    /// Documents in the bucket
    pub doc_count: u64,
    /// Sub-aggregation results for this bucket
    pub aggregations: Aggregations,
}

/// A single-bucket node (filter)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SingleBucket {
    /// Documents matching the filter
    pub doc_count: u64,
    /// Sub-aggregation results
    pub aggregations: Aggregations,
}

/// Value of one named node
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateValue {
    /// Filter result
    Single(SingleBucket),
    /// Histogram or split result, in backend order
    Buckets(Vec<Bucket>),
    /// Scalar reducer result; `None` when the reducer produced no value
    Metric(Option<f64>),
}

/// Named aggregation results at one level of the tree
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Aggregations(BTreeMap<String, AggregateValue>);

impl Aggregations {
    /// Empty result set
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a named result
    pub fn insert(&mut self, name: &str, value: AggregateValue) {
        self.0.insert(name.to_string(), value);
    }

    /// Builder form of [`insert`](Self::insert)
    pub fn with(mut self, name: &str, value: AggregateValue) -> Self {
        self.insert(name, value);
        self
    }

    /// Raw node lookup
    pub fn get(&self, name: &str) -> Option<&AggregateValue> {
        self.0.get(name)
    }

    /// Single-bucket node
    pub fn single(&self, name: &str) -> Option<&SingleBucket> {
        match self.0.get(name) {
            Some(AggregateValue::Single(single)) => Some(single),
            _ => None,
        }
    }

    /// Buckets of a histogram node; empty when the node is missing
    pub fn buckets(&self, name: &str) -> &[Bucket] {
        match self.0.get(name) {
            Some(AggregateValue::Buckets(buckets)) => buckets,
            _ => &[],
        }
    }

    /// Scalar reducer value; `None` when missing or absent
    pub fn metric(&self, name: &str) -> Option<f64> {
        match self.0.get(name) {
            Some(AggregateValue::Metric(value)) => *value,
            _ => None,
        }
    }

    /// Number of named results
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no results
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
