//! In-memory reference backend
//!
//! Evaluates the aggregation request tree directly over event documents held
//! in memory, partitioned with the same [`PartitionCatalog`] the engine plans
//! against. It behaves like a search cluster from the engine's point of view:
//!
//! - partitions named in a request but holding no documents are ignored
//! - date histograms align buckets in the requested time zone and, with
//!   `min_doc_count = 0`, fill the gaps between the first and last bucket
//! - terms are ranked by document count descending, then key ascending, and
//!   with `min_doc_count = 0` include values seen in the searched partitions
//!   that have no matching documents
//! - distinct counts come from a K-minimum-values sketch that is exact up to
//!   the precision threshold
//! - query strings support `field:value` clauses joined by whitespace or
//!   `AND`, optionally negated with a leading `-`; anything else is answered
//!   with an invalid response, the way a cluster rejects a bad query
//!
//! Not suitable for production: everything lives in memory and a query scans
//! every document of the selected partitions.
//!
//! # Example
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use event_stats::stats::memory::{EventDocument, InMemoryBackend};
//! use event_stats::stats::partition::TimePartitionCatalog;
//! use std::sync::Arc;
//!
//! let backend = InMemoryBackend::new(Arc::new(TimePartitionCatalog::monthly("events-v1-")));
//! let at = Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap();
//! backend.insert(EventDocument::new(at, "stack-1").with_project("p1"));
//!
//! assert_eq!(backend.document_count(), 1);
//! assert_eq!(backend.partition_ids(), vec!["events-v1-202403"]);
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use super::backend::{BackendError, BackendResponse, SearchBackend};
use super::interval::BucketInterval;
use super::partition::{PartitionCatalog, PartitionId};
use super::query::FilterExpr;
use super::request::{Aggregation, AggregationKind, Extremum, SearchRequest};
use super::response::{AggregateValue, Aggregations, Bucket, BucketKey, SingleBucket};
use crate::error::{Error, Result};
use crate::types::DisplayOffset;

/// Most buckets a single date histogram may produce
pub const MAX_HISTOGRAM_BUCKETS: i64 = 65_536;

// ============================================================================
// Event Documents
// ============================================================================

/// One stored event
///
/// Field names match the default [`StatsConfig`](crate::config::StatsConfig)
/// names, so requests composed with the default configuration address these
/// fields directly. Empty string fields are treated as missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDocument {
    /// Occurrence time
    pub date: DateTime<Utc>,

    /// Owning organization
    #[serde(default)]
    pub organization_id: String,

    /// Owning project
    #[serde(default)]
    pub project_id: String,

    /// Stack (grouped error) the event belongs to
    #[serde(default)]
    pub stack_id: String,

    /// Free-form tags
    #[serde(default)]
    pub tags: Vec<String>,

    /// Whether this is the first event of its stack
    #[serde(default)]
    pub is_first_occurrence: bool,
}

impl EventDocument {
    /// Create a recurring event of `stack_id` at `date`
    pub fn new(date: DateTime<Utc>, stack_id: &str) -> Self {
        Self {
            date,
            organization_id: String::new(),
            project_id: String::new(),
            stack_id: stack_id.to_string(),
            tags: Vec::new(),
            is_first_occurrence: false,
        }
    }

    /// Set the organization
    pub fn with_organization(mut self, organization_id: &str) -> Self {
        self.organization_id = organization_id.to_string();
        self
    }

    /// Set the project
    pub fn with_project(mut self, project_id: &str) -> Self {
        self.project_id = project_id.to_string();
        self
    }

    /// Set the tags
    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Mark as the first occurrence of its stack
    pub fn first_occurrence(mut self) -> Self {
        self.is_first_occurrence = true;
        self
    }

    /// Indexed values of a keyword field
    ///
    /// The first-occurrence flag is indexed as `"T"` / `"F"`. Unknown fields
    /// have no values. Repeated tags are indexed once, in first-seen order.
    pub fn field_values(&self, field: &str) -> Vec<&str> {
        fn single(value: &str) -> Vec<&str> {
            if value.is_empty() {
                Vec::new()
            } else {
                vec![value]
            }
        }

        match field {
            "organization_id" => single(&self.organization_id),
            "project_id" => single(&self.project_id),
            "stack_id" => single(&self.stack_id),
            "tags" => {
                let mut values: Vec<&str> = Vec::with_capacity(self.tags.len());
                for tag in self.tags.iter().map(String::as_str) {
                    if !tag.is_empty() && !values.contains(&tag) {
                        values.push(tag);
                    }
                }
                values
            }
            "is_first_occurrence" => vec![if self.is_first_occurrence { "T" } else { "F" }],
            _ => Vec::new(),
        }
    }

    /// Value of a timestamp field
    pub fn timestamp(&self, field: &str) -> Option<DateTime<Utc>> {
        (field == "date").then_some(self.date)
    }
}

// ============================================================================
// Distinct-Count Sketch
// ============================================================================

/// K-minimum-values distinct-count sketch
///
/// Keeps the `k` smallest hashes seen. Exact while at most `k` distinct
/// values were added; beyond that the estimate is `(k - 1) / h_k` with `h_k`
/// the k-th smallest hash normalized to `[0, 1]`.
#[derive(Debug, Clone)]
pub struct KmvSketch {
    min_hashes: Vec<u64>,
    k: usize,
    saturated: bool,
}

impl KmvSketch {
    /// Create a sketch keeping `k` hashes (at least 2)
    pub fn new(k: usize) -> Self {
        let k = k.max(2);
        Self {
            min_hashes: Vec::with_capacity(k + 1),
            k,
            saturated: false,
        }
    }

    /// Add a value
    pub fn add(&mut self, item: &str) {
        let mut hasher = DefaultHasher::new();
        item.hash(&mut hasher);
        let hash = hasher.finish();

        match self.min_hashes.binary_search(&hash) {
            Ok(_) => {}
            Err(pos) if self.min_hashes.len() < self.k => self.min_hashes.insert(pos, hash),
            Err(pos) => {
                self.saturated = true;
                if pos < self.k {
                    self.min_hashes.insert(pos, hash);
                    self.min_hashes.truncate(self.k);
                }
            }
        }
    }

    /// Estimated number of distinct values added
    pub fn estimate(&self) -> u64 {
        if !self.saturated {
            return self.min_hashes.len() as u64;
        }

        let kth = self.min_hashes[self.k - 1] as f64 / u64::MAX as f64;
        if kth == 0.0 {
            return self.k as u64;
        }
        ((self.k - 1) as f64 / kth) as u64
    }
}

// ============================================================================
// Filter Evaluation
// ============================================================================

/// Compiled form of a [`FilterExpr`]
#[derive(Debug)]
enum Predicate {
    Term {
        field: String,
        value: String,
        negate: bool,
    },
    Range {
        field: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    All(Vec<Predicate>),
}

impl Predicate {
    fn compile(expr: &FilterExpr) -> std::result::Result<Self, String> {
        match expr {
            FilterExpr::MatchAll => Ok(Predicate::All(Vec::new())),
            FilterExpr::QueryString(query) => Self::parse_query_string(query),
            FilterExpr::DateRange { field, start, end } => Ok(Predicate::Range {
                field: field.clone(),
                start: *start,
                end: *end,
            }),
            FilterExpr::And(parts) => parts
                .iter()
                .map(Self::compile)
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(Predicate::All),
        }
    }

    fn parse_query_string(query: &str) -> std::result::Result<Self, String> {
        let mut clauses = Vec::new();

        for token in query.split_whitespace() {
            if token == "AND" {
                continue;
            }

            let (negate, clause) = match token.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, token),
            };

            let (field, value) = clause
                .split_once(':')
                .map(|(f, v)| (f, v.trim_matches('"')))
                .filter(|(f, v)| !f.is_empty() && !v.is_empty())
                .ok_or_else(|| format!("failed to parse query [{}] at '{}'", query, token))?;

            clauses.push(Predicate::Term {
                field: field.to_string(),
                value: value.to_string(),
                negate,
            });
        }

        Ok(Predicate::All(clauses))
    }

    fn matches(&self, doc: &EventDocument) -> bool {
        match self {
            Predicate::Term {
                field,
                value,
                negate,
            } => doc.field_values(field).contains(&value.as_str()) != *negate,
            Predicate::Range { field, start, end } => doc
                .timestamp(field)
                .is_some_and(|ts| ts >= *start && ts <= *end),
            Predicate::All(parts) => parts.iter().all(|p| p.matches(doc)),
        }
    }
}

// ============================================================================
// Request Evaluation
// ============================================================================

/// Walks a request tree over a fixed document universe
struct Evaluator<'a> {
    /// Every document in the searched partitions
    universe: &'a [&'a EventDocument],
}

type EvalResult<T> = std::result::Result<T, String>;

impl<'a> Evaluator<'a> {
    fn level(
        &self,
        aggregations: &[Aggregation],
        docs: &[&'a EventDocument],
    ) -> EvalResult<Aggregations> {
        let mut result = Aggregations::new();
        for aggregation in aggregations {
            result.insert(&aggregation.name, self.node(aggregation, docs)?);
        }
        Ok(result)
    }

    fn node(&self, aggregation: &Aggregation, docs: &[&'a EventDocument]) -> EvalResult<AggregateValue> {
        match &aggregation.kind {
            AggregationKind::Filter(expr) => {
                let predicate = Predicate::compile(expr)?;
                let matching: Vec<&EventDocument> =
                    docs.iter().copied().filter(|d| predicate.matches(d)).collect();

                Ok(AggregateValue::Single(SingleBucket {
                    doc_count: matching.len() as u64,
                    aggregations: self.level(&aggregation.children, &matching)?,
                }))
            }
            AggregationKind::DateHistogram {
                field,
                interval,
                min_doc_count,
                time_zone,
            } => self.date_histogram(aggregation, field, *interval, *min_doc_count, *time_zone, docs),
            AggregationKind::TermsHistogram {
                field,
                size,
                min_doc_count,
            } => self.terms(aggregation, field, *size as usize, *min_doc_count, None, docs),
            AggregationKind::NewFlagSplit { field, exclude } => {
                self.terms(aggregation, field, usize::MAX, 1, Some(exclude), docs)
            }
            AggregationKind::Cardinality {
                field,
                precision_threshold,
            } => {
                let mut sketch = KmvSketch::new(*precision_threshold as usize);
                for &doc in docs {
                    for value in doc.field_values(field) {
                        sketch.add(value);
                    }
                }
                Ok(AggregateValue::Metric(Some(sketch.estimate() as f64)))
            }
            AggregationKind::MinMax { field, extremum } => {
                let timestamps = docs.iter().filter_map(|d| d.timestamp(field));
                let value = match extremum {
                    Extremum::Min => timestamps.min(),
                    Extremum::Max => timestamps.max(),
                };
                Ok(AggregateValue::Metric(
                    value.map(|ts| ts.timestamp_millis() as f64),
                ))
            }
        }
    }

    fn date_histogram(
        &self,
        aggregation: &Aggregation,
        field: &str,
        interval: BucketInterval,
        min_doc_count: u64,
        time_zone: DisplayOffset,
        docs: &[&'a EventDocument],
    ) -> EvalResult<AggregateValue> {
        let width = interval.width_ms();
        let offset_ms = time_zone.minutes() * 60_000;

        // Keys are bucket starts in UTC, aligned on local (offset) time
        let mut groups: BTreeMap<i64, Vec<&EventDocument>> = BTreeMap::new();
        for &doc in docs {
            let Some(ts) = doc.timestamp(field) else {
                continue;
            };
            let local = ts.timestamp_millis() + offset_ms;
            let key = local.div_euclid(width) * width - offset_ms;
            groups.entry(key).or_default().push(doc);
        }

        if min_doc_count == 0 {
            if let (Some(&first), Some(&last)) = (groups.keys().next(), groups.keys().next_back()) {
                if (last - first) / width >= MAX_HISTOGRAM_BUCKETS {
                    return Err(format!(
                        "Trying to create too many buckets in [{}], must be less than or equal to {}",
                        aggregation.name, MAX_HISTOGRAM_BUCKETS
                    ));
                }
                let mut key = first;
                while key < last {
                    groups.entry(key).or_default();
                    key += width;
                }
            }
        }

        let mut buckets = Vec::with_capacity(groups.len());
        for (key, members) in groups {
            if (members.len() as u64) < min_doc_count {
                continue;
            }
            buckets.push(Bucket {
                key: BucketKey::Time(key),
                doc_count: members.len() as u64,
                aggregations: self.level(&aggregation.children, &members)?,
            });
        }

        Ok(AggregateValue::Buckets(buckets))
    }

    fn terms(
        &self,
        aggregation: &Aggregation,
        field: &str,
        size: usize,
        min_doc_count: u64,
        exclude: Option<&str>,
        docs: &[&'a EventDocument],
    ) -> EvalResult<AggregateValue> {
        let mut groups: HashMap<&str, Vec<&EventDocument>> = HashMap::new();
        for &doc in docs {
            for value in doc.field_values(field) {
                if Some(value) != exclude {
                    groups.entry(value).or_default().push(doc);
                }
            }
        }

        if min_doc_count == 0 {
            for &doc in self.universe {
                for value in doc.field_values(field) {
                    if Some(value) != exclude {
                        groups.entry(value).or_default();
                    }
                }
            }
        }

        let mut ranked: Vec<(&str, Vec<&EventDocument>)> = groups
            .into_iter()
            .filter(|(_, members)| members.len() as u64 >= min_doc_count)
            .collect();
        ranked.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(size);

        let mut buckets = Vec::with_capacity(ranked.len());
        for (term, members) in ranked {
            buckets.push(Bucket {
                key: BucketKey::Term(term.to_string()),
                doc_count: members.len() as u64,
                aggregations: self.level(&aggregation.children, &members)?,
            });
        }

        Ok(AggregateValue::Buckets(buckets))
    }
}

// ============================================================================
// Backend
// ============================================================================

/// Search backend over in-memory event documents
pub struct InMemoryBackend {
    catalog: Arc<dyn PartitionCatalog>,
    partitions: RwLock<HashMap<PartitionId, Vec<EventDocument>>>,
    failure: RwLock<Option<String>>,
    calls: AtomicU64,
}

impl InMemoryBackend {
    /// Create an empty backend partitioned by `catalog`
    pub fn new(catalog: Arc<dyn PartitionCatalog>) -> Self {
        Self {
            catalog,
            partitions: RwLock::new(HashMap::new()),
            failure: RwLock::new(None),
            calls: AtomicU64::new(0),
        }
    }

    /// Store one document in its partition
    pub fn insert(&self, doc: EventDocument) {
        let partition = self.catalog.partition_for(doc.date);
        self.partitions.write().entry(partition).or_default().push(doc);
    }

    /// Store many documents
    pub fn insert_many(&self, docs: impl IntoIterator<Item = EventDocument>) {
        let mut partitions = self.partitions.write();
        for doc in docs {
            let partition = self.catalog.partition_for(doc.date);
            partitions.entry(partition).or_default().push(doc);
        }
    }

    /// Parse JSON lines (one [`EventDocument`] per line) and store them
    ///
    /// Blank lines are skipped. Nothing is stored if any line fails to parse.
    pub fn load_json_lines(&self, input: &str) -> Result<usize> {
        let docs = input
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str::<EventDocument>(line)
                    .map_err(|e| Error::Serialization(format!("line {}: {}", i + 1, e)))
            })
            .collect::<Result<Vec<_>>>()?;

        let count = docs.len();
        self.insert_many(docs);
        debug!(documents = count, "Loaded event documents");
        Ok(count)
    }

    /// Answer every subsequent request with an invalid response
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.failure.write() = Some(message.into());
    }

    /// Stop failing requests
    pub fn clear_failure(&self) {
        *self.failure.write() = None;
    }

    /// Number of requests received
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Number of stored documents
    pub fn document_count(&self) -> usize {
        self.partitions.read().values().map(Vec::len).sum()
    }

    /// Partitions holding documents, sorted
    pub fn partition_ids(&self) -> Vec<PartitionId> {
        let mut ids: Vec<PartitionId> = self.partitions.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl SearchBackend for InMemoryBackend {
    fn backend_id(&self) -> &str {
        "memory"
    }

    async fn execute(&self, request: &SearchRequest) -> std::result::Result<BackendResponse, BackendError> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        if let Some(message) = self.failure.read().clone() {
            return Ok(BackendResponse::failed(message));
        }

        let store = self.partitions.read();
        let universe: Vec<&EventDocument> = request
            .partitions
            .iter()
            .filter_map(|p| store.get(p))
            .flatten()
            .collect();

        let evaluator = Evaluator {
            universe: &universe,
        };

        match evaluator.level(&request.aggregations, &universe) {
            Ok(aggregations) => Ok(BackendResponse::ok(aggregations)),
            Err(message) => {
                warn!(error = %message, "Rejected search request");
                Ok(BackendResponse::failed(message))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StatsConfig;
    use crate::stats::interval::IntervalUnit;
    use crate::stats::partition::TimePartitionCatalog;
    use crate::stats::query::QueryPlan;
    use crate::stats::request::{names, RequestComposer};
    use crate::types::TermField;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn backend() -> InMemoryBackend {
        InMemoryBackend::new(Arc::new(TimePartitionCatalog::monthly("e-")))
    }

    fn plan(filter: FilterExpr) -> QueryPlan {
        QueryPlan {
            filter,
            partitions: vec!["e-202401".to_string()],
            effective_start: t0(),
            effective_end: t0() + Duration::days(1),
        }
    }

    fn occurrence(filter: FilterExpr, interval: BucketInterval, offset: DisplayOffset) -> SearchRequest {
        RequestComposer::new(&StatsConfig::default()).occurrence(&plan(filter), interval, offset)
    }

    fn hourly() -> BucketInterval {
        BucketInterval::new(IntervalUnit::Hour, 1)
    }

    #[test]
    fn test_kmv_exact_below_threshold() {
        let mut sketch = KmvSketch::new(100);
        for i in 0..100 {
            sketch.add(&format!("stack-{}", i));
            sketch.add(&format!("stack-{}", i));
        }
        assert_eq!(sketch.estimate(), 100);
    }

    #[test]
    fn test_kmv_estimate_above_threshold() {
        let mut sketch = KmvSketch::new(256);
        for i in 0..1000 {
            sketch.add(&format!("item_{}", i));
        }
        let estimate = sketch.estimate();
        assert!(estimate > 800 && estimate < 1200, "estimate {}", estimate);
    }

    #[test]
    fn test_field_values() {
        let doc = EventDocument::new(t0(), "s1")
            .with_tags(&["a", "", "b", "a"])
            .first_occurrence();
        assert_eq!(doc.field_values("tags"), vec!["a", "b"]);
        assert_eq!(doc.field_values("is_first_occurrence"), vec!["T"]);
        assert!(doc.field_values("project_id").is_empty());
        assert!(doc.field_values("unknown").is_empty());
        assert_eq!(doc.timestamp("date"), Some(t0()));
        assert_eq!(doc.timestamp("created"), None);
    }

    #[test]
    fn test_query_string_parsing() {
        let doc = EventDocument::new(t0(), "s1").with_project("p1").with_tags(&["prod"]);

        let p = Predicate::parse_query_string("project_id:p1 AND tags:\"prod\"").unwrap();
        assert!(p.matches(&doc));

        let p = Predicate::parse_query_string("-tags:prod").unwrap();
        assert!(!p.matches(&doc));

        assert!(Predicate::parse_query_string("project_id:p1 OR tags:x").is_err());
        assert!(Predicate::parse_query_string("project_id:").is_err());
    }

    #[tokio::test]
    async fn test_occurrence_evaluation() {
        let backend = backend();
        backend.insert_many(vec![
            EventDocument::new(t0() + Duration::minutes(10), "a").first_occurrence(),
            EventDocument::new(t0() + Duration::minutes(20), "a"),
            EventDocument::new(t0() + Duration::minutes(190), "b").first_occurrence(),
            EventDocument::new(t0() + Duration::days(40), "c"),
        ]);

        let request = occurrence(FilterExpr::MatchAll, hourly(), DisplayOffset::ZERO);
        let response = backend.execute(&request).await.unwrap();
        assert!(response.valid);

        let filtered = response.aggregations.single(names::FILTERED).unwrap();
        assert_eq!(filtered.doc_count, 3);
        assert_eq!(filtered.aggregations.metric(names::UNIQUE), Some(2.0));
        assert_eq!(filtered.aggregations.buckets(names::NEW).len(), 1);
        assert_eq!(filtered.aggregations.buckets(names::NEW)[0].doc_count, 2);
        assert_eq!(
            filtered.aggregations.metric(names::FIRST_OCCURRENCE),
            Some((t0() + Duration::minutes(10)).timestamp_millis() as f64)
        );

        // 00:00, 01:00 (gap), 02:00 (gap), 03:00
        let timeline = filtered.aggregations.buckets(names::TIMELINE);
        let counts: Vec<u64> = timeline.iter().map(|b| b.doc_count).collect();
        assert_eq!(counts, vec![2, 0, 0, 1]);
        assert_eq!(timeline[1].key, BucketKey::Time((t0() + Duration::hours(1)).timestamp_millis()));
        assert_eq!(timeline[0].aggregations.metric(names::TL_UNIQUE), Some(1.0));
        assert_eq!(timeline[1].aggregations.metric(names::TL_UNIQUE), Some(0.0));
        assert!(timeline[1].aggregations.buckets(names::TL_NEW).is_empty());
    }

    #[tokio::test]
    async fn test_histogram_aligns_on_time_zone() {
        let backend = backend();
        backend.insert(EventDocument::new(t0() + Duration::hours(20), "a"));

        let offset = DisplayOffset::from_minutes(330).unwrap();
        let request = occurrence(FilterExpr::MatchAll, BucketInterval::new(IntervalUnit::Day, 1), offset);
        let response = backend.execute(&request).await.unwrap();

        let filtered = response.aggregations.single(names::FILTERED).unwrap();
        let timeline = filtered.aggregations.buckets(names::TIMELINE);
        assert_eq!(timeline.len(), 1);

        // Local midnight of 2024-01-02 at +05:30
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 18, 30, 0).unwrap();
        assert_eq!(timeline[0].key.as_time(), Some(expected));
    }

    #[tokio::test]
    async fn test_empty_partitions_yield_zero_counts() {
        let backend = backend();
        let request = occurrence(FilterExpr::MatchAll, hourly(), DisplayOffset::ZERO);
        let response = backend.execute(&request).await.unwrap();

        let filtered = response.aggregations.single(names::FILTERED).unwrap();
        assert_eq!(filtered.doc_count, 0);
        assert!(filtered.aggregations.buckets(names::TIMELINE).is_empty());
        assert_eq!(filtered.aggregations.metric(names::FIRST_OCCURRENCE), None);
    }

    #[tokio::test]
    async fn test_terms_ranking_and_zero_counts() {
        let backend = backend();
        backend.insert_many(vec![
            EventDocument::new(t0(), "s1").with_project("beta"),
            EventDocument::new(t0(), "s2").with_project("alpha"),
            EventDocument::new(t0(), "s3").with_project("gamma"),
            EventDocument::new(t0(), "s3").with_project("gamma"),
            EventDocument::new(t0(), "s4").with_project("idle"),
        ]);

        let filter = FilterExpr::QueryString("-project_id:idle".to_string());
        let request = RequestComposer::new(&StatsConfig::default()).terms(
            &plan(filter),
            hourly(),
            DisplayOffset::ZERO,
            TermField::ProjectId,
            10,
        );
        let response = backend.execute(&request).await.unwrap();

        let filtered = response.aggregations.single(names::FILTERED).unwrap();
        let terms: Vec<(String, u64)> = filtered
            .aggregations
            .buckets(names::TERMS)
            .iter()
            .map(|b| (b.key.as_term(), b.doc_count))
            .collect();
        assert_eq!(
            terms,
            vec![
                ("gamma".to_string(), 2),
                ("alpha".to_string(), 1),
                ("beta".to_string(), 1),
                ("idle".to_string(), 0),
            ]
        );
    }

    #[tokio::test]
    async fn test_repeated_tag_counts_document_once() {
        let backend = backend();
        backend.insert(
            EventDocument::new(t0(), "s1")
                .with_tags(&["prod", "prod"])
                .first_occurrence(),
        );

        let request = RequestComposer::new(&StatsConfig::default()).terms(
            &plan(FilterExpr::MatchAll),
            hourly(),
            DisplayOffset::ZERO,
            TermField::Tags,
            10,
        );
        let response = backend.execute(&request).await.unwrap();

        let filtered = response.aggregations.single(names::FILTERED).unwrap();
        assert_eq!(filtered.doc_count, 1);

        let terms = filtered.aggregations.buckets(names::TERMS);
        assert_eq!(terms.len(), 1);
        assert_eq!(terms[0].key.as_term(), "prod");
        assert_eq!(terms[0].doc_count, 1);
        assert_eq!(terms[0].aggregations.buckets(names::NEW)[0].doc_count, 1);

        let timeline: Vec<u64> = terms[0]
            .aggregations
            .buckets(names::TIMELINE)
            .iter()
            .map(|b| b.doc_count)
            .collect();
        assert_eq!(timeline, vec![1]);
    }

    #[tokio::test]
    async fn test_unsupported_query_is_invalid_response() {
        let backend = backend();
        let filter = FilterExpr::QueryString("(a OR b)".to_string());
        let request = occurrence(filter, hourly(), DisplayOffset::ZERO);

        let response = backend.execute(&request).await.unwrap();
        assert!(!response.valid);
        assert!(response.error.unwrap().contains("failed to parse query"));
    }

    #[tokio::test]
    async fn test_failure_injection_and_call_counter() {
        let backend = backend();
        let request = occurrence(FilterExpr::MatchAll, hourly(), DisplayOffset::ZERO);

        backend.fail_with("cluster unavailable");
        let response = backend.execute(&request).await.unwrap();
        assert!(!response.valid);
        assert_eq!(response.error.as_deref(), Some("cluster unavailable"));

        backend.clear_failure();
        assert!(backend.execute(&request).await.unwrap().valid);
        assert_eq!(backend.calls(), 2);
    }

    #[test]
    fn test_load_json_lines() {
        let backend = backend();
        let input = r#"
{"date":"2024-01-05T10:00:00Z","stack_id":"s1","tags":["prod"],"is_first_occurrence":true}

{"date":"2024-02-01T00:00:00Z","stack_id":"s2"}
"#;
        assert_eq!(backend.load_json_lines(input).unwrap(), 2);
        assert_eq!(backend.partition_ids(), vec!["e-202401", "e-202402"]);

        let err = backend.load_json_lines("{\"date\":\"nope\"}").unwrap_err();
        assert!(matches!(err, Error::Serialization(ref m) if m.starts_with("line 1")));
        assert_eq!(backend.document_count(), 2);
    }
}
