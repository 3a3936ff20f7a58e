//! Elasticsearch query DSL adapter
//!
//! Renders a [`SearchRequest`] as an Elasticsearch `_search` body and reads
//! an Elasticsearch search response back into the generic response tree. The
//! response walk is guided by the request, so each node is decoded according
//! to the kind of aggregation that produced it.
//!
//! # Example
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use event_stats::config::StatsConfig;
//! use event_stats::stats::elasticsearch::ElasticsearchAdapter;
//! use event_stats::stats::interval::{BucketInterval, IntervalUnit};
//! use event_stats::stats::query::{FilterExpr, QueryPlan};
//! use event_stats::stats::request::RequestComposer;
//! use event_stats::types::DisplayOffset;
//!
//! let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
//! let plan = QueryPlan {
//!     filter: FilterExpr::MatchAll,
//!     partitions: vec!["events-v1-202401".to_string()],
//!     effective_start: now,
//!     effective_end: now,
//! };
//! let config = StatsConfig::default();
//! let request = RequestComposer::new(&config).occurrence(
//!     &plan,
//!     BucketInterval::new(IntervalUnit::Hour, 1),
//!     DisplayOffset::ZERO,
//! );
//!
//! let body = ElasticsearchAdapter::render(&request);
//! assert_eq!(body["size"], 0);
//! assert_eq!(
//!     body["aggs"]["filtered"]["aggs"]["timeline"]["date_histogram"]["fixed_interval"],
//!     "1h"
//! );
//! assert_eq!(
//!     ElasticsearchAdapter::search_path(&request).as_deref(),
//!     Some("/events-v1-202401/_search?ignore_unavailable=true")
//! );
//! ```

use serde_json::{json, Map, Value};

use super::backend::{BackendError, BackendResponse};
use super::query::FilterExpr;
use super::request::{Aggregation, AggregationKind, Extremum, SearchRequest};
use super::response::{AggregateValue, Aggregations, Bucket, BucketKey, SingleBucket};

/// Stateless renderer/parser for the Elasticsearch query DSL
pub struct ElasticsearchAdapter;

impl ElasticsearchAdapter {
    /// `_search` path for the request's partitions
    ///
    /// Returns `None` when the request targets no partitions: an empty index
    /// list would search every index, so callers should answer with an empty
    /// response instead of contacting the cluster.
    pub fn search_path(request: &SearchRequest) -> Option<String> {
        if request.partitions.is_empty() {
            return None;
        }
        Some(format!(
            "/{}/_search?ignore_unavailable=true",
            request.partitions.join(",")
        ))
    }

    /// Request body: aggregations only, no hits
    pub fn render(request: &SearchRequest) -> Value {
        json!({
            "size": 0,
            "aggs": render_aggregations(&request.aggregations),
        })
    }

    /// Render a filter expression as a query clause
    pub fn render_filter(filter: &FilterExpr) -> Value {
        match filter {
            FilterExpr::MatchAll => json!({ "match_all": {} }),
            FilterExpr::QueryString(query) => json!({
                "query_string": { "query": query, "default_operator": "AND" }
            }),
            FilterExpr::DateRange { field, start, end } => {
                let mut range = Map::new();
                range.insert(
                    field.clone(),
                    json!({ "gte": start.to_rfc3339(), "lte": end.to_rfc3339() }),
                );
                json!({ "range": range })
            }
            FilterExpr::And(parts) => json!({
                "bool": { "filter": parts.iter().map(Self::render_filter).collect::<Vec<_>>() }
            }),
        }
    }

    /// Decode a search response body
    ///
    /// A body carrying a top-level `error` or `timed_out: true` becomes an
    /// invalid response with the backend's own message. Nodes missing from
    /// the body are left out of the tree.
    pub fn parse_response(
        request: &SearchRequest,
        body: &Value,
    ) -> Result<BackendResponse, BackendError> {
        if let Some(error) = body.get("error") {
            return Ok(BackendResponse::failed(error_message(error)));
        }
        if body.get("timed_out").and_then(Value::as_bool) == Some(true) {
            return Ok(BackendResponse::failed("search timed out"));
        }

        let aggregations = match body.get("aggregations") {
            Some(node) => parse_level(&request.aggregations, node)?,
            None => Aggregations::new(),
        };

        Ok(BackendResponse::ok(aggregations))
    }
}

fn render_aggregations(aggregations: &[Aggregation]) -> Value {
    let mut map = Map::new();
    for aggregation in aggregations {
        map.insert(aggregation.name.clone(), render_aggregation(aggregation));
    }
    Value::Object(map)
}

fn render_aggregation(aggregation: &Aggregation) -> Value {
    let mut body = match &aggregation.kind {
        AggregationKind::Filter(filter) => {
            json!({ "filter": ElasticsearchAdapter::render_filter(filter) })
        }
        AggregationKind::DateHistogram {
            field,
            interval,
            min_doc_count,
            time_zone,
        } => json!({
            "date_histogram": {
                "field": field,
                "fixed_interval": interval.label(),
                "min_doc_count": min_doc_count,
                "time_zone": time_zone.time_zone(),
            }
        }),
        AggregationKind::TermsHistogram {
            field,
            size,
            min_doc_count,
        } => json!({
            "terms": { "field": field, "size": size, "min_doc_count": min_doc_count }
        }),
        AggregationKind::Cardinality {
            field,
            precision_threshold,
        } => json!({
            "cardinality": { "field": field, "precision_threshold": precision_threshold }
        }),
        AggregationKind::MinMax { field, extremum } => {
            let op = match extremum {
                Extremum::Min => "min",
                Extremum::Max => "max",
            };
            let mut map = Map::new();
            map.insert(op.to_string(), json!({ "field": field }));
            Value::Object(map)
        }
        AggregationKind::NewFlagSplit { field, exclude } => json!({
            "terms": { "field": field, "exclude": exclude }
        }),
    };

    if !aggregation.children.is_empty() {
        if let Value::Object(map) = &mut body {
            map.insert("aggs".to_string(), render_aggregations(&aggregation.children));
        }
    }

    body
}

fn error_message(error: &Value) -> String {
    match error {
        Value::String(message) => message.clone(),
        other => other
            .get("reason")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| other.to_string()),
    }
}

fn parse_level(requested: &[Aggregation], node: &Value) -> Result<Aggregations, BackendError> {
    let mut aggregations = Aggregations::new();

    for aggregation in requested {
        let Some(value) = node.get(&aggregation.name) else {
            continue;
        };
        let parsed = parse_node(aggregation, value)?;
        aggregations.insert(&aggregation.name, parsed);
    }

    Ok(aggregations)
}

fn parse_node(aggregation: &Aggregation, node: &Value) -> Result<AggregateValue, BackendError> {
    match &aggregation.kind {
        AggregationKind::Filter(_) => Ok(AggregateValue::Single(SingleBucket {
            doc_count: doc_count(&aggregation.name, node)?,
            aggregations: parse_level(&aggregation.children, node)?,
        })),
        AggregationKind::DateHistogram { .. }
        | AggregationKind::TermsHistogram { .. }
        | AggregationKind::NewFlagSplit { .. } => {
            let is_time = matches!(aggregation.kind, AggregationKind::DateHistogram { .. });
            let buckets = node
                .get("buckets")
                .and_then(Value::as_array)
                .ok_or_else(|| protocol(&aggregation.name, "missing buckets"))?;

            buckets
                .iter()
                .map(|bucket| parse_bucket(aggregation, bucket, is_time))
                .collect::<Result<Vec<_>, _>>()
                .map(AggregateValue::Buckets)
        }
        AggregationKind::Cardinality { .. } | AggregationKind::MinMax { .. } => {
            Ok(AggregateValue::Metric(node.get("value").and_then(Value::as_f64)))
        }
    }
}

fn parse_bucket(
    aggregation: &Aggregation,
    bucket: &Value,
    is_time: bool,
) -> Result<Bucket, BackendError> {
    let raw_key = bucket
        .get("key")
        .ok_or_else(|| protocol(&aggregation.name, "bucket without key"))?;

    let key = match (is_time, raw_key) {
        (true, Value::Number(n)) => BucketKey::Time(
            n.as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .ok_or_else(|| protocol(&aggregation.name, "invalid time key"))?,
        ),
        (true, _) => return Err(protocol(&aggregation.name, "time key is not numeric")),
        (false, _) => BucketKey::Term(match bucket.get("key_as_string") {
            Some(Value::String(s)) => s.clone(),
            _ => match raw_key {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            },
        }),
    };

    Ok(Bucket {
        key,
        doc_count: doc_count(&aggregation.name, bucket)?,
        aggregations: parse_level(&aggregation.children, bucket)?,
    })
}

fn doc_count(name: &str, node: &Value) -> Result<u64, BackendError> {
    node.get("doc_count")
        .and_then(Value::as_u64)
        .ok_or_else(|| protocol(name, "missing doc_count"))
}

fn protocol(name: &str, detail: &str) -> BackendError {
    BackendError::Protocol(format!("aggregation '{}': {}", name, detail))
}
