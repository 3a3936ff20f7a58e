//! Event Statistics Aggregation
//!
//! Computes occurrence and term statistics over error events held in a
//! time-partitioned search backend. One request flows through these stages:
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │  QueryBuilder + select_interval     │
//! │  filter, partitions, bucket width   │
//! └─────────────────────────────────────┘
//!                  ↓
//! ┌─────────────────────────────────────┐
//! │        RequestComposer              │
//! │  tagged aggregation request tree    │
//! └─────────────────────────────────────┘
//!                  ↓
//! ┌─────────────────────────────────────┐
//! │      AggregationExecutor            │
//! │  one SearchBackend call, validated  │
//! └─────────────────────────────────────┘
//!                  ↓
//! ┌─────────────────────────────────────┐
//! │        ResultAssembler              │
//! │  typed report, offset applied once  │
//! └─────────────────────────────────────┘
//! ```
//!
//! # Backends
//!
//! - [`memory::InMemoryBackend`]: evaluates the request tree over documents
//!   in memory (tests, benchmarks, the CLI)
//! - [`elasticsearch::ElasticsearchAdapter`]: renders the tree as query DSL
//!   and parses search responses, for a cluster-backed [`SearchBackend`]
//!
//! # Example
//!
//! ```rust
//! use chrono::{Duration, TimeZone, Utc};
//! use event_stats::config::StatsConfig;
//! use event_stats::stats::{EventDocument, EventStats, InMemoryBackend, TimePartitionCatalog};
//! use event_stats::types::StatsQuery;
//! use std::sync::Arc;
//!
//! let runtime = tokio::runtime::Runtime::new().unwrap();
//! runtime.block_on(async {
//!     let catalog = Arc::new(TimePartitionCatalog::monthly("events-v1-"));
//!     let backend = Arc::new(InMemoryBackend::new(catalog.clone()));
//!     let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
//!     backend.insert(EventDocument::new(start + Duration::hours(2), "stack-1").first_occurrence());
//!
//!     let stats = EventStats::new(backend, catalog, StatsConfig::default());
//!     let result = stats
//!         .occurrence_stats(&StatsQuery::new(start, start + Duration::days(1)))
//!         .await
//!         .unwrap();
//!
//!     assert_eq!(result.total, 1);
//!     assert_eq!(result.new, 1);
//! });
//! ```

pub mod assembler;
pub mod backend;
pub mod elasticsearch;
pub mod engine;
pub mod executor;
pub mod interval;
pub mod memory;
pub mod partition;
pub mod query;
pub mod request;
pub mod response;
pub mod result;

pub use assembler::ResultAssembler;
pub use backend::{BackendError, BackendResponse, SearchBackend};
pub use engine::EventStats;
pub use executor::AggregationExecutor;
pub use interval::{select_interval, BucketInterval, IntervalUnit};
pub use memory::{EventDocument, InMemoryBackend};
pub use partition::{PartitionCatalog, PartitionGranularity, PartitionSelection, TimePartitionCatalog};
pub use query::{FilterExpr, QueryBuilder, QueryPlan};
pub use request::{Aggregation, AggregationKind, RequestComposer, SearchRequest};
pub use response::{AggregateValue, Aggregations};
pub use result::{EventStatsResult, EventTermStatsResult, TermStatsItem, TimelineItem};
