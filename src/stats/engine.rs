//! Caller-facing statistics facade
//!
//! Chains the pipeline for one request:
//!
//! ```text
//! StatsQuery ──► QueryBuilder ──► QueryPlan ─┐
//!            └─► select_interval ────────────┼─► RequestComposer ─► AggregationExecutor
//!                                            │                            │
//!                                            └──────── ResultAssembler ◄──┘
//! ```

use std::sync::Arc;
use tracing::{debug, info};

use super::assembler::ResultAssembler;
use super::backend::SearchBackend;
use super::executor::AggregationExecutor;
use super::interval::select_interval;
use super::partition::PartitionCatalog;
use super::query::QueryBuilder;
use super::request::RequestComposer;
use super::result::{EventStatsResult, EventTermStatsResult};
use crate::config::{Config, StatsConfig};
use crate::error::{Error, Result};
use crate::types::{StatsQuery, TermStatsQuery};

/// Event statistics engine
///
/// Holds only shared, immutable collaborators, so one instance can serve
/// concurrent callers.
pub struct EventStats {
    executor: AggregationExecutor,
    catalog: Arc<dyn PartitionCatalog>,
    config: StatsConfig,
}

impl EventStats {
    /// Create an engine over `backend` and `catalog`
    pub fn new(
        backend: Arc<dyn SearchBackend>,
        catalog: Arc<dyn PartitionCatalog>,
        config: StatsConfig,
    ) -> Self {
        let executor = AggregationExecutor::new(backend).with_request_tracing(config.trace_requests);
        Self {
            executor,
            catalog,
            config,
        }
    }

    /// Create an engine using the catalog described by `config.partitions`
    pub fn from_config(backend: Arc<dyn SearchBackend>, config: &Config) -> Self {
        Self::new(
            backend,
            Arc::new(config.partitions.catalog()),
            config.stats.clone(),
        )
    }

    /// Aggregation settings in use
    pub fn config(&self) -> &StatsConfig {
        &self.config
    }

    /// Totals, distinct stacks, first occurrences and a timeline for the
    /// events matching `query`
    ///
    /// # Errors
    ///
    /// [`Error::BackendQueryFailure`] when the backend rejects the request.
    pub async fn occurrence_stats(&self, query: &StatsQuery) -> Result<EventStatsResult> {
        let plan = QueryBuilder::new(self.catalog.as_ref(), &self.config.timestamp_field).build(
            query.filter.as_deref(),
            query.utc_start,
            query.utc_end,
        );
        let interval = select_interval(plan.effective_start, plan.effective_end, query.desired_points);
        debug!(interval = %interval, points = query.desired_points, "Selected timeline interval");

        let request =
            RequestComposer::new(&self.config).occurrence(&plan, interval, query.display_offset);
        let aggregations = self.executor.execute(&request).await?;

        let result = ResultAssembler::new(query.display_offset).occurrence(&aggregations, &plan);
        info!(
            total = result.total,
            unique = result.unique,
            new = result.new,
            "Computed occurrence statistics"
        );
        Ok(result)
    }

    /// The same statistics broken down by the values of `query.term`
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] when `max_terms` is zero, raised before the
    /// backend is contacted. [`Error::BackendQueryFailure`] when the backend
    /// rejects the request.
    pub async fn term_stats(&self, query: &TermStatsQuery) -> Result<EventTermStatsResult> {
        if query.max_terms == 0 {
            return Err(Error::invalid_argument("max_terms must be greater than 0"));
        }

        let stats = &query.stats;
        let plan = QueryBuilder::new(self.catalog.as_ref(), &self.config.timestamp_field).build(
            stats.filter.as_deref(),
            stats.utc_start,
            stats.utc_end,
        );
        let interval = select_interval(plan.effective_start, plan.effective_end, stats.desired_points);
        debug!(
            interval = %interval,
            term = %query.term,
            max_terms = query.max_terms,
            "Selected term timeline interval"
        );

        let request = RequestComposer::new(&self.config).terms(
            &plan,
            interval,
            stats.display_offset,
            query.term,
            query.max_terms,
        );
        let aggregations = self.executor.execute(&request).await?;

        let result = ResultAssembler::new(stats.display_offset).terms(
            &aggregations,
            &plan,
            query.max_terms as usize,
        );
        info!(
            total = result.total,
            terms = result.terms.len(),
            term = %query.term,
            "Computed term statistics"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::memory::{EventDocument, InMemoryBackend};
    use crate::stats::partition::TimePartitionCatalog;
    use crate::types::{DisplayOffset, TermField};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()
    }

    fn engine() -> (EventStats, Arc<InMemoryBackend>) {
        let catalog = Arc::new(TimePartitionCatalog::monthly("events-v1-"));
        let backend = Arc::new(InMemoryBackend::new(catalog.clone()));
        let engine = EventStats::new(backend.clone(), catalog, StatsConfig::default());
        (engine, backend)
    }

    #[tokio::test]
    async fn test_occurrence_bounds_filter_by_range() {
        let (engine, backend) = engine();
        backend.insert_many(vec![
            EventDocument::new(t0() + Duration::hours(1), "a").first_occurrence(),
            EventDocument::new(t0() + Duration::hours(30), "b"),
        ]);

        let query = StatsQuery::new(t0(), t0() + Duration::hours(24));
        let result = engine.occurrence_stats(&query).await.unwrap();

        assert_eq!(result.total, 1);
        assert_eq!(result.unique, 1);
        assert_eq!(result.new, 1);
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_zero_max_terms_rejected_before_backend() {
        let (engine, backend) = engine();
        let mut query = TermStatsQuery::new(t0(), t0() + Duration::days(1), TermField::Tags);
        query.max_terms = 0;

        let err = engine.term_stats(&query).await.unwrap_err();
        assert!(err.is_invalid_argument());
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_term_stats_offset_applies_to_bounds() {
        let (engine, _backend) = engine();
        let mut query = TermStatsQuery::new(t0(), t0() + Duration::days(1), TermField::StackId);
        query.stats.display_offset = DisplayOffset::from_hours(-3).unwrap();

        let result = engine.term_stats(&query).await.unwrap();
        assert_eq!(result.total, 0);
        assert!(result.terms.is_empty());
        assert_eq!(result.start, t0() - Duration::hours(3));
        assert_eq!(result.end, t0() + Duration::hours(21));
    }
}
