//! Response tree to typed report conversion
//!
//! The display offset is applied here and nowhere else: every instant read
//! from the response or the plan is shifted exactly once on its way into a
//! report. Missing nodes read as zero counts or unset values.

use chrono::{DateTime, Utc};
use tracing::debug;

use super::query::QueryPlan;
use super::request::names;
use super::response::{Aggregations, Bucket};
use super::result::{EventStatsResult, EventTermStatsResult, TermStatsItem, TimelineItem};
use crate::types::DisplayOffset;

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Builds reports from a backend's aggregation tree
#[derive(Debug, Clone, Copy)]
pub struct ResultAssembler {
    offset: DisplayOffset,
}

impl ResultAssembler {
    /// Create an assembler shifting instants by `offset`
    pub fn new(offset: DisplayOffset) -> Self {
        Self { offset }
    }

    /// Occurrence statistics report
    pub fn occurrence(&self, aggregations: &Aggregations, plan: &QueryPlan) -> EventStatsResult {
        let empty = Aggregations::new();
        let (total, level) = match aggregations.single(names::FILTERED) {
            Some(filtered) => (filtered.doc_count, &filtered.aggregations),
            None => (0, &empty),
        };

        let timeline = self.timeline(level);
        let start = timeline
            .first()
            .map(|item| item.date)
            .unwrap_or_else(|| self.offset.apply(plan.effective_start));
        let end = self.offset.apply(plan.effective_end);
        let (first_occurrence, last_occurrence) = self.extremes(level, &timeline);

        debug!(
            total,
            buckets = timeline.len(),
            "Assembled occurrence statistics"
        );

        EventStatsResult {
            total,
            unique: unique_count(level, names::UNIQUE),
            new: new_count(level, names::NEW),
            avg_per_hour: avg_per_hour(total, start, end),
            timeline,
            start,
            end,
            first_occurrence,
            last_occurrence,
        }
    }

    /// Term statistics report, keeping at most `max_terms` terms in backend order
    pub fn terms(
        &self,
        aggregations: &Aggregations,
        plan: &QueryPlan,
        max_terms: usize,
    ) -> EventTermStatsResult {
        let empty = Aggregations::new();
        let (total, level) = match aggregations.single(names::FILTERED) {
            Some(filtered) => (filtered.doc_count, &filtered.aggregations),
            None => (0, &empty),
        };

        let terms: Vec<TermStatsItem> = level
            .buckets(names::TERMS)
            .iter()
            .take(max_terms)
            .map(|bucket| self.term_item(bucket))
            .collect();

        debug!(total, terms = terms.len(), "Assembled term statistics");

        EventTermStatsResult {
            total,
            terms,
            start: self.offset.apply(plan.effective_start),
            end: self.offset.apply(plan.effective_end),
        }
    }

    fn term_item(&self, bucket: &Bucket) -> TermStatsItem {
        let level = &bucket.aggregations;
        let timeline = self.timeline(level);
        let (first_occurrence, last_occurrence) = self.extremes(level, &timeline);

        TermStatsItem {
            term: bucket.key.as_term(),
            total: bucket.doc_count,
            unique: unique_count(level, names::UNIQUE),
            new: new_count(level, names::NEW),
            first_occurrence,
            last_occurrence,
            timeline,
        }
    }

    /// Timeline items sorted by bucket start
    fn timeline(&self, level: &Aggregations) -> Vec<TimelineItem> {
        let mut items: Vec<TimelineItem> = level
            .buckets(names::TIMELINE)
            .iter()
            .filter_map(|bucket| {
                let start = bucket.key.as_time()?;
                Some(TimelineItem {
                    date: self.offset.apply(start),
                    total: bucket.doc_count,
                    unique: unique_count(&bucket.aggregations, names::TL_UNIQUE),
                    new: new_count(&bucket.aggregations, names::TL_NEW),
                })
            })
            .collect();

        items.sort_by_key(|item| item.date);
        items
    }

    /// First/last occurrence; only looked up when the timeline has buckets
    fn extremes(
        &self,
        level: &Aggregations,
        timeline: &[TimelineItem],
    ) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        if timeline.is_empty() {
            return (None, None);
        }

        let read = |name: &str| {
            level
                .metric(name)
                .and_then(|ms| DateTime::<Utc>::from_timestamp_millis(ms as i64))
                .map(|instant| self.offset.apply(instant))
        };

        (read(names::FIRST_OCCURRENCE), read(names::LAST_OCCURRENCE))
    }
}

fn unique_count(level: &Aggregations, name: &str) -> u64 {
    level
        .metric(name)
        .map(|value| value.max(0.0).floor() as u64)
        .unwrap_or(0)
}

/// Doc count of the retained bucket of a new/old split
fn new_count(level: &Aggregations, name: &str) -> u64 {
    level
        .buckets(name)
        .first()
        .map(|bucket| bucket.doc_count)
        .unwrap_or(0)
}

fn avg_per_hour(total: u64, start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let hours = (end - start).num_milliseconds() as f64 / MILLIS_PER_HOUR;
    if hours > 0.0 {
        total as f64 / hours
    } else {
        0.0
    }
}
