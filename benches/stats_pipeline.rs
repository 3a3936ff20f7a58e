//! Statistics Pipeline Benchmarks
//!
//! Measures interval selection, request composition and rendering, and full
//! occurrence/term statistics against the in-memory backend.

use chrono::{DateTime, Duration, TimeZone, Utc};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use event_stats::config::StatsConfig;
use event_stats::stats::elasticsearch::ElasticsearchAdapter;
use event_stats::stats::{
    select_interval, EventDocument, EventStats, InMemoryBackend, QueryBuilder, RequestComposer,
    TimePartitionCatalog,
};
use event_stats::types::{DisplayOffset, StatsQuery, TermField, TermStatsQuery};
use std::hint::black_box;
use std::sync::Arc;

// =============================================================================
// Test Data Generators
// =============================================================================

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Events spread evenly over 30 days, 200 stacks, 10 projects
fn create_events(count: usize) -> Vec<EventDocument> {
    let step_ms = (30 * 24 * 3_600_000 / count.max(1)) as i64;
    (0..count)
        .map(|i| {
            let doc = EventDocument::new(
                start() + Duration::milliseconds(step_ms * i as i64),
                &format!("stack-{}", i % 200),
            )
            .with_project(&format!("project-{}", i % 10))
            .with_tags(&["prod", if i % 3 == 0 { "web" } else { "worker" }]);
            if i < 200 {
                doc.first_occurrence()
            } else {
                doc
            }
        })
        .collect()
}

fn engine(count: usize) -> EventStats {
    let catalog = Arc::new(TimePartitionCatalog::monthly("events-v1-"));
    let backend = Arc::new(InMemoryBackend::new(catalog.clone()));
    backend.insert_many(create_events(count));
    EventStats::new(backend, catalog, StatsConfig::default())
}

// =============================================================================
// Benchmarks
// =============================================================================

fn bench_request_building(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_building");
    let catalog = TimePartitionCatalog::daily("events-v1-");
    let config = StatsConfig::default();
    let end = start() + Duration::days(30);

    group.bench_function("select_interval", |b| {
        b.iter(|| select_interval(black_box(start()), black_box(end), black_box(100)))
    });

    group.bench_function("compose_and_render_terms", |b| {
        b.iter(|| {
            let plan = QueryBuilder::new(&catalog, "date").build(Some("tags:prod"), start(), end);
            let interval = select_interval(plan.effective_start, plan.effective_end, 10);
            let request = RequestComposer::new(&config).terms(
                &plan,
                interval,
                DisplayOffset::ZERO,
                TermField::ProjectId,
                25,
            );
            black_box(ElasticsearchAdapter::render(&request))
        })
    });

    group.finish();
}

fn bench_occurrence_stats(c: &mut Criterion) {
    let mut group = c.benchmark_group("occurrence_stats");
    let runtime = tokio::runtime::Runtime::new().unwrap();

    for count in [1_000, 10_000, 50_000] {
        let stats = engine(count);
        let query = StatsQuery::new(start(), start() + Duration::days(30))
            .with_display_offset(DisplayOffset::from_hours(-5).unwrap());

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                runtime
                    .block_on(stats.occurrence_stats(black_box(&query)))
                    .unwrap()
            })
        });
    }

    group.finish();
}

fn bench_term_stats(c: &mut Criterion) {
    let mut group = c.benchmark_group("term_stats");
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let stats = engine(10_000);

    for term in [TermField::ProjectId, TermField::StackId, TermField::Tags] {
        let query = TermStatsQuery::new(start(), start() + Duration::days(30), term);
        group.bench_with_input(BenchmarkId::from_parameter(term), &query, |b, query| {
            b.iter(|| runtime.block_on(stats.term_stats(black_box(query))).unwrap())
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_request_building,
    bench_occurrence_stats,
    bench_term_stats
);
criterion_main!(benches);
