//! Integration tests for term statistics
//!
//! Drives `EventStats::term_stats` end to end against the in-memory backend.

use chrono::{DateTime, Duration, TimeZone, Utc};
use event_stats::config::StatsConfig;
use event_stats::stats::{EventDocument, EventStats, InMemoryBackend, TimePartitionCatalog};
use event_stats::types::{DisplayOffset, TermField, TermStatsQuery};
use std::sync::Arc;

// ============================================================================
// Fixtures
// ============================================================================

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 2, 0, 0, 0).unwrap()
}

fn setup() -> (EventStats, Arc<InMemoryBackend>) {
    let catalog = Arc::new(TimePartitionCatalog::monthly("events-v1-"));
    let backend = Arc::new(InMemoryBackend::new(catalog.clone()));
    let stats = EventStats::new(backend.clone(), catalog, StatsConfig::default());
    (stats, backend)
}

/// Events spread over four projects with distinct volumes
fn project_events() -> Vec<EventDocument> {
    let mut docs = Vec::new();
    for (project, count, first) in [("alpha", 4, true), ("beta", 3, false), ("gamma", 2, true), ("delta", 1, false)] {
        for i in 0..count {
            let mut doc = EventDocument::new(t0() + Duration::hours(i), &format!("{}-stack-{}", project, i % 2))
                .with_organization("org-1")
                .with_project(project)
                .with_tags(&["prod", project]);
            if first && i == 0 {
                doc = doc.first_occurrence();
            }
            docs.push(doc);
        }
    }
    docs
}

fn range() -> (DateTime<Utc>, DateTime<Utc>) {
    (t0(), t0() + Duration::days(1))
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_invalid_term_field_never_reaches_backend() {
    let (_stats, backend) = setup();
    backend.insert_many(project_events());
    let (start, end) = range();

    for bad in ["user_id", "Tags", "", "project"] {
        let err = TermStatsQuery::builder(start, end).term(bad).build().unwrap_err();
        assert!(err.is_invalid_argument(), "{:?} should be rejected", bad);
    }

    let err = TermStatsQuery::builder(start, end).build().unwrap_err();
    assert!(err.is_invalid_argument());
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_terms_ranked_by_volume() {
    let (stats, backend) = setup();
    backend.insert_many(project_events());
    let (start, end) = range();

    let query = TermStatsQuery::builder(start, end).term("project_id").build().unwrap();
    let result = stats.term_stats(&query).await.unwrap();

    assert_eq!(result.total, 10);
    let ranked: Vec<(&str, u64)> = result.terms.iter().map(|t| (t.term.as_str(), t.total)).collect();
    assert_eq!(
        ranked,
        vec![("alpha", 4), ("beta", 3), ("gamma", 2), ("delta", 1)]
    );

    let alpha = &result.terms[0];
    assert_eq!(alpha.unique, 2);
    assert_eq!(alpha.new, 1);
    assert_eq!(alpha.first_occurrence, Some(t0()));
    assert_eq!(alpha.last_occurrence, Some(t0() + Duration::hours(3)));
    assert_eq!(alpha.timeline.iter().map(|i| i.total).sum::<u64>(), 4);
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_truncation_to_max_terms() {
    let (stats, backend) = setup();
    backend.insert_many(project_events());
    let (start, end) = range();

    let query = TermStatsQuery::builder(start, end)
        .term("project_id")
        .max_terms(2)
        .build()
        .unwrap();
    let result = stats.term_stats(&query).await.unwrap();

    assert_eq!(result.terms.len(), 2);
    let term_total: u64 = result.terms.iter().map(|t| t.total).sum();
    assert!(term_total <= result.total);
    assert_eq!(term_total, 7);
}

#[tokio::test]
async fn test_new_defaults_to_zero() {
    let (stats, backend) = setup();
    backend.insert_many(project_events());
    let (start, end) = range();

    let query = TermStatsQuery::new(start, end, TermField::ProjectId);
    let result = stats.term_stats(&query).await.unwrap();

    let beta = result.terms.iter().find(|t| t.term == "beta").unwrap();
    assert_eq!(beta.new, 0);
    assert!(beta.timeline.iter().all(|i| i.new == 0));
}

#[tokio::test]
async fn test_multi_valued_tags() {
    let (stats, backend) = setup();
    backend.insert_many(project_events());
    let (start, end) = range();

    let query = TermStatsQuery::builder(start, end)
        .term("tags")
        .filter("project_id:gamma")
        .build()
        .unwrap();
    let result = stats.term_stats(&query).await.unwrap();

    assert_eq!(result.total, 2);
    // Equal counts rank by key
    let leaders: Vec<(&str, u64)> = result.terms[..2]
        .iter()
        .map(|t| (t.term.as_str(), t.total))
        .collect();
    assert_eq!(leaders, vec![("gamma", 2), ("prod", 2)]);
    assert_eq!(result.terms[1].new, 1);

    // Tags seen in the searched partitions but not matching the filter
    let alpha = result.terms.iter().find(|t| t.term == "alpha").unwrap();
    assert_eq!(alpha.total, 0);
    assert!(alpha.timeline.is_empty());
    assert_eq!(alpha.first_occurrence, None);
}

#[tokio::test]
async fn test_term_instants_shifted_once() {
    let (stats, backend) = setup();
    backend.insert_many(project_events());
    let (start, end) = range();
    let offset = DisplayOffset::from_hours(-4).unwrap();

    let query = TermStatsQuery::builder(start, end)
        .term("organization_id")
        .display_offset(offset)
        .desired_points(24)
        .build()
        .unwrap();
    let result = stats.term_stats(&query).await.unwrap();

    assert_eq!(result.start, start - Duration::hours(4));
    assert_eq!(result.end, end - Duration::hours(4));

    let org = &result.terms[0];
    assert_eq!(org.term, "org-1");
    assert_eq!(org.total, 10);
    assert_eq!(org.first_occurrence, Some(t0() - Duration::hours(4)));
    assert_eq!(org.timeline[0].date, t0() - Duration::hours(4));
    assert_eq!(org.timeline[0].total, 4);
}

#[tokio::test]
async fn test_term_stats_idempotent() {
    let (stats, backend) = setup();
    backend.insert_many(project_events());
    let (start, end) = range();

    let query = TermStatsQuery::new(start, end, TermField::StackId);
    let first = stats.term_stats(&query).await.unwrap();
    let second = stats.term_stats(&query).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_term_backend_failure() {
    let (stats, backend) = setup();
    backend.fail_with("index_closed_exception");
    let (start, end) = range();

    let query = TermStatsQuery::new(start, end, TermField::Tags);
    let err = stats.term_stats(&query).await.unwrap_err();
    assert!(err.is_backend_failure());
    assert!(err.to_string().contains("index_closed_exception"));
}
