//! Event Stats - aggregated statistics over error-tracking events
//!
//! This library computes, for a time range and an optional filter:
//! - occurrence statistics: totals, distinct stacks, first occurrences and an
//!   adaptive-resolution timeline
//! - term statistics: the same figures broken down by organization, project,
//!   stack or tag
//!
//! Evaluation is delegated to a pluggable search backend; the crate builds
//! the aggregation request, runs it once and assembles typed reports.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod types;

/// Configuration management with TOML support
pub mod config;

/// Statistics pipeline: query planning, request composition, execution and
/// report assembly
pub mod stats;

// Re-export main types
pub use config::Config;
pub use error::{Error, Result};
pub use stats::{EventStats, EventStatsResult, EventTermStatsResult};
pub use types::{DisplayOffset, StatsQuery, TermField, TermStatsQuery};
