//! Partition selection for time-sharded event stores
//!
//! Events live in time-aligned partitions (one index per month or per day).
//! A stats request only touches the partitions whose window overlaps the
//! requested range.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Backend partition identifier (e.g. an index name)
pub type PartitionId = String;

/// Result of partition selection
///
/// `effective_start`/`effective_end` are the bounds the request actually
/// covers once retention clamping is applied. Callers must use these, not
/// the requested bounds, for every derived value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSelection {
    /// Partitions overlapping the effective range, oldest first
    pub partitions: Vec<PartitionId>,
    /// Effective start, UTC
    pub effective_start: DateTime<Utc>,
    /// Effective end, UTC
    pub effective_end: DateTime<Utc>,
}

impl PartitionSelection {
    /// Whether no partition can hold matching documents
    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }
}

/// Catalog of backend partitions
pub trait PartitionCatalog: Send + Sync {
    /// Partitions that can contain documents in `[utc_start, utc_end]`
    fn partitions_overlapping(
        &self,
        utc_start: DateTime<Utc>,
        utc_end: DateTime<Utc>,
    ) -> PartitionSelection;

    /// Partition a document with this timestamp belongs to
    fn partition_for(&self, timestamp: DateTime<Utc>) -> PartitionId;
}

/// Width of one partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionGranularity {
    /// One partition per UTC day, named `{prefix}yyyyMMdd`
    Daily,
    /// One partition per UTC month, named `{prefix}yyyyMM`
    #[default]
    Monthly,
}

/// Catalog of prefix-named, time-aligned partitions
#[derive(Debug, Clone)]
pub struct TimePartitionCatalog {
    prefix: String,
    granularity: PartitionGranularity,
    earliest: Option<DateTime<Utc>>,
}

impl TimePartitionCatalog {
    /// Create a catalog with no retention bound
    pub fn new(prefix: &str, granularity: PartitionGranularity) -> Self {
        Self {
            prefix: prefix.to_string(),
            granularity,
            earliest: None,
        }
    }

    /// Monthly partitions named `{prefix}yyyyMM`
    pub fn monthly(prefix: &str) -> Self {
        Self::new(prefix, PartitionGranularity::Monthly)
    }

    /// Daily partitions named `{prefix}yyyyMMdd`
    pub fn daily(prefix: &str) -> Self {
        Self::new(prefix, PartitionGranularity::Daily)
    }

    /// Set the oldest retained instant
    pub fn with_earliest(mut self, earliest: DateTime<Utc>) -> Self {
        self.earliest = Some(earliest);
        self
    }

    /// Partition granularity
    pub fn granularity(&self) -> PartitionGranularity {
        self.granularity
    }

    /// Start of the partition containing `timestamp`
    fn floor(&self, timestamp: DateTime<Utc>) -> NaiveDate {
        let date = timestamp.date_naive();
        match self.granularity {
            PartitionGranularity::Daily => date,
            PartitionGranularity::Monthly => date.with_day(1).unwrap_or(date),
        }
    }

    fn next(&self, start: NaiveDate) -> Option<NaiveDate> {
        match self.granularity {
            PartitionGranularity::Daily => start.succ_opt(),
            PartitionGranularity::Monthly => {
                let (year, month) = if start.month() == 12 {
                    (start.year() + 1, 1)
                } else {
                    (start.year(), start.month() + 1)
                };
                NaiveDate::from_ymd_opt(year, month, 1)
            }
        }
    }

    fn name(&self, start: NaiveDate) -> PartitionId {
        match self.granularity {
            PartitionGranularity::Daily => format!("{}{}", self.prefix, start.format("%Y%m%d")),
            PartitionGranularity::Monthly => format!("{}{}", self.prefix, start.format("%Y%m")),
        }
    }
}

impl PartitionCatalog for TimePartitionCatalog {
    fn partitions_overlapping(
        &self,
        utc_start: DateTime<Utc>,
        utc_end: DateTime<Utc>,
    ) -> PartitionSelection {
        let effective_end = utc_end;
        let mut effective_start = utc_start;

        if let Some(earliest) = self.earliest {
            if effective_start < earliest {
                effective_start = earliest.min(effective_end);
            }
            if effective_end < earliest {
                return PartitionSelection {
                    partitions: Vec::new(),
                    effective_start,
                    effective_end,
                };
            }
        }

        let mut partitions = Vec::new();
        let last = self.floor(effective_end);
        let mut current = Some(self.floor(effective_start));

        while let Some(start) = current {
            if start > last {
                break;
            }
            partitions.push(self.name(start));
            current = self.next(start);
        }

        PartitionSelection {
            partitions,
            effective_start,
            effective_end,
        }
    }

    fn partition_for(&self, timestamp: DateTime<Utc>) -> PartitionId {
        self.name(self.floor(timestamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_monthly_partitions_span_year_boundary() {
        let catalog = TimePartitionCatalog::monthly("events-v1-");
        let selection = catalog.partitions_overlapping(at(2023, 11, 20), at(2024, 2, 3));

        assert_eq!(
            selection.partitions,
            vec![
                "events-v1-202311",
                "events-v1-202312",
                "events-v1-202401",
                "events-v1-202402",
            ]
        );
        assert_eq!(selection.effective_start, at(2023, 11, 20));
        assert_eq!(selection.effective_end, at(2024, 2, 3));
    }

    #[test]
    fn test_daily_partitions() {
        let catalog = TimePartitionCatalog::daily("ev-");
        let selection = catalog.partitions_overlapping(at(2024, 2, 28), at(2024, 3, 1));
        assert_eq!(
            selection.partitions,
            vec!["ev-20240228", "ev-20240229", "ev-20240301"]
        );
    }

    #[test]
    fn test_single_instant_range() {
        let catalog = TimePartitionCatalog::monthly("e-");
        let selection = catalog.partitions_overlapping(at(2024, 5, 5), at(2024, 5, 5));
        assert_eq!(selection.partitions, vec!["e-202405"]);
    }

    #[test]
    fn test_inverted_range_is_empty() {
        let catalog = TimePartitionCatalog::monthly("e-");
        let selection = catalog.partitions_overlapping(at(2024, 6, 1), at(2024, 4, 1));
        assert!(selection.is_empty());
    }

    #[test]
    fn test_retention_clamps_start() {
        let earliest = at(2024, 3, 10);
        let catalog = TimePartitionCatalog::monthly("e-").with_earliest(earliest);
        let selection = catalog.partitions_overlapping(at(2024, 1, 1), at(2024, 4, 2));

        assert_eq!(selection.effective_start, earliest);
        assert_eq!(selection.partitions, vec!["e-202403", "e-202404"]);
    }

    #[test]
    fn test_range_before_retention_is_empty() {
        let catalog = TimePartitionCatalog::monthly("e-").with_earliest(at(2024, 3, 10));
        let selection = catalog.partitions_overlapping(at(2023, 1, 1), at(2023, 6, 1));

        assert!(selection.is_empty());
        assert_eq!(selection.effective_end, at(2023, 6, 1));
        assert!(selection.effective_start <= selection.effective_end);
    }

    #[test]
    fn test_partition_for() {
        let catalog = TimePartitionCatalog::monthly("events-v1-");
        assert_eq!(catalog.partition_for(at(2024, 12, 31)), "events-v1-202412");
        assert_eq!(
            TimePartitionCatalog::daily("d-").partition_for(at(2024, 1, 9)),
            "d-20240109"
        );
    }
}
