//! Configuration management for the statistics engine
//!
//! TOML file support with environment variable overrides and sensible
//! defaults. Every section may be omitted from the file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::stats::partition::{PartitionGranularity, TimePartitionCatalog};
use crate::types::{DEFAULT_MAX_TERMS, DEFAULT_OCCURRENCE_POINTS, DEFAULT_TERM_POINTS};

/// Highest precision threshold the cardinality reducer accepts
pub const MAX_PRECISION_THRESHOLD: u32 = 40_000;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Aggregation settings
    #[serde(default)]
    pub stats: StatsConfig,

    /// Partition naming and retention
    #[serde(default)]
    pub partitions: PartitionConfig,

    /// Logging
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

/// Aggregation settings: document field names and reducer tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatsConfig {
    /// Event timestamp field
    #[serde(default = "default_timestamp_field")]
    pub timestamp_field: String,

    /// Field counted by the distinct-entity estimator
    #[serde(default = "default_distinct_field")]
    pub distinct_field: String,

    /// Field flagging the first occurrence of an entity
    #[serde(default = "default_new_flag_field")]
    pub new_flag_field: String,

    /// Flag value excluded from the new/old split ("not new")
    #[serde(default = "default_not_new_value")]
    pub not_new_value: String,

    /// Count below which the cardinality estimate is expected to be exact
    #[serde(default = "default_precision_threshold")]
    pub precision_threshold: u32,

    /// Default timeline buckets for occurrence statistics
    #[serde(default = "default_occurrence_points")]
    pub occurrence_points: u32,

    /// Default timeline buckets per term for term statistics
    #[serde(default = "default_term_points")]
    pub term_points: u32,

    /// Default number of terms for term statistics
    #[serde(default = "default_max_terms")]
    pub max_terms: u32,

    /// Log each rendered request at debug level before it is sent
    #[serde(default)]
    pub trace_requests: bool,
}

/// Partition naming and retention
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PartitionConfig {
    /// Prefix of every partition name
    #[serde(default = "default_partition_prefix")]
    pub prefix: String,

    /// Width of one partition
    #[serde(default)]
    pub granularity: PartitionGranularity,

    /// Oldest retained instant; earlier ranges are clamped
    #[serde(default)]
    pub earliest: Option<DateTime<Utc>>,
}

/// Monitoring configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitoringConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON log lines instead of plain text
    #[serde(default)]
    pub structured_logging: bool,
}

// Default value functions
fn default_timestamp_field() -> String { "date".to_string() }
fn default_distinct_field() -> String { "stack_id".to_string() }
fn default_new_flag_field() -> String { "is_first_occurrence".to_string() }
fn default_not_new_value() -> String { "F".to_string() }
fn default_precision_threshold() -> u32 { 1000 }
fn default_occurrence_points() -> u32 { DEFAULT_OCCURRENCE_POINTS }
fn default_term_points() -> u32 { DEFAULT_TERM_POINTS }
fn default_max_terms() -> u32 { DEFAULT_MAX_TERMS }
fn default_partition_prefix() -> String { "events-v1-".to_string() }
fn default_log_level() -> String { "info".to_string() }

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            timestamp_field: default_timestamp_field(),
            distinct_field: default_distinct_field(),
            new_flag_field: default_new_flag_field(),
            not_new_value: default_not_new_value(),
            precision_threshold: default_precision_threshold(),
            occurrence_points: default_occurrence_points(),
            term_points: default_term_points(),
            max_terms: default_max_terms(),
            trace_requests: false,
        }
    }
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            prefix: default_partition_prefix(),
            granularity: PartitionGranularity::default(),
            earliest: None,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            structured_logging: false,
        }
    }
}

impl PartitionConfig {
    /// Build the catalog described by this section
    pub fn catalog(&self) -> TimePartitionCatalog {
        let catalog = TimePartitionCatalog::new(&self.prefix, self.granularity);
        match self.earliest {
            Some(earliest) => catalog.with_earliest(earliest),
            None => catalog,
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Failed to read config file {}: {}", path, e))
        })?;

        toml::from_str(&contents).map_err(|e| {
            Error::Configuration(format!("Failed to parse config file {}: {}", path, e))
        })
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env(path: &str) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from environment variables only
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        // Stats
        if let Ok(threshold) = std::env::var("EVENTSTATS_PRECISION_THRESHOLD") {
            if let Ok(t) = threshold.parse() {
                self.stats.precision_threshold = t;
            }
        }
        if let Ok(max_terms) = std::env::var("EVENTSTATS_MAX_TERMS") {
            if let Ok(m) = max_terms.parse() {
                self.stats.max_terms = m;
            }
        }
        if let Ok(trace) = std::env::var("EVENTSTATS_TRACE_REQUESTS") {
            self.stats.trace_requests = matches!(trace.as_str(), "1" | "true" | "yes");
        }

        // Partitions
        if let Ok(prefix) = std::env::var("EVENTSTATS_PARTITION_PREFIX") {
            self.partitions.prefix = prefix;
        }

        // Monitoring
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            self.monitoring.log_level = log_level;
        }
        if let Ok(log_level) = std::env::var("EVENTSTATS_LOG_LEVEL") {
            self.monitoring.log_level = log_level;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let stats = &self.stats;

        for (name, value) in [
            ("timestamp_field", &stats.timestamp_field),
            ("distinct_field", &stats.distinct_field),
            ("new_flag_field", &stats.new_flag_field),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Configuration(format!("{} cannot be empty", name)));
            }
        }

        if stats.precision_threshold == 0 {
            return Err(Error::Configuration(
                "Precision threshold must be > 0".to_string(),
            ));
        }
        if stats.precision_threshold > MAX_PRECISION_THRESHOLD {
            return Err(Error::Configuration(format!(
                "Precision threshold cannot exceed {}",
                MAX_PRECISION_THRESHOLD
            )));
        }

        if stats.occurrence_points == 0 || stats.term_points == 0 {
            return Err(Error::Configuration(
                "Default data points must be > 0".to_string(),
            ));
        }
        if stats.max_terms == 0 {
            return Err(Error::Configuration("Max terms must be > 0".to_string()));
        }

        if self.partitions.prefix.is_empty() {
            return Err(Error::Configuration(
                "Partition prefix cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Save configuration to TOML file
    pub fn save_to_file(&self, path: &str) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Serialization(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, contents).map_err(|e| {
            Error::Configuration(format!("Failed to write config file {}: {}", path, e))
        })
    }
}
