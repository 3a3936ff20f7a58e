//! Event Stats command line
//!
//! Runs occurrence or term statistics over a JSON-lines file of event
//! documents, using the in-memory backend, and prints the report as JSON.
//!
//! # Configuration
//!
//! Read from, in order:
//! 1. `--config <path>`
//! 2. `EVENTSTATS_CONFIG` environment variable (path to TOML file)
//! 3. Defaults
//!
//! `EVENTSTATS_*` environment variables override file values.
//!
//! # Example Usage
//!
//! ```bash
//! # Validate a configuration file
//! eventstats --config eventstats.toml check-config
//!
//! # Hourly-ish timeline for one project, shown in UTC-05:00
//! eventstats occurrence --events events.jsonl \
//!   --start 2024-01-01T00:00:00Z --end 2024-01-02T00:00:00Z \
//!   --filter project_id:537650f3b77efe23a47914f4 --offset -05:00
//!
//! # Top 5 tags over a week
//! eventstats terms --term tags --max 5 --events events.jsonl \
//!   --start 2024-01-01T00:00:00Z --end 2024-01-08T00:00:00Z
//! ```

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use event_stats::{
    config::Config,
    stats::{EventStats, InMemoryBackend},
    types::{DisplayOffset, StatsQuery, TermStatsQuery},
};
use std::{path::PathBuf, sync::Arc};
use tracing::{debug, info};

// =============================================================================
// CLI Definition
// =============================================================================

/// Event Stats - aggregated statistics over error events
#[derive(Parser)]
#[command(name = "eventstats")]
#[command(version)]
#[command(about = "Occurrence and term statistics over error events", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file (overrides EVENTSTATS_CONFIG env var)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration and print a summary
    CheckConfig,

    /// Totals, distinct stacks, first occurrences and a timeline
    Occurrence {
        #[command(flatten)]
        query: QueryArgs,
    },

    /// The same statistics broken down by a term field
    Terms {
        /// Term field (organization_id, project_id, stack_id, tags)
        #[arg(short, long)]
        term: String,

        /// Maximum number of terms (defaults to stats.max_terms)
        #[arg(short, long)]
        max: Option<u32>,

        #[command(flatten)]
        query: QueryArgs,
    },
}

/// Options shared by the statistics commands
#[derive(Args)]
struct QueryArgs {
    /// JSON-lines file of event documents
    #[arg(short, long)]
    events: PathBuf,

    /// Range start, RFC 3339
    #[arg(short, long)]
    start: DateTime<Utc>,

    /// Range end, RFC 3339
    #[arg(long)]
    end: DateTime<Utc>,

    /// Query string, e.g. `project_id:abc AND tags:prod`
    #[arg(short, long)]
    filter: Option<String>,

    /// Display offset applied to returned instants, e.g. -05:00
    #[arg(short, long, allow_hyphen_values = true)]
    offset: Option<DisplayOffset>,

    /// Target number of timeline buckets
    #[arg(short, long)]
    points: Option<u32>,
}

// =============================================================================
// Setup
// =============================================================================

/// Load configuration from `--config`, `EVENTSTATS_CONFIG` or defaults
fn load_config(cli: &Cli) -> event_stats::Result<Config> {
    let path = cli
        .config
        .as_ref()
        .map(|p| p.to_string_lossy().into_owned())
        .or_else(|| std::env::var("EVENTSTATS_CONFIG").ok());

    let config = match path {
        Some(path) => Config::from_file_with_env(&path)?,
        None => Config::from_env(),
    };
    config.validate()?;
    Ok(config)
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.monitoring.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if config.monitoring.structured_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Build an engine whose backend holds the documents of `events`
fn load_engine(config: &Config, events: &PathBuf) -> event_stats::Result<EventStats> {
    let catalog = Arc::new(config.partitions.catalog());
    let backend = Arc::new(InMemoryBackend::new(catalog.clone()));

    let contents = std::fs::read_to_string(events)?;
    let loaded = backend.load_json_lines(&contents)?;
    info!(
        documents = loaded,
        partitions = backend.partition_ids().len(),
        path = %events.display(),
        "Loaded events"
    );

    Ok(EventStats::new(backend, catalog, config.stats.clone()))
}

fn print_json<T: serde::Serialize>(value: &T) -> event_stats::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// =============================================================================
// Command Handlers
// =============================================================================

fn cmd_check_config(config: &Config) {
    println!("Configuration is valid!");
    println!();
    println!("Stats Settings:");
    println!("  Timestamp field: {}", config.stats.timestamp_field);
    println!("  Distinct field: {}", config.stats.distinct_field);
    println!(
        "  New flag field: {} (excluding \"{}\")",
        config.stats.new_flag_field, config.stats.not_new_value
    );
    println!("  Precision threshold: {}", config.stats.precision_threshold);
    println!(
        "  Default points: {} (occurrence), {} (terms)",
        config.stats.occurrence_points, config.stats.term_points
    );
    println!("  Max terms: {}", config.stats.max_terms);
    println!();
    println!("Partitions:");
    println!("  Prefix: {}", config.partitions.prefix);
    println!("  Granularity: {:?}", config.partitions.granularity);
    match config.partitions.earliest {
        Some(earliest) => println!("  Earliest: {}", earliest.to_rfc3339()),
        None => println!("  Earliest: unbounded"),
    }
    println!();
    println!("Monitoring:");
    println!("  Log level: {}", config.monitoring.log_level);
    println!("  Structured logging: {}", config.monitoring.structured_logging);
}

async fn cmd_occurrence(config: &Config, args: &QueryArgs) -> event_stats::Result<()> {
    let engine = load_engine(config, &args.events)?;

    let mut query = StatsQuery::new(args.start, args.end)
        .with_display_offset(args.offset.unwrap_or(DisplayOffset::ZERO))
        .with_desired_points(args.points.unwrap_or(config.stats.occurrence_points));
    if let Some(filter) = &args.filter {
        query = query.with_filter(filter.as_str());
    }
    debug!(?query, "Running occurrence statistics");

    let result = engine.occurrence_stats(&query).await?;
    print_json(&result)
}

async fn cmd_terms(
    config: &Config,
    term: &str,
    max: Option<u32>,
    args: &QueryArgs,
) -> event_stats::Result<()> {
    // Reject a bad term before reading any events
    let mut builder = TermStatsQuery::builder(args.start, args.end)
        .term(term)
        .max_terms(max.unwrap_or(config.stats.max_terms))
        .desired_points(args.points.unwrap_or(config.stats.term_points))
        .display_offset(args.offset.unwrap_or(DisplayOffset::ZERO));
    if let Some(filter) = &args.filter {
        builder = builder.filter(filter);
    }
    let query = builder.build()?;

    let engine = load_engine(config, &args.events)?;
    debug!(?query, "Running term statistics");

    let result = engine.term_stats(&query).await?;
    print_json(&result)
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config(&cli)?;
    init_tracing(&config);

    match &cli.command {
        Commands::CheckConfig => cmd_check_config(&config),
        Commands::Occurrence { query } => cmd_occurrence(&config, query).await?,
        Commands::Terms { term, max, query } => cmd_terms(&config, term, *max, query).await?,
    }

    Ok(())
}
