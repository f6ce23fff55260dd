//! Marketstat CLI: collect exchange statistics and build the consolidated CSV.
//!
//! Commands:
//! - `collect`: fetch every uncached trading day for the selected sources
//! - `consolidate`: merge all caches into the output CSV and its manifest
//! - `run`: `collect` followed by `consolidate`
//! - `status`: per-source cache coverage and output verification
//! - `sources`: list source ids and their columns

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use marketstat_runner::{
    build_catalog, collect_sources, consolidate_from_disk, export_table, selected_sources,
    source_ids, status_report, CollectSummary, CollectorConfig, StdoutProgress,
};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "marketstat",
    about = "Marketstat: NSE/BSE daily market statistics collector",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and cache every missing trading day.
    Collect {
        #[command(flatten)]
        range: RangeArgs,
    },
    /// Merge all caches into the output CSV.
    Consolidate,
    /// Collect, then consolidate.
    Run {
        #[command(flatten)]
        range: RangeArgs,
    },
    /// Report cache coverage and verify the output CSV.
    Status,
    /// List source ids and the columns they contribute.
    Sources,
}

#[derive(clap::Args)]
struct RangeArgs {
    /// Collect only this source (repeatable). Defaults to the config's list.
    #[arg(long = "source")]
    sources: Vec<String>,

    /// First date (YYYY-MM-DD). Overrides the config.
    #[arg(long)]
    start: Option<String>,

    /// Last date (YYYY-MM-DD). Overrides the config.
    #[arg(long)]
    end: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("marketstat_cli={0},marketstat_core={0},marketstat_runner={0}", cli.log_level)
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = CollectorConfig::load(cli.config.as_deref())
        .with_context(|| format!("loading config {:?}", cli.config))?;

    match cli.command {
        Commands::Collect { range } => {
            let config = apply_range(config, range)?;
            let summary = run_collect(&config)?;
            exit_on_failure(&summary);
            Ok(())
        }
        Commands::Consolidate => run_consolidate(&config),
        Commands::Run { range } => {
            let config = apply_range(config, range)?;
            let summary = run_collect(&config)?;
            run_consolidate(&config)?;
            exit_on_failure(&summary);
            Ok(())
        }
        Commands::Status => run_status(&config),
        Commands::Sources => {
            for spec in build_catalog(&config) {
                let headers: Vec<&str> = spec.headers().collect();
                println!("{:<22} {:<4} {}", spec.id, spec.exchange, headers.join(", "));
            }
            Ok(())
        }
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid date '{s}'"))
}

/// Fold command-line overrides into the loaded config.
fn apply_range(mut config: CollectorConfig, range: RangeArgs) -> Result<CollectorConfig> {
    if !range.sources.is_empty() {
        let known = source_ids(&config);
        let unknown: Vec<&String> = range.sources.iter().filter(|s| !known.contains(*s)).collect();
        if !unknown.is_empty() {
            bail!(
                "unknown source(s) {unknown:?}; known sources: {}",
                known.join(", ")
            );
        }
        config.sources = Some(range.sources);
    }
    if let Some(start) = range.start.as_deref() {
        config.start_date = parse_date(start)?;
    }
    if let Some(end) = range.end.as_deref() {
        config.end_date = Some(parse_date(end)?);
    }
    config.validate()?;
    Ok(config)
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

fn run_collect(config: &CollectorConfig) -> Result<CollectSummary> {
    let today = today();
    let sources = selected_sources(config);
    if sources.is_empty() {
        bail!("no sources selected");
    }
    tracing::info!(
        sources = sources.len(),
        start = %config.start_date,
        end = %config.end_or(today),
        "collection started"
    );
    Ok(collect_sources(config, &sources, today, &StdoutProgress))
}

fn exit_on_failure(summary: &CollectSummary) {
    if !summary.all_succeeded() {
        for (source, err) in &summary.errors {
            eprintln!("Error for {source}: {err}");
        }
        std::process::exit(1);
    }
}

fn run_consolidate(config: &CollectorConfig) -> Result<()> {
    let catalog = build_catalog(config);
    let table = consolidate_from_disk(&catalog, |id| config.cache_path(id))
        .context("reading source caches")?;
    let manifest = export_table(&table, &config.output)
        .with_context(|| format!("writing {}", config.output.display()))?;

    println!(
        "Wrote {} rows x {} columns to {} ({}..{})",
        manifest.rows,
        manifest.columns,
        config.output.display(),
        manifest.first_date.as_deref().unwrap_or("-"),
        manifest.last_date.as_deref().unwrap_or("-"),
    );
    Ok(())
}

fn run_status(config: &CollectorConfig) -> Result<()> {
    let catalog = build_catalog(config);
    let report = status_report(config, &catalog);
    print!("{report}");
    if !report.is_healthy() {
        std::process::exit(1);
    }
    Ok(())
}
