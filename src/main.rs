//! SafeTrend - disclosure-safe trend statistics for monthly event counts
//!
//! A CLI tool that redacts small counts in per-category monthly tables,
//! adds totals, compares two periods and writes a cumulative report and
//! a multi-panel chart.
//!
//! Exit codes:
//!   0 - Success (every measure processed)
//!   1 - Fatal error (arguments, configuration, missing inputs)
//!   2 - Run completed but at least one measure failed

mod analysis;
mod cli;
mod config;
mod error;
mod models;
mod pipeline;
mod report;
mod table;

use anyhow::{Context, Result};
use cli::Args;
use config::{Config, CONFIG_FILE};
use pipeline::{MeasureOutcome, Source};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Load configuration first so its verbosity setting reaches the logger
    let (mut config, config_source) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    // Initialize logging
    init_logging(args.log_level(config.general.verbose));

    info!("SafeTrend v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration: {}", config_source);
    debug!("Arguments: {:?}", args);

    match run(args, config) {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .safetrend.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!("⚠️  {} already exists. Remove it first or edit it manually.", CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to declare measures, periods and categories.");
    Ok(())
}

/// Initialize logging at the given level.
fn init_logging(level: tracing::Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Warning: a tracing subscriber was already installed");
    }
}

/// Run the whole pipeline. Returns exit code (0 or 2).
fn run(args: Args, config: Config) -> Result<i32> {
    let start_time = Instant::now();

    config.validate().context("Invalid configuration")?;

    let source = match args.released {
        Some(ref dir) => Source::Released(dir.clone()),
        None => Source::Raw,
    };

    pipeline::preflight(&config, &source)?;
    info!("{} measures ready", config.measures.len());

    if args.dry_run {
        return handle_dry_run(&config, &source, args.quiet);
    }

    // Released tables are already persisted; only raw runs write them.
    let table_dir = match source {
        Source::Raw => Some(config.general.output_dir.clone()),
        Source::Released(_) => None,
    };

    let outcomes = pipeline::run_measures(&config, &source, table_dir.as_deref(), args.quiet);
    let summary = pipeline::publish(&config, &outcomes)?;

    if !args.quiet {
        println!("\n📊 Summary:");
        for outcome in &outcomes {
            match outcome {
                MeasureOutcome::Completed(run) => println!(
                    "   ✅ {} ({} of {} periods withheld)",
                    run.measure.id,
                    run.table.suppressed_rows(),
                    run.table.table().len()
                ),
                MeasureOutcome::Failed { measure, error } => {
                    println!("   ❌ {}: {}", measure.id, error)
                }
            }
        }
        println!("   Report: {}", config.report_path().display());
        if config.chart.enabled {
            println!("   Chart: {}", config.chart_path().display());
        }
        println!("   Duration: {:.1}s", start_time.elapsed().as_secs_f64());
    }

    let failed = summary.failed();
    if failed > 0 {
        warn!("{} of {} measures failed", failed, summary.measures.len());
        return Ok(2);
    }

    Ok(0)
}

/// Handle --dry-run: process every measure in memory, print shapes, write nothing.
fn handle_dry_run(config: &Config, source: &Source, quiet: bool) -> Result<i32> {
    println!("\n🔍 Dry run: no files will be written\n");

    let outcomes = pipeline::run_measures(config, source, None, quiet);
    let mut failed = 0;

    for outcome in &outcomes {
        match outcome {
            MeasureOutcome::Completed(run) => {
                let table = run.table.table();
                println!(
                    "   📄 {}: {} periods x {} categories, {} withheld",
                    run.measure.id,
                    table.len(),
                    table.numerator.categories.len(),
                    run.table.suppressed_rows()
                );
            }
            MeasureOutcome::Failed { measure, error } => {
                failed += 1;
                println!("   ❌ {}: {}", measure.id, error);
            }
        }
    }

    println!("\n✅ Dry run complete.");
    Ok(if failed > 0 { 2 } else { 0 })
}

/// Load configuration from file or use defaults.
/// Also returns a description of where it came from, for logging.
fn load_config(args: &Args) -> Result<(Config, String)> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, config_path.display().to_string()));
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok((config, CONFIG_FILE.to_string())),
        Ok(None) => Ok((Config::default(), "built-in defaults".to_string())),
        Err(e) => Err(e.context(format!("Failed to load {}", CONFIG_FILE))),
    }
}
