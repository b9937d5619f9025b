//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use chrono::NaiveDate;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// SafeTrend - disclosure-safe trend statistics for monthly event counts
///
/// Redacts small counts, adds category totals, compares two periods and
/// writes a tab-separated report plus a multi-panel chart.
///
/// Examples:
///   safetrend
///   safetrend --input-dir output --baseline 2019-04-01 --comparison 2020-04-01
///   safetrend --released released_output --format json
///   safetrend --dry-run
///   safetrend --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to configuration file
    ///
    /// If not specified, looks for .safetrend.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory holding the per-measure extracts
    #[arg(long, value_name = "DIR", env = "SAFETREND_INPUT_DIR")]
    pub input_dir: Option<PathBuf>,

    /// Directory receiving redacted tables, report and chart
    #[arg(short, long, value_name = "DIR", env = "SAFETREND_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Analyse previously released redacted tables from this directory
    ///
    /// Skips the raw extracts; blank cells are read as withheld counts.
    #[arg(long, value_name = "DIR")]
    pub released: Option<PathBuf>,

    /// Baseline period (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub baseline: Option<NaiveDate>,

    /// Comparison period (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub comparison: Option<NaiveDate>,

    /// Category whose change is reported beside the total
    #[arg(long, value_name = "CATEGORY")]
    pub headline: Option<String>,

    /// Category whose share of the comparison total is reported
    #[arg(long, value_name = "CATEGORY")]
    pub attribution: Option<String>,

    /// Report format (text, json)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Do not render the chart
    #[arg(long)]
    pub no_chart: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Dry run: load, validate and redact every measure without writing files
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default .safetrend.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Tab-separated lines, one per measure (default)
    #[default]
    Text,
    /// JSON run summary
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let (Some(baseline), Some(comparison)) = (self.baseline, self.comparison) {
            if baseline == comparison {
                return Err("Baseline and comparison periods must differ".to_string());
            }
        }

        for (flag, dir) in [("--input-dir", &self.input_dir), ("--released", &self.released)] {
            if let Some(path) = dir {
                if !path.exists() {
                    return Err(format!("{} does not exist: {}", flag, path.display()));
                }
                if !path.is_dir() {
                    return Err(format!("{} is not a directory: {}", flag, path.display()));
                }
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    /// `config_verbose` is the `general.verbose` setting from the config file.
    pub fn log_level(&self, config_verbose: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || config_verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            config: None,
            input_dir: None,
            output_dir: None,
            released: None,
            baseline: None,
            comparison: None,
            headline: None,
            attribution: None,
            format: None,
            no_chart: false,
            verbose: false,
            quiet: false,
            dry_run: false,
            init_config: false,
        }
    }

    #[test]
    fn test_parse_flags() {
        let args = Args::try_parse_from([
            "safetrend",
            "--baseline",
            "2019-04-01",
            "--comparison",
            "2020-04-01",
            "--format",
            "json",
            "--no-chart",
        ])
        .unwrap();

        assert_eq!(args.baseline, NaiveDate::from_ymd_opt(2019, 4, 1));
        assert_eq!(args.format, Some(OutputFormat::Json));
        assert!(args.no_chart);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_date() {
        assert!(Args::try_parse_from(["safetrend", "--baseline", "April 2019"]).is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_same_periods() {
        let mut args = make_args();
        args.baseline = NaiveDate::from_ymd_opt(2020, 4, 1);
        args.comparison = args.baseline;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_missing_dir() {
        let mut args = make_args();
        args.released = Some(PathBuf::from("/definitely/not/here"));
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(false), tracing::Level::INFO);
        assert_eq!(args.log_level(true), tracing::Level::DEBUG);

        args.verbose = true;
        assert_eq!(args.log_level(false), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(true), tracing::Level::ERROR);
    }
}
