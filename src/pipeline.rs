//! Per-measure orchestration.
//!
//! Each measure runs through load, redaction, totals, change analysis and
//! chart series on its own. A failing measure is recorded and the rest
//! carry on; outputs are then published in declaration order.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::analysis::{analyze, redact_and_total};
use crate::cli::OutputFormat;
use crate::config::Config;
use crate::error::MeasureError;
use crate::models::{ChangeResult, Measure, RedactedTable};
use crate::report::{
    chart_series, write_chart, write_json_report, ChartSeries, Markers, MeasureSummary, Panel,
    ReportLine, ReportWriter, RunSummary,
};
use crate::table::{load_period_table, read_header, save_redacted_table, BlankCell, LoadOptions};

/// Where measure tables come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Raw extracts in the configured input directory.
    Raw,
    /// Previously persisted redacted tables.
    Released(PathBuf),
}

impl Source {
    fn path(&self, config: &Config, measure: &Measure) -> PathBuf {
        match self {
            Source::Raw => config.input_path(measure),
            Source::Released(dir) => config.table_path_in(dir, measure),
        }
    }

    fn load_options(&self, config: &Config) -> LoadOptions {
        LoadOptions {
            blank: match self {
                Source::Raw => BlankCell::Absent,
                Source::Released(_) => BlankCell::Suppressed,
            },
            expected_categories: config.comparison.categories.clone(),
        }
    }
}

/// Everything derived for one measure.
#[derive(Debug, Clone)]
pub struct MeasureRun {
    pub measure: Measure,
    pub table: RedactedTable,
    pub change: ChangeResult,
    pub series: ChartSeries,
}

/// Result of processing one measure.
#[derive(Debug)]
pub enum MeasureOutcome {
    Completed(Box<MeasureRun>),
    Failed { measure: Measure, error: MeasureError },
}

impl MeasureOutcome {
    pub fn measure(&self) -> &Measure {
        match self {
            MeasureOutcome::Completed(run) => &run.measure,
            MeasureOutcome::Failed { measure, .. } => measure,
        }
    }
}

/// Check every measure's file and column groups before anything runs.
pub fn preflight(config: &Config, source: &Source) -> Result<()> {
    for measure in &config.measures {
        let path = source.path(config, measure);
        if !path.exists() {
            bail!(
                "Input for measure '{}' not found: {}",
                measure.id,
                path.display()
            );
        }

        let header = read_header(&path)
            .with_context(|| format!("Failed to read header of {}", path.display()))?;
        header
            .ensure_measure(measure)
            .with_context(|| format!("Measure '{}' does not match {}", measure.id, path.display()))?;
        debug!("Preflight ok for {}", measure.id);
    }
    Ok(())
}

/// Process one measure. `table_dir` receives the redacted table when set.
pub fn process_measure(
    config: &Config,
    measure: &Measure,
    source: &Source,
    table_dir: Option<&Path>,
) -> std::result::Result<MeasureRun, MeasureError> {
    let raw = load_period_table(
        &source.path(config, measure),
        measure,
        &source.load_options(config),
    )?;
    let table = redact_and_total(&raw, &config.suppression.small_counts)?;

    if table.suppressed_rows() > 0 {
        info!(
            "{}: {} of {} periods withheld",
            measure.id,
            table.suppressed_rows(),
            table.table().len()
        );
    }

    let change = analyze(&table, &config.comparison.to_comparison())?;
    let series = chart_series(&table);

    if let Some(dir) = table_dir {
        save_redacted_table(&config.table_path_in(dir, measure), &table)?;
    }

    Ok(MeasureRun {
        measure: measure.clone(),
        table,
        change,
        series,
    })
}

fn progress_bar(len: usize, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

/// Process all measures in declaration order.
pub fn run_measures(
    config: &Config,
    source: &Source,
    table_dir: Option<&Path>,
    quiet: bool,
) -> Vec<MeasureOutcome> {
    let pb = progress_bar(config.measures.len(), quiet);

    let outcomes = config
        .measures
        .iter()
        .map(|measure| {
            pb.set_message(measure.id.clone());
            let outcome = match process_measure(config, measure, source, table_dir) {
                Ok(run) => MeasureOutcome::Completed(Box::new(run)),
                Err(error) => {
                    error!("Measure {} failed: {}", measure.id, error);
                    MeasureOutcome::Failed {
                        measure: measure.clone(),
                        error,
                    }
                }
            };
            pb.inc(1);
            outcome
        })
        .collect();

    pb.finish_and_clear();
    outcomes
}

/// Build the JSON-serialisable summary of a run.
pub fn summarize(config: &Config, outcomes: &[MeasureOutcome]) -> RunSummary {
    let measures = outcomes
        .iter()
        .map(|outcome| {
            let measure = outcome.measure();
            match outcome {
                MeasureOutcome::Completed(run) => MeasureSummary {
                    id: measure.id.clone(),
                    numerator: measure.numerator.clone(),
                    denominator: measure.denominator.clone(),
                    succeeded: true,
                    change: Some(run.change.clone()),
                    bands: run.series.bands.clone(),
                    suppressed_periods: run.table.suppressed_rows(),
                    error: None,
                },
                MeasureOutcome::Failed { error, .. } => MeasureSummary {
                    id: measure.id.clone(),
                    numerator: measure.numerator.clone(),
                    denominator: measure.denominator.clone(),
                    succeeded: false,
                    change: None,
                    bands: Vec::new(),
                    suppressed_periods: 0,
                    error: Some(error.to_string()),
                },
            }
        })
        .collect();

    RunSummary {
        generated_at: Utc::now(),
        baseline: config.comparison.baseline,
        comparison: config.comparison.comparison,
        measures,
    }
}

/// Write the report and chart. Report lines follow declaration order.
pub fn publish(config: &Config, outcomes: &[MeasureOutcome]) -> Result<RunSummary> {
    let summary = summarize(config, outcomes);
    let report_path = config.report_path();

    match config.report.format {
        OutputFormat::Text => {
            let markers = Markers::from(&config.report);
            let writer = ReportWriter::new(&report_path, config.report.reset_on_first_measure);
            writer.start_run()?;
            let mut written = 0;
            for outcome in outcomes {
                if let MeasureOutcome::Completed(run) = outcome {
                    let line = ReportLine::new(&run.measure, run.change.clone());
                    writer.append(&line.render(&markers))?;
                    written += 1;
                }
            }
            if written == 0 {
                warn!("No measure succeeded; report has no lines for this run");
            } else {
                info!("Wrote {} report lines to {}", written, report_path.display());
            }
        }
        OutputFormat::Json => {
            write_json_report(&summary, &report_path)?;
            info!("Wrote JSON summary to {}", report_path.display());
        }
    }

    if config.chart.enabled {
        let panels: Vec<Panel> = outcomes
            .iter()
            .map(|outcome| match outcome {
                MeasureOutcome::Completed(run) => Panel::Series(run.series.clone()),
                MeasureOutcome::Failed { measure, error } => Panel::Unavailable {
                    numerator: measure.numerator.clone(),
                    reason: error.to_string(),
                },
            })
            .collect();
        write_chart(&panels, &config.chart, &config.chart_path())?;
    }

    Ok(summary)
}
