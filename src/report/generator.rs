//! Text and JSON report generation.
//!
//! The text report is one tab-separated line per measure, appended in
//! declaration order to a single cumulative file. The JSON report is a
//! structured summary of the whole run.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::ReportConfig;
use crate::models::{ChangeResult, Measure, Stat, UncertaintyBand};

/// Placeholders printed for statistics that have no numeric value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Markers {
    pub suppressed: String,
    pub undefined: String,
}

impl Default for Markers {
    fn default() -> Self {
        Self {
            suppressed: "[REDACTED]".to_string(),
            undefined: "NA".to_string(),
        }
    }
}

impl From<&ReportConfig> for Markers {
    fn from(config: &ReportConfig) -> Self {
        Self {
            suppressed: config.suppressed_marker.clone(),
            undefined: config.undefined_marker.clone(),
        }
    }
}

/// Format a statistic with a fixed number of decimals.
pub fn format_stat(stat: Stat, decimals: usize, markers: &Markers) -> String {
    match stat {
        Stat::Value(v) => format!("{:.*}", decimals, v),
        Stat::Suppressed => markers.suppressed.clone(),
        Stat::Undefined => markers.undefined.clone(),
    }
}

/// One measure's line in the cumulative report.
#[derive(Debug, Clone)]
pub struct ReportLine {
    pub numerator: String,
    pub change: ChangeResult,
}

impl ReportLine {
    pub fn new(measure: &Measure, change: ChangeResult) -> Self {
        Self {
            numerator: measure.numerator.clone(),
            change,
        }
    }

    /// `numerator  diff (pct)  headline_diff (headline_pct)  share`, tab-separated.
    pub fn render(&self, markers: &Markers) -> String {
        let c = &self.change;
        format!(
            "{}\t{} ({})\t{} ({})\t{}",
            self.numerator,
            format_stat(c.total.absolute_difference, 0, markers),
            format_stat(c.total.percent_change, 1, markers),
            format_stat(c.headline.absolute_difference, 0, markers),
            format_stat(c.headline.percent_change, 1, markers),
            format_stat(c.attributable_share, 1, markers),
        )
    }
}

/// Appends lines to the cumulative text report.
pub struct ReportWriter {
    path: PathBuf,
    reset_on_first_measure: bool,
}

impl ReportWriter {
    pub fn new(path: &Path, reset_on_first_measure: bool) -> Self {
        Self {
            path: path.to_path_buf(),
            reset_on_first_measure,
        }
    }

    #[allow(dead_code)] // Accessor used by callers that log the destination
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_parent(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create report directory {}", parent.display())
                })?;
            }
        }
        Ok(())
    }

    /// Mark the start of a run. Clears the report when resetting is enabled,
    /// so a run in which every measure fails leaves an empty report.
    pub fn start_run(&self) -> Result<()> {
        if !self.reset_on_first_measure {
            return Ok(());
        }
        self.ensure_parent()?;
        debug!("Resetting report {}", self.path.display());
        std::fs::File::create(&self.path)
            .with_context(|| format!("Failed to reset report {}", self.path.display()))?;
        Ok(())
    }

    /// Append one line.
    pub fn append(&self, line: &str) -> Result<()> {
        self.ensure_parent()?;

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open report {}", self.path.display()))?;

        writeln!(file, "{}", line)
            .with_context(|| format!("Failed to write report {}", self.path.display()))?;
        Ok(())
    }
}

/// Outcome of one measure in the JSON summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasureSummary {
    pub id: String,
    pub numerator: String,
    pub denominator: String,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change: Option<ChangeResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bands: Vec<UncertaintyBand>,
    pub suppressed_periods: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// JSON summary of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub generated_at: DateTime<Utc>,
    pub baseline: NaiveDate,
    pub comparison: NaiveDate,
    pub measures: Vec<MeasureSummary>,
}

impl RunSummary {
    pub fn failed(&self) -> usize {
        self.measures.iter().filter(|m| !m.succeeded).count()
    }
}

/// Generate a JSON report.
pub fn generate_json_report(summary: &RunSummary) -> Result<String> {
    serde_json::to_string_pretty(summary).map_err(Into::into)
}

/// Write a JSON report to a file.
pub fn write_json_report(summary: &RunSummary, path: &Path) -> Result<()> {
    let content = generate_json_report(summary)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write report to {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Change, Count};

    fn date(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    fn change(total: Change, headline: Change, share: Stat) -> ChangeResult {
        ChangeResult {
            measure_id: "died_rate".to_string(),
            baseline: date(2019, 4),
            comparison: date(2020, 4),
            total,
            headline,
            attributable_share: share,
        }
    }

    fn measure() -> Measure {
        Measure::new("died_rate", "died", "population")
    }

    #[test]
    fn test_render_line() {
        let line = ReportLine::new(
            &measure(),
            change(
                Change {
                    absolute_difference: Stat::Value(20.0),
                    percent_change: Stat::Value(20.0),
                },
                Change {
                    absolute_difference: Stat::Value(-15.0),
                    percent_change: Stat::Value(-25.0),
                },
                Stat::Value(62.5),
            ),
        );

        assert_eq!(
            line.render(&Markers::default()),
            "died\t20 (20.0)\t-15 (-25.0)\t62.5"
        );
    }

    #[test]
    fn test_render_line_with_gaps() {
        let line = ReportLine::new(
            &measure(),
            change(
                Change {
                    absolute_difference: Stat::Value(50.0),
                    percent_change: Stat::Undefined,
                },
                Change {
                    absolute_difference: Stat::Suppressed,
                    percent_change: Stat::Suppressed,
                },
                Stat::Undefined,
            ),
        );

        let markers = Markers {
            suppressed: "*".to_string(),
            undefined: String::new(),
        };
        assert_eq!(line.render(&markers), "died\t50 ()\t* (*)\t");
    }

    #[test]
    fn test_writer_resets_at_start_of_run() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("output").join("table.txt");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "stale\n").unwrap();

        let writer = ReportWriter::new(&path, true);
        writer.start_run().unwrap();
        writer.append("died\t1").unwrap();
        writer.append("sglt2\t2").unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "died\t1\nsglt2\t2\n");
    }

    #[test]
    fn test_writer_keeps_history_when_reset_disabled() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("table.txt");
        std::fs::write(&path, "previous\n").unwrap();

        let writer = ReportWriter::new(&path, false);
        writer.start_run().unwrap();
        writer.append("died\t1").unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "previous\ndied\t1\n");
    }

    #[test]
    fn test_reset_creates_empty_report() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("table.txt");

        ReportWriter::new(&path, true).start_run().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn test_generate_json_report() {
        let summary = RunSummary {
            generated_at: Utc::now(),
            baseline: date(2019, 4),
            comparison: date(2020, 4),
            measures: vec![
                MeasureSummary {
                    id: "died_rate".to_string(),
                    numerator: "died".to_string(),
                    denominator: "population".to_string(),
                    succeeded: true,
                    change: None,
                    bands: vec![UncertaintyBand {
                        date: date(2020, 4),
                        total: Count::Suppressed,
                        half_width: Stat::Suppressed,
                    }],
                    suppressed_periods: 1,
                    error: None,
                },
                MeasureSummary {
                    id: "sulf_rate".to_string(),
                    numerator: "sulfonylurea".to_string(),
                    denominator: "population".to_string(),
                    succeeded: false,
                    change: None,
                    bands: Vec::new(),
                    suppressed_periods: 0,
                    error: Some("Period 2020-04-01 is not present in the table".to_string()),
                },
            ],
        };

        let json = generate_json_report(&summary).unwrap();
        assert!(json.contains("\"died_rate\""));
        assert!(json.contains("\"suppressed\""));
        assert!(json.contains("not present"));
        assert_eq!(summary.failed(), 1);
    }
}
