//! Configuration file handling.
//!
//! This module handles loading, merging and validating configuration from
//! `.safetrend.toml` files.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use crate::analysis::Comparison;
use crate::cli::OutputFormat;
use crate::models::Measure;

/// Default configuration file name.
pub const CONFIG_FILE: &str = ".safetrend.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Measures, in report and chart order.
    #[serde(default = "default_measures")]
    pub measures: Vec<Measure>,

    /// Disclosure control settings.
    #[serde(default)]
    pub suppression: SuppressionConfig,

    /// Periods and categories to compare.
    #[serde(default)]
    pub comparison: ComparisonConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,

    /// Chart settings.
    #[serde(default)]
    pub chart: ChartConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            measures: default_measures(),
            suppression: SuppressionConfig::default(),
            comparison: ComparisonConfig::default(),
            report: ReportConfig::default(),
            chart: ChartConfig::default(),
        }
    }
}

fn default_measures() -> Vec<Measure> {
    vec![
        Measure::new("died_rate", "died", "population"),
        Measure::new("sglt2i_rate", "sglt2", "population"),
        Measure::new("dpp4i_rate", "dpp4", "population"),
        Measure::new("sulf_rate", "sulfonylurea", "population"),
    ]
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Directory holding the per-measure extracts.
    #[serde(default = "default_dir")]
    pub input_dir: PathBuf,

    /// Directory receiving tables, report and chart.
    #[serde(default = "default_dir")]
    pub output_dir: PathBuf,

    /// Extract file name; `{id}` is replaced by the measure id.
    #[serde(default = "default_input_pattern")]
    pub input_pattern: String,

    /// Redacted table file name; `{id}` is replaced by the measure id.
    #[serde(default = "default_table_pattern")]
    pub table_pattern: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            input_dir: default_dir(),
            output_dir: default_dir(),
            input_pattern: default_input_pattern(),
            table_pattern: default_table_pattern(),
            verbose: false,
        }
    }
}

fn default_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_input_pattern() -> String {
    "measure_{id}.csv".to_string()
}

fn default_table_pattern() -> String {
    "table_{id}.csv".to_string()
}

/// Small-count suppression settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuppressionConfig {
    /// Counts considered individually disclosive.
    #[serde(default = "default_small_counts")]
    pub small_counts: BTreeSet<u64>,
}

impl Default for SuppressionConfig {
    fn default() -> Self {
        Self {
            small_counts: default_small_counts(),
        }
    }
}

fn default_small_counts() -> BTreeSet<u64> {
    crate::analysis::default_small_counts()
}

/// Comparison periods and categories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonConfig {
    #[serde(default = "default_baseline")]
    pub baseline: NaiveDate,

    #[serde(default = "default_comparison")]
    pub comparison: NaiveDate,

    /// Category whose change is reported beside the total.
    #[serde(default = "default_headline")]
    pub headline_category: String,

    /// Category whose share of the comparison total is reported.
    /// Falls back to the headline category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribution_category: Option<String>,

    /// Categories every table must carry. Empty accepts whatever is present.
    #[serde(default)]
    pub categories: Vec<String>,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            baseline: default_baseline(),
            comparison: default_comparison(),
            headline_category: default_headline(),
            attribution_category: None,
            categories: Vec::new(),
        }
    }
}

fn default_baseline() -> NaiveDate {
    NaiveDate::from_ymd_opt(2019, 4, 1).unwrap_or(NaiveDate::MIN)
}

fn default_comparison() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 4, 1).unwrap_or(NaiveDate::MIN)
}

fn default_headline() -> String {
    "General population".to_string()
}

impl ComparisonConfig {
    pub fn to_comparison(&self) -> Comparison {
        Comparison {
            baseline: self.baseline,
            comparison: self.comparison,
            headline_category: self.headline_category.clone(),
            attribution_category: self
                .attribution_category
                .clone()
                .unwrap_or_else(|| self.headline_category.clone()),
        }
    }
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Report file name, relative to the output directory.
    #[serde(default = "default_report_path")]
    pub path: PathBuf,

    /// Text (tab-separated lines) or JSON summary.
    #[serde(default)]
    pub format: OutputFormat,

    /// Clear the report at the start of each run.
    #[serde(default = "default_true")]
    pub reset_on_first_measure: bool,

    /// Printed in place of withheld statistics.
    #[serde(default = "default_suppressed_marker")]
    pub suppressed_marker: String,

    /// Printed in place of undefined statistics (e.g. zero baseline).
    #[serde(default = "default_undefined_marker")]
    pub undefined_marker: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            path: default_report_path(),
            format: OutputFormat::default(),
            reset_on_first_measure: true,
            suppressed_marker: default_suppressed_marker(),
            undefined_marker: default_undefined_marker(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_report_path() -> PathBuf {
    PathBuf::from("table.txt")
}

fn default_suppressed_marker() -> String {
    "[REDACTED]".to_string()
}

fn default_undefined_marker() -> String {
    "NA".to_string()
}

/// Chart rendering settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartConfig {
    /// Render the chart at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Chart file name, relative to the output directory.
    #[serde(default = "default_chart_path")]
    pub path: PathBuf,

    /// Panels per row.
    #[serde(default = "default_columns")]
    pub columns: usize,

    #[serde(default = "default_panel_width")]
    pub panel_width: usize,

    #[serde(default = "default_panel_height")]
    pub panel_height: usize,

    /// Fill colours, bottom stack first.
    #[serde(default = "default_colors")]
    pub colors: Vec<String>,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_chart_path(),
            columns: default_columns(),
            panel_width: default_panel_width(),
            panel_height: default_panel_height(),
            colors: default_colors(),
        }
    }
}

fn default_chart_path() -> PathBuf {
    PathBuf::from("event_count_time_series.svg")
}

fn default_columns() -> usize {
    2
}

fn default_panel_width() -> usize {
    500
}

fn default_panel_height() -> usize {
    375
}

fn default_colors() -> Vec<String> {
    vec!["#176dde", "#e6e600", "#ffad33"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when given explicitly.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref dir) = args.input_dir {
            self.general.input_dir = dir.clone();
        }
        if let Some(ref dir) = args.output_dir {
            self.general.output_dir = dir.clone();
        }
        if let Some(date) = args.baseline {
            self.comparison.baseline = date;
        }
        if let Some(date) = args.comparison {
            self.comparison.comparison = date;
        }
        if let Some(ref category) = args.headline {
            self.comparison.headline_category = category.clone();
        }
        if let Some(ref category) = args.attribution {
            self.comparison.attribution_category = Some(category.clone());
        }
        if let Some(format) = args.format {
            self.report.format = format;
        }
        if args.no_chart {
            self.chart.enabled = false;
        }
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Check the configuration before any measure runs.
    pub fn validate(&self) -> Result<()> {
        if self.measures.is_empty() {
            bail!("No measures configured");
        }

        let mut ids = HashSet::new();
        for measure in &self.measures {
            if measure.id.trim().is_empty() {
                bail!("Measure with empty id");
            }
            if !ids.insert(measure.id.as_str()) {
                bail!("Duplicate measure id '{}'", measure.id);
            }
            if measure.numerator.trim().is_empty() || measure.denominator.trim().is_empty() {
                bail!("Measure '{}' needs both a numerator and a denominator", measure.id);
            }
            if measure.numerator == measure.denominator {
                bail!(
                    "Measure '{}' uses '{}' as both numerator and denominator",
                    measure.id,
                    measure.numerator
                );
            }
        }

        if self.suppression.small_counts.is_empty() {
            bail!("Suppression set is empty; refusing to publish unredacted counts");
        }

        if self.comparison.baseline == self.comparison.comparison {
            bail!(
                "Baseline and comparison periods are both {}",
                self.comparison.baseline
            );
        }

        if self.comparison.headline_category.trim().is_empty() {
            bail!("Headline category must not be empty");
        }

        if self.chart.enabled {
            if self.chart.columns == 0 {
                bail!("Chart needs at least one column");
            }
            if self.chart.colors.is_empty() {
                bail!("Chart needs at least one colour");
            }
        }

        Ok(())
    }

    /// Path of a measure's raw extract.
    pub fn input_path(&self, measure: &Measure) -> PathBuf {
        self.general
            .input_dir
            .join(self.general.input_pattern.replace("{id}", &measure.id))
    }

    /// Path of a measure's redacted table inside `dir`.
    pub fn table_path_in(&self, dir: &Path, measure: &Measure) -> PathBuf {
        dir.join(self.general.table_pattern.replace("{id}", &measure.id))
    }

    pub fn report_path(&self) -> PathBuf {
        self.general.output_dir.join(&self.report.path)
    }

    pub fn chart_path(&self) -> PathBuf {
        self.general.output_dir.join(&self.chart.path)
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
