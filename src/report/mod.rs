//! Report assembly: the cumulative text report, the JSON run summary and
//! the multi-panel chart.

pub mod chart;
pub mod generator;

pub use chart::{chart_series, write_chart, ChartSeries, Panel};
pub use generator::{
    write_json_report, Markers, MeasureSummary, ReportLine, ReportWriter, RunSummary,
};
