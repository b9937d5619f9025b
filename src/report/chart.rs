//! Chart series and SVG rendering.
//!
//! Presentation policy lives here: stacking order, axis labels, tick
//! thinning and the multi-panel layout. The series themselves are plain
//! data taken from a redacted table.

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;
use tracing::info;

use crate::analysis::uncertainty::bands;
use crate::config::ChartConfig;
use crate::models::{BlockKind, Count, RedactedTable, UncertaintyBand};

/// One stacked category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySeries {
    pub category: String,
    pub values: Vec<Count>,
}

/// Chart-ready data for one measure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub measure_id: String,
    pub numerator: String,
    pub dates: Vec<NaiveDate>,
    /// Categories in reverse declared order; the first is drawn at the bottom.
    pub stacks: Vec<CategorySeries>,
    pub totals: Vec<Count>,
    pub bands: Vec<UncertaintyBand>,
}

/// Build the stacked series for a measure's numerator.
pub fn chart_series(table: &RedactedTable) -> ChartSeries {
    let block = &table.table().numerator;
    let stacks = block
        .categories
        .iter()
        .enumerate()
        .rev()
        .map(|(i, category)| CategorySeries {
            category: category.clone(),
            values: block.category_series(i),
        })
        .collect();

    let totals = table.totals(BlockKind::Numerator).to_vec();

    ChartSeries {
        measure_id: table.measure().id.clone(),
        numerator: table.measure().numerator.clone(),
        dates: table.dates().to_vec(),
        stacks,
        bands: bands(table.dates(), &totals),
        totals,
    }
}

/// Phrase describing the people counted by a numerator.
pub fn people_phrase(numerator: &str) -> String {
    if numerator == "died" {
        "who died".to_string()
    } else {
        format!("with a recorded {}", numerator.replace('_', " "))
    }
}

/// Panel title, lettered `a)`, `b)`, ... in declaration order.
pub fn panel_title(index: usize, numerator: &str) -> String {
    let letter = (b'a' + (index % 26) as u8) as char;
    format!("{}) People {} each month:", letter, people_phrase(numerator))
}

pub fn y_axis_label(numerator: &str) -> String {
    format!("people {}", people_phrase(numerator))
}

/// Axis label for a period: month abbreviation, with the year on a second
/// line for January and for the first tick.
pub fn tick_label(date: NaiveDate, index: usize) -> String {
    let month = date.format("%b").to_string();
    if date.month() == 1 || index == 0 {
        format!("{}\n{}", month, date.year())
    } else {
        month
    }
}

/// Tick thinning: index `n` is hidden when `n > 0` and `(n + 1) % 2 != 0`.
pub fn tick_visible(n: usize) -> bool {
    !(n > 0 && (n + 1) % 2 != 0)
}

/// A chart panel: a measure's series, or a placeholder for a failed measure.
#[derive(Debug, Clone)]
pub enum Panel {
    Series(ChartSeries),
    Unavailable { numerator: String, reason: String },
}

const MARGIN_LEFT: f64 = 64.0;
const MARGIN_RIGHT: f64 = 16.0;
const MARGIN_TOP: f64 = 36.0;
const MARGIN_BOTTOM: f64 = 48.0;
const BAR_WIDTH: f64 = 0.85;
const GRID_LINES: usize = 5;

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Smallest 1/2/2.5/5 x 10^k value not below `x`.
fn nice_ceiling(x: f64) -> f64 {
    if x <= 0.0 {
        return 1.0;
    }
    let magnitude = 10f64.powi(x.log10().floor() as i32);
    [1.0, 2.0, 2.5, 5.0, 10.0]
        .iter()
        .map(|step| step * magnitude)
        .find(|v| *v >= x)
        .unwrap_or(10.0 * magnitude)
}

fn y_max(series: &ChartSeries) -> f64 {
    let peak = series
        .bands
        .iter()
        .filter_map(|b| {
            let total = b.total.value()? as f64;
            Some(total + b.half_width.value().unwrap_or(0.0))
        })
        .fold(0.0, f64::max);
    nice_ceiling(peak)
}

fn render_series(out: &mut String, series: &ChartSeries, index: usize, cfg: &ChartConfig) {
    let plot_w = cfg.panel_width as f64 - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_h = cfg.panel_height as f64 - MARGIN_TOP - MARGIN_BOTTOM;
    let bottom = MARGIN_TOP + plot_h;
    let ymax = y_max(series);
    let scale = |v: f64| bottom - v / ymax * plot_h;
    let n = series.dates.len().max(1);
    let slot = plot_w / n as f64;

    let _ = writeln!(
        out,
        r#"<text x="{}" y="20" font-size="13">{}</text>"#,
        MARGIN_LEFT,
        escape_xml(&panel_title(index, &series.numerator))
    );
    let _ = writeln!(
        out,
        r#"<text transform="translate(14,{:.1}) rotate(-90)" font-size="11" text-anchor="middle">{}</text>"#,
        MARGIN_TOP + plot_h / 2.0,
        escape_xml(&y_axis_label(&series.numerator))
    );

    // horizontal grid, y from zero
    for k in 0..=GRID_LINES {
        let v = ymax * k as f64 / GRID_LINES as f64;
        let y = scale(v);
        let _ = writeln!(
            out,
            r##"<line x1="{:.1}" y1="{y:.1}" x2="{:.1}" y2="{y:.1}" stroke="#666666" stroke-opacity="0.2"/>"##,
            MARGIN_LEFT,
            MARGIN_LEFT + plot_w
        );
        let _ = writeln!(
            out,
            r#"<text x="{:.1}" y="{:.1}" font-size="9" text-anchor="end">{}</text>"#,
            MARGIN_LEFT - 4.0,
            y + 3.0,
            v
        );
    }

    for (row, date) in series.dates.iter().enumerate() {
        let x = MARGIN_LEFT + slot * row as f64 + slot * (1.0 - BAR_WIDTH) / 2.0;
        let width = slot * BAR_WIDTH;
        let mut base = 0.0;

        for (pos, stack) in series.stacks.iter().enumerate() {
            let Some(v) = stack.values[row].value() else {
                continue;
            };
            let color = &cfg.colors[pos % cfg.colors.len()];
            let top = base + v as f64;
            let _ = writeln!(
                out,
                r#"<rect x="{x:.1}" y="{:.1}" width="{width:.1}" height="{:.1}" fill="{}" fill-opacity="0.9"/>"#,
                scale(top),
                scale(base) - scale(top),
                color
            );
            base = top;
        }

        if let (Some(total), Some(half)) = (
            series.bands[row].total.value(),
            series.bands[row].half_width.value(),
        ) {
            let cx = x + width / 2.0;
            let total = total as f64;
            let (lo, hi) = (scale((total - half).max(0.0)), scale(total + half));
            let _ = writeln!(
                out,
                r#"<path d="M{cx:.1},{lo:.1}V{hi:.1}M{:.1},{lo:.1}H{:.1}M{:.1},{hi:.1}H{:.1}" stroke="black" fill="none"/>"#,
                cx - 2.0,
                cx + 2.0,
                cx - 2.0,
                cx + 2.0
            );
        }

        if tick_visible(row) {
            let cx = x + width / 2.0;
            let _ = write!(
                out,
                r#"<text x="{cx:.1}" y="{:.1}" font-size="9" text-anchor="middle">"#,
                bottom + 12.0
            );
            for (i, part) in tick_label(*date, row).split('\n').enumerate() {
                let dy = if i == 0 { 0.0 } else { 11.0 };
                let _ = write!(
                    out,
                    r#"<tspan x="{cx:.1}" dy="{dy}">{}</tspan>"#,
                    escape_xml(part)
                );
            }
            let _ = writeln!(out, "</text>");
        }
    }

    // legend in declared order, lower left
    let legend: Vec<_> = series.stacks.iter().enumerate().rev().collect();
    for (line, (pos, stack)) in legend.iter().enumerate() {
        let y = bottom - 12.0 * (legend.len() - line) as f64;
        let _ = writeln!(
            out,
            r#"<rect x="{:.1}" y="{:.1}" width="8" height="8" fill="{}"/><text x="{:.1}" y="{:.1}" font-size="9">{}</text>"#,
            MARGIN_LEFT + 4.0,
            y - 7.0,
            cfg.colors[pos % cfg.colors.len()],
            MARGIN_LEFT + 16.0,
            y,
            escape_xml(&stack.category)
        );
    }
}

fn render_unavailable(out: &mut String, numerator: &str, reason: &str, index: usize, cfg: &ChartConfig) {
    let _ = writeln!(
        out,
        r#"<text x="{}" y="20" font-size="13">{}</text>"#,
        MARGIN_LEFT,
        escape_xml(&panel_title(index, numerator))
    );
    let _ = writeln!(
        out,
        r##"<text x="{:.1}" y="{:.1}" font-size="11" text-anchor="middle" fill="#999999">{}</text>"##,
        cfg.panel_width as f64 / 2.0,
        cfg.panel_height as f64 / 2.0,
        escape_xml(&format!("No data: {}", reason))
    );
}

/// Render all panels into one SVG document, laid out row by row.
pub fn render_svg(panels: &[Panel], cfg: &ChartConfig) -> String {
    let columns = cfg.columns.max(1);
    let rows = panels.len().div_ceil(columns).max(1);
    let width = columns * cfg.panel_width;
    let height = rows * cfg.panel_height;

    let mut out = String::new();
    let _ = writeln!(
        out,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}" font-family="sans-serif">"#
    );
    let _ = writeln!(out, r#"<rect width="100%" height="100%" fill="white"/>"#);

    for (index, panel) in panels.iter().enumerate() {
        let dx = (index % columns) * cfg.panel_width;
        let dy = (index / columns) * cfg.panel_height;
        let _ = writeln!(out, r#"<g transform="translate({dx},{dy})">"#);
        match panel {
            Panel::Series(series) => render_series(&mut out, series, index, cfg),
            Panel::Unavailable { numerator, reason } => {
                render_unavailable(&mut out, numerator, reason, index, cfg)
            }
        }
        let _ = writeln!(out, "</g>");
    }

    out.push_str("</svg>\n");
    out
}

/// Render and save the multi-panel chart.
pub fn write_chart(panels: &[Panel], cfg: &ChartConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, render_svg(panels, cfg))
        .with_context(|| format!("Failed to write chart to {}", path.display()))?;
    info!("Saved chart with {} panels to {}", panels.len(), path.display());
    Ok(())
}
