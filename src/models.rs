//! Data models for measure tables and derived statistics.
//!
//! This module contains the core data structures that flow through the
//! pipeline: the measure definition, per-period count tables, and the
//! read-only statistics derived from a redacted table.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{MeasureError, Result};

/// A named numerator/denominator column pair tracked per period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measure {
    /// Identifier used in file names (e.g. `died_rate`).
    pub id: String,
    /// Column group holding the event counts.
    pub numerator: String,
    /// Column group holding the population counts.
    pub denominator: String,
}

impl Measure {
    pub fn new(id: &str, numerator: &str, denominator: &str) -> Self {
        Self {
            id: id.to_string(),
            numerator: numerator.to_string(),
            denominator: denominator.to_string(),
        }
    }

    /// Name of the derived numerator total column.
    pub fn total_numerator_column(&self) -> String {
        format!("total_{}", self.numerator)
    }

    /// Name of the derived denominator total column.
    pub fn total_denominator_column(&self) -> String {
        format!("total_{}", self.denominator)
    }
}

/// A single table cell: either a published count or a withheld one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Count {
    Value(u64),
    Suppressed,
}

impl Count {
    pub fn value(self) -> Option<u64> {
        match self {
            Count::Value(v) => Some(v),
            Count::Suppressed => None,
        }
    }

    pub fn is_suppressed(self) -> bool {
        matches!(self, Count::Suppressed)
    }
}

impl fmt::Display for Count {
    /// Suppressed cells are written blank, matching the persisted table format.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Count::Value(v) => write!(f, "{}", v),
            Count::Suppressed => Ok(()),
        }
    }
}

/// A derived statistic.
///
/// `Suppressed` means an input was withheld; `Undefined` means the
/// arithmetic itself had no answer (division by zero).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stat {
    Value(f64),
    Suppressed,
    Undefined,
}

impl Stat {
    pub fn value(self) -> Option<f64> {
        match self {
            Stat::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Combine two statistics. Suppression wins over undefinedness so a
    /// withheld input is never reported as a plain arithmetic gap.
    pub fn zip_with(self, other: Stat, f: impl FnOnce(f64, f64) -> Stat) -> Stat {
        match (self, other) {
            (Stat::Suppressed, _) | (_, Stat::Suppressed) => Stat::Suppressed,
            (Stat::Undefined, _) | (_, Stat::Undefined) => Stat::Undefined,
            (Stat::Value(a), Stat::Value(b)) => f(a, b),
        }
    }

    pub fn map(self, f: impl FnOnce(f64) -> f64) -> Stat {
        match self {
            Stat::Value(v) => Stat::Value(f(v)),
            other => other,
        }
    }
}

impl From<Count> for Stat {
    fn from(count: Count) -> Self {
        match count {
            Count::Value(v) => Stat::Value(v as f64),
            Count::Suppressed => Stat::Suppressed,
        }
    }
}

/// Which half of a measure a column group belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Numerator,
    Denominator,
}

/// Column selector for change analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Column {
    Total,
    Category(String),
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Column::Total => write!(f, "total"),
            Column::Category(name) => write!(f, "{}", name),
        }
    }
}

/// One column group (numerator or denominator) broken down by category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Column group name, e.g. `died` or `population`.
    pub name: String,
    /// Category names in declared order.
    pub categories: Vec<String>,
    /// One row per period, each with one cell per category.
    pub rows: Vec<Vec<Count>>,
}

impl Block {
    pub fn new(name: &str, categories: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            categories,
            rows: Vec::new(),
        }
    }

    pub fn category_index(&self, category: &str) -> Option<usize> {
        self.categories.iter().position(|c| c == category)
    }

    /// All cells of one category, in period order.
    pub fn category_series(&self, index: usize) -> Vec<Count> {
        self.rows.iter().map(|row| row[index]).collect()
    }
}

/// Per-period category counts for one measure, sorted by date ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodTable {
    pub measure: Measure,
    pub dates: Vec<NaiveDate>,
    pub numerator: Block,
    pub denominator: Block,
}

impl PeriodTable {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    #[allow(dead_code)] // Pairs with len()
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn block(&self, kind: BlockKind) -> &Block {
        match kind {
            BlockKind::Numerator => &self.numerator,
            BlockKind::Denominator => &self.denominator,
        }
    }

    /// Row index of a period, or `MissingPeriod`.
    pub fn period_index(&self, date: NaiveDate) -> Result<usize> {
        self.dates
            .binary_search(&date)
            .map_err(|_| MeasureError::MissingPeriod(date))
    }

    /// Whether any numerator or denominator cell of a row is withheld.
    pub fn row_has_suppression(&self, row: usize) -> bool {
        self.numerator.rows[row]
            .iter()
            .chain(self.denominator.rows[row].iter())
            .any(|c| c.is_suppressed())
    }
}

/// A redacted table carrying its cross-category totals.
///
/// Only the aggregator builds these; totals are fixed once computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedactedTable {
    table: PeriodTable,
    total_numerator: Vec<Count>,
    total_denominator: Vec<Count>,
}

impl RedactedTable {
    pub(crate) fn from_parts(
        table: PeriodTable,
        total_numerator: Vec<Count>,
        total_denominator: Vec<Count>,
    ) -> Self {
        Self {
            table,
            total_numerator,
            total_denominator,
        }
    }

    pub fn table(&self) -> &PeriodTable {
        &self.table
    }

    pub fn measure(&self) -> &Measure {
        &self.table.measure
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.table.dates
    }

    pub fn totals(&self, kind: BlockKind) -> &[Count] {
        match kind {
            BlockKind::Numerator => &self.total_numerator,
            BlockKind::Denominator => &self.total_denominator,
        }
    }

    /// Number of periods withheld by disclosure control.
    pub fn suppressed_rows(&self) -> usize {
        self.total_numerator
            .iter()
            .filter(|c| c.is_suppressed())
            .count()
    }

    /// The cell selected by `column` for a given row.
    pub fn cell(&self, kind: BlockKind, column: &Column, row: usize) -> Result<Count> {
        match column {
            Column::Total => Ok(self.totals(kind)[row]),
            Column::Category(name) => {
                let block = self.table.block(kind);
                let index =
                    block
                        .category_index(name)
                        .ok_or_else(|| MeasureError::MissingCategory {
                            group: block.name.clone(),
                            category: name.clone(),
                        })?;
                Ok(block.rows[row][index])
            }
        }
    }
}

/// Absolute and relative change of one column between two periods.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub absolute_difference: Stat,
    pub percent_change: Stat,
}

/// Change statistics for one measure between a baseline and comparison period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeResult {
    pub measure_id: String,
    pub baseline: NaiveDate,
    pub comparison: NaiveDate,
    /// Change of the numerator total.
    pub total: Change,
    /// Change of the headline category.
    pub headline: Change,
    /// Percentage of the comparison total contributed by the attribution category.
    pub attributable_share: Stat,
}

/// Approximate 95% half-width around a period total.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UncertaintyBand {
    pub date: NaiveDate,
    pub total: Count,
    pub half_width: Stat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_column_names() {
        let measure = Measure::new("died_rate", "died", "population");
        assert_eq!(measure.total_numerator_column(), "total_died");
        assert_eq!(measure.total_denominator_column(), "total_population");
    }

    #[test]
    fn test_count_display_blank_when_suppressed() {
        assert_eq!(Count::Value(12).to_string(), "12");
        assert_eq!(Count::Suppressed.to_string(), "");
    }

    #[test]
    fn test_stat_zip_propagation() {
        let add = |a: f64, b: f64| Stat::Value(a + b);
        assert_eq!(Stat::Value(1.0).zip_with(Stat::Value(2.0), add), Stat::Value(3.0));
        assert_eq!(Stat::Suppressed.zip_with(Stat::Value(2.0), add), Stat::Suppressed);
        assert_eq!(Stat::Undefined.zip_with(Stat::Value(2.0), add), Stat::Undefined);
        assert_eq!(Stat::Undefined.zip_with(Stat::Suppressed, add), Stat::Suppressed);
    }

    #[test]
    fn test_stat_from_count() {
        assert_eq!(Stat::from(Count::Value(4)), Stat::Value(4.0));
        assert_eq!(Stat::from(Count::Suppressed), Stat::Suppressed);
        assert_eq!(Stat::Suppressed.map(|v| v * 2.0), Stat::Suppressed);
    }

    #[test]
    fn test_period_index() {
        let d = |m| NaiveDate::from_ymd_opt(2020, m, 1).unwrap();
        let table = PeriodTable {
            measure: Measure::new("m", "n", "d"),
            dates: vec![d(1), d(2), d(3)],
            numerator: Block::new("n", vec![]),
            denominator: Block::new("d", vec![]),
        };
        assert_eq!(table.period_index(d(2)).unwrap(), 1);
        assert!(matches!(
            table.period_index(d(5)),
            Err(MeasureError::MissingPeriod(_))
        ));
    }
}
