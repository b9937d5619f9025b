//! Two-level-header CSV loading.
//!
//! Header row one names the column group (`date`, a numerator or
//! denominator name, or a `total_*` column); header row two names the
//! category within that group. Groups other than the measure's numerator
//! and denominator are ignored.

use chrono::{Months, NaiveDate};
use csv::{ReaderBuilder, StringRecord};
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{MeasureError, Result};
use crate::models::{Block, Count, Measure, PeriodTable};

/// How a blank cell is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlankCell {
    /// Raw extracts: a blank cell is an absent count and reads as 0.
    Absent,
    /// Persisted redacted tables: a blank cell is a withheld count.
    Suppressed,
}

/// Options for loading one measure's table.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub blank: BlankCell,
    /// When non-empty, every listed category must be present in both groups.
    pub expected_categories: Vec<String>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            blank: BlankCell::Absent,
            expected_categories: Vec::new(),
        }
    }
}

/// The two header rows of a table file.
#[derive(Debug, Clone)]
pub struct TableHeader {
    pub groups: Vec<String>,
    pub categories: Vec<String>,
}

impl TableHeader {
    fn from_records(groups: &StringRecord, categories: &StringRecord) -> Result<Self> {
        if groups.len() != categories.len() {
            return Err(MeasureError::BadHeader(format!(
                "{} group names but {} category names",
                groups.len(),
                categories.len()
            )));
        }

        Ok(Self {
            groups: groups.iter().map(|g| g.trim().to_string()).collect(),
            categories: categories
                .iter()
                .map(|c| {
                    let c = c.trim();
                    // pandas labels blank second-level headers "Unnamed: N_level_1"
                    if c.starts_with("Unnamed:") {
                        String::new()
                    } else {
                        c.to_string()
                    }
                })
                .collect(),
        })
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.groups.iter().skip(1).any(|g| g == group)
    }

    /// `(column index, category)` pairs for a column group.
    fn group_columns(&self, group: &str) -> Result<Vec<(usize, String)>> {
        let columns: Vec<_> = self
            .groups
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, g)| *g == group)
            .map(|(i, _)| (i, self.categories[i].clone()))
            .collect();

        if columns.is_empty() {
            return Err(MeasureError::MissingColumn(group.to_string()));
        }
        Ok(columns)
    }

    /// Check that both of a measure's column groups exist.
    pub fn ensure_measure(&self, measure: &Measure) -> Result<()> {
        for group in [&measure.numerator, &measure.denominator] {
            if !self.has_group(group) {
                return Err(MeasureError::MissingColumn(group.clone()));
            }
        }
        Ok(())
    }
}

fn csv_reader<R: Read>(rdr: R) -> csv::Reader<R> {
    ReaderBuilder::new()
        .has_headers(false)
        .flexible(false)
        .from_reader(rdr)
}

fn read_header_records<R: Read>(
    records: &mut csv::StringRecordsIter<'_, R>,
) -> Result<TableHeader> {
    let groups = records
        .next()
        .ok_or_else(|| MeasureError::BadHeader("missing column group row".to_string()))??;
    let categories = records
        .next()
        .ok_or_else(|| MeasureError::BadHeader("missing category row".to_string()))??;
    TableHeader::from_records(&groups, &categories)
}

/// Read only the header rows of a table file.
pub fn read_header(path: &Path) -> Result<TableHeader> {
    let file = std::fs::File::open(path)?;
    let mut rdr = csv_reader(file);
    let mut records = rdr.records();
    read_header_records(&mut records)
}

/// Load one measure's table from a file.
pub fn load_period_table(path: &Path, measure: &Measure, options: &LoadOptions) -> Result<PeriodTable> {
    debug!("Loading {} for measure {}", path.display(), measure.id);
    let file = std::fs::File::open(path)?;
    read_period_table(file, measure, options)
}

/// Column layout of one block after category alignment.
struct BlockLayout {
    name: String,
    categories: Vec<String>,
    /// Source column per category; `None` for a category the group lacks.
    sources: Vec<Option<usize>>,
}

fn align_blocks(
    header: &TableHeader,
    measure: &Measure,
    expected: &[String],
) -> Result<(BlockLayout, BlockLayout)> {
    let num_cols = header.group_columns(&measure.numerator)?;
    let den_cols = header.group_columns(&measure.denominator)?;

    let categories: Vec<String> = if expected.is_empty() {
        let mut cats: Vec<String> = num_cols.iter().map(|(_, c)| c.clone()).collect();
        for (_, c) in &den_cols {
            if !cats.contains(c) {
                cats.push(c.clone());
            }
        }
        cats
    } else {
        for (group, cols) in [(&measure.numerator, &num_cols), (&measure.denominator, &den_cols)] {
            for category in expected {
                if !cols.iter().any(|(_, c)| c == category) {
                    return Err(MeasureError::MissingCategory {
                        group: group.clone(),
                        category: category.clone(),
                    });
                }
            }
        }
        expected.to_vec()
    };

    let layout = |name: &str, cols: &[(usize, String)]| {
        let sources: Vec<Option<usize>> = categories
            .iter()
            .map(|cat| cols.iter().find(|(_, c)| c == cat).map(|(i, _)| *i))
            .collect();
        for (cat, src) in categories.iter().zip(&sources) {
            if src.is_none() {
                warn!("Category '{}' absent from '{}'; counting it as 0", cat, name);
            }
        }
        BlockLayout {
            name: name.to_string(),
            categories: categories.clone(),
            sources,
        }
    };

    Ok((
        layout(&measure.numerator, &num_cols),
        layout(&measure.denominator, &den_cols),
    ))
}

/// 2^64; floats at or above this cannot be held as a count.
const U64_LIMIT: f64 = 18_446_744_073_709_551_616.0;

fn parse_count(raw: &str, blank: BlankCell, column: &str, line: usize) -> Result<Count> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(match blank {
            BlankCell::Absent => Count::Value(0),
            BlankCell::Suppressed => Count::Suppressed,
        });
    }

    if let Ok(v) = trimmed.parse::<u64>() {
        return Ok(Count::Value(v));
    }

    // Counts that passed through a float column come back as "12.0"
    match trimmed.parse::<f64>() {
        Ok(f) if f.is_finite() && (0.0..U64_LIMIT).contains(&f) && f.fract() == 0.0 => {
            Ok(Count::Value(f as u64))
        }
        Ok(f) if f.is_nan() && blank == BlankCell::Suppressed => Ok(Count::Suppressed),
        _ => Err(MeasureError::NonNumericCell {
            value: trimmed.to_string(),
            column: column.to_string(),
            line,
        }),
    }
}

fn is_index_name_row(record: &StringRecord) -> bool {
    let mut cells = record.iter();
    matches!(cells.next(), Some(first) if first.trim().eq_ignore_ascii_case("date"))
        && cells.all(|c| c.trim().is_empty())
}

fn check_order(previous: NaiveDate, next: NaiveDate) -> Result<()> {
    if next == previous {
        return Err(MeasureError::DuplicatePeriod(next));
    }
    if next < previous {
        return Err(MeasureError::NonMonotonicPeriods { previous, next });
    }
    if previous.checked_add_months(Months::new(1)) != Some(next) {
        warn!("Periods are not contiguous: {} followed by {}", previous, next);
    }
    Ok(())
}

/// Load one measure's table from any reader.
pub fn read_period_table<R: Read>(
    rdr: R,
    measure: &Measure,
    options: &LoadOptions,
) -> Result<PeriodTable> {
    let mut rdr = csv_reader(rdr);
    let mut records = rdr.records();
    let header = read_header_records(&mut records)?;
    let (num_layout, den_layout) = align_blocks(&header, measure, &options.expected_categories)?;

    let mut dates: Vec<NaiveDate> = Vec::new();
    let mut numerator = Block::new(&num_layout.name, num_layout.categories.clone());
    let mut denominator = Block::new(&den_layout.name, den_layout.categories.clone());

    for result in records {
        let record = result?;
        let line = record.position().map(|p| p.line() as usize).unwrap_or(0);

        if dates.is_empty() && is_index_name_row(&record) {
            continue;
        }

        let raw_date = record.get(0).unwrap_or("").trim();
        let date = NaiveDate::parse_from_str(raw_date, "%Y-%m-%d").map_err(|_| {
            MeasureError::InvalidDate {
                value: raw_date.to_string(),
                line,
            }
        })?;
        if let Some(&previous) = dates.last() {
            check_order(previous, date)?;
        }

        for (layout, block) in [(&num_layout, &mut numerator), (&den_layout, &mut denominator)] {
            let mut row = Vec::with_capacity(layout.sources.len());
            for (category, source) in layout.categories.iter().zip(&layout.sources) {
                let cell = match source {
                    Some(index) => {
                        let column = format!("{}/{}", layout.name, category);
                        parse_count(record.get(*index).unwrap_or(""), options.blank, &column, line)?
                    }
                    None => Count::Value(0),
                };
                row.push(cell);
            }
            block.rows.push(row);
        }
        dates.push(date);
    }

    if dates.is_empty() {
        return Err(MeasureError::EmptyTable);
    }

    debug!(
        "Loaded {} periods x {} categories for {}",
        dates.len(),
        numerator.categories.len(),
        measure.id
    );

    Ok(PeriodTable {
        measure: measure.clone(),
        dates,
        numerator,
        denominator,
    })
}
