//! Persisting redacted tables.
//!
//! The written file keeps the two-level header so it can be read back with
//! [`super::reader`] using [`super::BlankCell::Suppressed`].

use csv::Writer;
use std::io::Write;
use std::path::Path;
use tracing::info;

use crate::error::Result;
use crate::models::{BlockKind, RedactedTable};

/// Write a redacted table with its total columns.
pub fn write_redacted_table<W: Write>(out: W, table: &RedactedTable) -> Result<()> {
    let period = table.table();
    let measure = table.measure();
    let mut wtr = Writer::from_writer(out);

    let mut groups = vec!["date".to_string()];
    let mut categories = vec![String::new()];
    for block in [&period.numerator, &period.denominator] {
        for category in &block.categories {
            groups.push(block.name.clone());
            categories.push(category.clone());
        }
    }
    groups.push(measure.total_numerator_column());
    groups.push(measure.total_denominator_column());
    categories.push(String::new());
    categories.push(String::new());

    wtr.write_record(&groups)?;
    wtr.write_record(&categories)?;

    let num_totals = table.totals(BlockKind::Numerator);
    let den_totals = table.totals(BlockKind::Denominator);

    for (row, date) in period.dates.iter().enumerate() {
        let mut record = Vec::with_capacity(groups.len());
        record.push(date.format("%Y-%m-%d").to_string());
        record.extend(period.numerator.rows[row].iter().map(|c| c.to_string()));
        record.extend(period.denominator.rows[row].iter().map(|c| c.to_string()));
        record.push(num_totals[row].to_string());
        record.push(den_totals[row].to_string());
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}

/// Write a redacted table to a file, creating parent directories.
pub fn save_redacted_table(path: &Path, table: &RedactedTable) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let file = std::fs::File::create(path)?;
    write_redacted_table(file, table)?;
    info!("Saved table for {} to {}", table.measure().id, path.display());
    Ok(())
}
