//! Category totals.
//!
//! This module adds the cross-category `total_*` columns to a redacted
//! table. A row with any withheld cell gets withheld totals as well, so a
//! published total is never an under-count.

use std::collections::BTreeSet;

use crate::analysis::redactor::redact;
use crate::error::{MeasureError, Result};
use crate::models::{Block, Count, PeriodTable, RedactedTable};

/// Sum one row of cells. Any withheld cell withholds the sum.
///
/// Returns `None` when the sum does not fit in a `u64`.
pub fn total_row(cells: &[Count]) -> Option<Count> {
    let mut acc = 0u64;
    for cell in cells {
        match cell.value() {
            Some(v) => acc = acc.checked_add(v)?,
            None => return Some(Count::Suppressed),
        }
    }
    Some(Count::Value(acc))
}

fn block_total(table: &PeriodTable, block: &Block, row: usize) -> Result<Count> {
    total_row(&block.rows[row]).ok_or_else(|| MeasureError::CountOverflow {
        group: block.name.clone(),
        period: table.dates[row],
    })
}

/// Compute per-row totals for an already-redacted table.
pub fn aggregate(table: PeriodTable) -> Result<RedactedTable> {
    let mut total_numerator = Vec::with_capacity(table.len());
    let mut total_denominator = Vec::with_capacity(table.len());

    for row in 0..table.len() {
        if table.row_has_suppression(row) {
            total_numerator.push(Count::Suppressed);
            total_denominator.push(Count::Suppressed);
        } else {
            total_numerator.push(block_total(&table, &table.numerator, row)?);
            total_denominator.push(block_total(&table, &table.denominator, row)?);
        }
    }

    Ok(RedactedTable::from_parts(
        table,
        total_numerator,
        total_denominator,
    ))
}

/// Redact a raw table and add its totals.
pub fn redact_and_total(
    table: &PeriodTable,
    small_counts: &BTreeSet<u64>,
) -> Result<RedactedTable> {
    aggregate(redact(table, small_counts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::redactor::default_small_counts;
    use crate::models::{Block, BlockKind, Measure};
    use chrono::NaiveDate;

    fn one_row(numerator: Vec<Count>, denominator: Vec<Count>) -> PeriodTable {
        let cats: Vec<String> = (0..numerator.len()).map(|i| format!("c{i}")).collect();
        PeriodTable {
            measure: Measure::new("sglt2i_rate", "sglt2", "population"),
            dates: vec![NaiveDate::from_ymd_opt(2020, 4, 1).unwrap()],
            numerator: Block {
                name: "sglt2".to_string(),
                categories: cats.clone(),
                rows: vec![numerator],
            },
            denominator: Block {
                name: "population".to_string(),
                categories: cats,
                rows: vec![denominator],
            },
        }
    }

    fn values(v: &[u64]) -> Vec<Count> {
        v.iter().copied().map(Count::Value).collect()
    }

    #[test]
    fn test_total_row() {
        assert_eq!(total_row(&values(&[10, 7, 20])), Some(Count::Value(37)));
        assert_eq!(total_row(&[]), Some(Count::Value(0)));
        assert_eq!(
            total_row(&[Count::Value(10), Count::Suppressed]),
            Some(Count::Suppressed)
        );
    }

    #[test]
    fn test_total_row_overflow() {
        assert_eq!(total_row(&values(&[u64::MAX, 10])), None);
        assert_eq!(total_row(&values(&[u64::MAX, 0])), Some(Count::Value(u64::MAX)));
    }

    #[test]
    fn test_overflowing_total_is_an_error() {
        let t = one_row(values(&[u64::MAX, 10]), values(&[100, 70]));
        let err = aggregate(t).unwrap_err();
        assert!(matches!(
            err,
            MeasureError::CountOverflow { ref group, .. } if group == "sglt2"
        ));
    }

    #[test]
    fn test_totals_for_clean_row() {
        let t = one_row(values(&[10, 7, 20]), values(&[100, 70, 200]));
        let r = redact_and_total(&t, &default_small_counts()).unwrap();

        assert_eq!(r.totals(BlockKind::Numerator), &[Count::Value(37)]);
        assert_eq!(r.totals(BlockKind::Denominator), &[Count::Value(370)]);
        assert_eq!(r.suppressed_rows(), 0);
    }

    #[test]
    fn test_totals_withheld_with_row() {
        let t = one_row(values(&[10, 3, 20]), values(&[100, 70, 200]));
        let r = redact_and_total(&t, &default_small_counts()).unwrap();

        assert_eq!(r.table().numerator.rows[0], vec![Count::Suppressed; 3]);
        assert_eq!(r.totals(BlockKind::Numerator), &[Count::Suppressed]);
        assert_eq!(r.totals(BlockKind::Denominator), &[Count::Suppressed]);
        assert_eq!(r.suppressed_rows(), 1);
    }

    #[test]
    fn test_partial_suppression_withholds_both_totals() {
        // A released table may carry a withheld cell the redactor would not add.
        let t = one_row(
            vec![Count::Value(10), Count::Suppressed],
            values(&[100, 70]),
        );
        let r = aggregate(t).unwrap();
        assert_eq!(r.totals(BlockKind::Numerator), &[Count::Suppressed]);
        assert_eq!(r.totals(BlockKind::Denominator), &[Count::Suppressed]);
    }

    #[test]
    fn test_zero_counts_are_not_disclosive() {
        let t = one_row(values(&[0, 0, 6]), values(&[0, 100, 200]));
        let r = redact_and_total(&t, &default_small_counts()).unwrap();
        assert_eq!(r.totals(BlockKind::Numerator), &[Count::Value(6)]);
        assert_eq!(r.totals(BlockKind::Denominator), &[Count::Value(300)]);
    }
}
