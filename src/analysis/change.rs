//! Period-over-period change and category attribution.
//!
//! All arithmetic runs on [`Stat`] values: a withheld operand yields a
//! withheld result and a zero divisor yields `Undefined`.
//!
//! Rounding uses `f64::round`, i.e. ties away from zero. Absolute
//! differences round to whole counts and percentages to one decimal.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{BlockKind, Change, ChangeResult, Column, RedactedTable, Stat};

/// Decimal places kept for percentages.
pub const PERCENT_DECIMALS: i32 = 1;

/// The two periods and categories a measure is compared on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comparison {
    pub baseline: NaiveDate,
    pub comparison: NaiveDate,
    /// Category whose own change is reported next to the total.
    pub headline_category: String,
    /// Category whose share of the comparison total is reported.
    pub attribution_category: String,
}

/// Round to a number of decimal places, normalising `-0.0` to `0.0`.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor + 0.0
}

/// `part / whole * 100`, rounded to one decimal.
pub fn percent(part: Stat, whole: Stat) -> Stat {
    part.zip_with(whole, |p, w| {
        if w == 0.0 {
            Stat::Undefined
        } else {
            Stat::Value(round_to(p / w * 100.0, PERCENT_DECIMALS))
        }
    })
}

/// Change of one column between two periods.
pub fn column_change(
    table: &RedactedTable,
    kind: BlockKind,
    column: &Column,
    baseline: NaiveDate,
    comparison: NaiveDate,
) -> Result<Change> {
    let period = table.table();
    let base = Stat::from(table.cell(kind, column, period.period_index(baseline)?)?);
    let comp = Stat::from(table.cell(kind, column, period.period_index(comparison)?)?);

    let absolute_difference = comp.zip_with(base, |c, b| Stat::Value(round_to(c - b, 0)));
    let percent_change = percent(absolute_difference, base);

    Ok(Change {
        absolute_difference,
        percent_change,
    })
}

/// Percentage of a period's numerator total contributed by one category.
pub fn attributable_share(table: &RedactedTable, category: &str, date: NaiveDate) -> Result<Stat> {
    let row = table.table().period_index(date)?;
    let part = table.cell(
        BlockKind::Numerator,
        &Column::Category(category.to_string()),
        row,
    )?;
    let whole = table.cell(BlockKind::Numerator, &Column::Total, row)?;
    Ok(percent(part.into(), whole.into()))
}

/// Full change statistics for a measure's numerator.
pub fn analyze(table: &RedactedTable, cmp: &Comparison) -> Result<ChangeResult> {
    let total = column_change(
        table,
        BlockKind::Numerator,
        &Column::Total,
        cmp.baseline,
        cmp.comparison,
    )?;
    let headline = column_change(
        table,
        BlockKind::Numerator,
        &Column::Category(cmp.headline_category.clone()),
        cmp.baseline,
        cmp.comparison,
    )?;
    let attributable_share = attributable_share(table, &cmp.attribution_category, cmp.comparison)?;

    Ok(ChangeResult {
        measure_id: table.measure().id.clone(),
        baseline: cmp.baseline,
        comparison: cmp.comparison,
        total,
        headline,
        attributable_share,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::aggregator::aggregate;
    use crate::error::MeasureError;
    use crate::models::{Block, Count, Measure, PeriodTable};

    fn date(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    /// Two periods (2019-04, 2020-04) with categories `general`, `covid`.
    fn two_periods(base: [Count; 2], comp: [Count; 2]) -> RedactedTable {
        let cats = vec!["general".to_string(), "covid".to_string()];
        aggregate(PeriodTable {
            measure: Measure::new("died_rate", "died", "population"),
            dates: vec![date(2019, 4), date(2020, 4)],
            numerator: Block {
                name: "died".to_string(),
                categories: cats.clone(),
                rows: vec![base.to_vec(), comp.to_vec()],
            },
            denominator: Block {
                name: "population".to_string(),
                categories: cats,
                rows: vec![vec![Count::Value(1000); 2]; 2],
            },
        })
        .unwrap()
    }

    fn cmp() -> Comparison {
        Comparison {
            baseline: date(2019, 4),
            comparison: date(2020, 4),
            headline_category: "general".to_string(),
            attribution_category: "covid".to_string(),
        }
    }

    #[test]
    fn test_total_change() {
        let t = two_periods(
            [Count::Value(60), Count::Value(40)],
            [Count::Value(90), Count::Value(30)],
        );
        let change = column_change(&t, BlockKind::Numerator, &Column::Total, date(2019, 4), date(2020, 4))
            .unwrap();

        assert_eq!(change.absolute_difference, Stat::Value(20.0));
        assert_eq!(change.percent_change, Stat::Value(20.0));
    }

    #[test]
    fn test_zero_baseline_is_undefined() {
        let t = two_periods(
            [Count::Value(0), Count::Value(0)],
            [Count::Value(30), Count::Value(20)],
        );
        let result = analyze(&t, &cmp()).unwrap();

        assert_eq!(result.total.absolute_difference, Stat::Value(50.0));
        assert_eq!(result.total.percent_change, Stat::Undefined);
    }

    #[test]
    fn test_headline_and_share() {
        let t = two_periods(
            [Count::Value(60), Count::Value(40)],
            [Count::Value(45), Count::Value(75)],
        );
        let result = analyze(&t, &cmp()).unwrap();

        assert_eq!(result.headline.absolute_difference, Stat::Value(-15.0));
        assert_eq!(result.headline.percent_change, Stat::Value(-25.0));
        // 75 / 120 = 62.5%
        assert_eq!(result.attributable_share, Stat::Value(62.5));
    }

    #[test]
    fn test_suppressed_period_propagates() {
        let t = two_periods(
            [Count::Value(60), Count::Value(3)],
            [Count::Value(45), Count::Value(75)],
        );
        // the redactor is bypassed here; aggregate still withholds totals
        let t = aggregate(crate::analysis::redactor::redact(
            t.table(),
            &crate::analysis::redactor::default_small_counts(),
        ))
        .unwrap();
        let result = analyze(&t, &cmp()).unwrap();

        assert_eq!(result.total.absolute_difference, Stat::Suppressed);
        assert_eq!(result.total.percent_change, Stat::Suppressed);
        assert_eq!(result.headline.absolute_difference, Stat::Suppressed);
        // comparison period is clean
        assert_eq!(result.attributable_share, Stat::Value(62.5));
    }

    #[test]
    fn test_withheld_comparison_period_propagates() {
        let t = two_periods(
            [Count::Value(60), Count::Value(40)],
            [Count::Value(45), Count::Value(4)],
        );
        let t = aggregate(crate::analysis::redactor::redact(
            t.table(),
            &crate::analysis::redactor::default_small_counts(),
        ))
        .unwrap();
        let result = analyze(&t, &cmp()).unwrap();

        assert_eq!(result.total.absolute_difference, Stat::Suppressed);
        assert_eq!(result.total.percent_change, Stat::Suppressed);
        assert_eq!(result.headline.absolute_difference, Stat::Suppressed);
        assert_eq!(result.headline.percent_change, Stat::Suppressed);
        assert_eq!(result.attributable_share, Stat::Suppressed);
    }

    #[test]
    fn test_share_of_zero_total_is_undefined() {
        let t = two_periods(
            [Count::Value(60), Count::Value(40)],
            [Count::Value(0), Count::Value(0)],
        );
        let result = analyze(&t, &cmp()).unwrap();
        assert_eq!(result.attributable_share, Stat::Undefined);
        assert_eq!(result.total.percent_change, Stat::Value(-100.0));
    }

    #[test]
    fn test_share_bounds() {
        for (a, b) in [(0, 10), (10, 0), (7, 13), (1000, 1)] {
            let t = two_periods(
                [Count::Value(10), Count::Value(10)],
                [Count::Value(a), Count::Value(b)],
            );
            let share = attributable_share(&t, "covid", date(2020, 4))
                .unwrap()
                .value()
                .unwrap();
            assert!((0.0..=100.0).contains(&share));
        }
    }

    #[test]
    fn test_missing_period_and_category() {
        let t = two_periods(
            [Count::Value(60), Count::Value(40)],
            [Count::Value(45), Count::Value(75)],
        );
        let mut bad = cmp();
        bad.comparison = date(2021, 1);
        assert!(matches!(analyze(&t, &bad), Err(MeasureError::MissingPeriod(_))));

        let mut bad = cmp();
        bad.headline_category = "care home".to_string();
        assert!(matches!(
            analyze(&t, &bad),
            Err(MeasureError::MissingCategory { .. })
        ));
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(33.333, 1), 33.3);
        assert_eq!(round_to(0.25, 1), 0.3);
        assert_eq!(round_to(-0.04, 1).to_string(), "0");
        assert_eq!(round_to(2.5, 0), 3.0);
    }
}
