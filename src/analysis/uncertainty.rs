//! Approximate confidence bands for period totals.
//!
//! Totals are treated as Poisson counts (variance equal to the mean) and
//! the band is the normal-approximation half-width `sqrt(total) * 1.96`.
//! This is not an exact interval and is loose for small counts, which
//! disclosure control removes anyway.

use chrono::NaiveDate;

use crate::models::{Count, Stat, UncertaintyBand};

/// Two-sided 95% standard normal quantile.
pub const Z_95: f64 = 1.96;

/// Half-width of the approximate 95% band around one total.
pub fn band(total: Count) -> Stat {
    Stat::from(total).map(|t| t.sqrt() * Z_95)
}

/// Bands for a series of period totals.
pub fn bands(dates: &[NaiveDate], totals: &[Count]) -> Vec<UncertaintyBand> {
    dates
        .iter()
        .zip(totals)
        .map(|(&date, &total)| UncertaintyBand {
            date,
            total,
            half_width: band(total),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_of_400() {
        let w = band(Count::Value(400)).value().unwrap();
        assert!((w - 39.2).abs() < 1e-9);
    }

    #[test]
    fn test_band_edges() {
        assert_eq!(band(Count::Value(0)), Stat::Value(0.0));
        assert_eq!(band(Count::Suppressed), Stat::Suppressed);
    }

    #[test]
    fn test_bands_follow_dates() {
        let dates = vec![
            NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2020, 2, 1).unwrap(),
        ];
        let out = bands(&dates, &[Count::Value(100), Count::Suppressed]);

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].date, dates[0]);
        assert!((out[0].half_width.value().unwrap() - 19.6).abs() < 1e-9);
        assert_eq!(out[1].half_width, Stat::Suppressed);
    }
}
