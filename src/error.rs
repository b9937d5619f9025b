//! Error types for table loading and measure analysis.
//!
//! Numeric edge cases (division by zero, withheld counts) are not errors;
//! they travel as [`crate::models::Stat`] values instead.

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MeasureError {
    #[error("Column group '{0}' not found in table header")]
    MissingColumn(String),

    #[error("Category '{category}' missing from column group '{group}'")]
    MissingCategory { group: String, category: String },

    #[error("Duplicate period {0}")]
    DuplicatePeriod(NaiveDate),

    #[error("Periods are not in ascending order: {previous} followed by {next}")]
    NonMonotonicPeriods { previous: NaiveDate, next: NaiveDate },

    #[error("Invalid period date '{value}' on line {line}")]
    InvalidDate { value: String, line: usize },

    #[error("Non-numeric count '{value}' in column {column} on line {line}")]
    NonNumericCell {
        value: String,
        column: String,
        line: usize,
    },

    #[error("Period {0} is not present in the table")]
    MissingPeriod(NaiveDate),

    #[error("Total of column group '{group}' overflows for period {period}")]
    CountOverflow { group: String, period: NaiveDate },

    #[error("Table has no rows")]
    EmptyTable,

    #[error("Table header is incomplete: {0}")]
    BadHeader(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MeasureError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_offender() {
        let err = MeasureError::MissingCategory {
            group: "died".to_string(),
            category: "General population".to_string(),
        };
        assert!(err.to_string().contains("General population"));
        assert!(err.to_string().contains("died"));

        let date = NaiveDate::from_ymd_opt(2020, 4, 1).unwrap();
        assert_eq!(
            MeasureError::MissingPeriod(date).to_string(),
            "Period 2020-04-01 is not present in the table"
        );
    }
}
