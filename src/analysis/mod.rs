//! Analysis modules.
//!
//! Redaction, totals, change statistics and uncertainty bands. Nothing in
//! here knows about report or chart layout.

pub mod aggregator;
pub mod change;
pub mod redactor;
pub mod uncertainty;

pub use aggregator::redact_and_total;
pub use change::{analyze, Comparison};
pub use redactor::default_small_counts;
