//! Delimited table I/O.
//!
//! This module reads per-measure extracts and writes (and re-reads) the
//! redacted, total-bearing tables.

pub mod reader;
pub mod writer;

pub use reader::{load_period_table, read_header, BlankCell, LoadOptions};
pub use writer::save_redacted_table;
