//! Small-count disclosure control.
//!
//! A row is withheld as a whole when any numerator or denominator cell
//! holds a disclosive count, so no single withheld cell can be recovered
//! from the row total and its published neighbours.

use std::collections::BTreeSet;
use tracing::debug;

use crate::models::{Count, PeriodTable};

/// The default set of individually disclosive counts.
pub fn default_small_counts() -> BTreeSet<u64> {
    (1..=5).collect()
}

/// Whether a cell triggers suppression. Withheld cells never do.
pub fn is_disclosive(count: Count, small_counts: &BTreeSet<u64>) -> bool {
    match count {
        Count::Value(v) => small_counts.contains(&v),
        Count::Suppressed => false,
    }
}

/// Return a copy of `table` with every row containing a disclosive cell withheld.
pub fn redact(table: &PeriodTable, small_counts: &BTreeSet<u64>) -> PeriodTable {
    let mut redacted = table.clone();
    let mut withheld = 0;

    for row in 0..redacted.len() {
        let disclosive = redacted.numerator.rows[row]
            .iter()
            .chain(redacted.denominator.rows[row].iter())
            .any(|c| is_disclosive(*c, small_counts));

        if disclosive {
            for block in [&mut redacted.numerator, &mut redacted.denominator] {
                block.rows[row].fill(Count::Suppressed);
            }
            withheld += 1;
        }
    }

    debug!(
        "Redacted {} of {} periods for {}",
        withheld,
        redacted.len(),
        redacted.measure.id
    );

    redacted
}
