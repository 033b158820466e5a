//! Assertions over reconciliation output.

use crate::reconcile::{Delta, ReconcileStats};
use crate::record::Transaction;

/// Assert that `deltas` carry exactly `expected` (transaction, first key
/// value) pairs, in order.
///
/// # Panics
///
/// Panics with both sequences if they differ.
pub fn assert_transactions(deltas: &[Delta], expected: &[(Transaction, &str)]) {
    let actual: Vec<(Transaction, &str)> = deltas
        .iter()
        .map(|d| (d.transaction, d.record.get(0)))
        .collect();
    assert_eq!(
        actual, expected,
        "Delta mismatch:\n  Expected: {expected:?}\n  Actual: {actual:?}"
    );
}

/// Assert the bookkeeping identities of a run.
///
/// # Panics
///
/// Panics if `processed` differs from the sum of the per-transaction counts,
/// or the per-side record counts do not add up.
pub fn assert_stats_consistent(stats: &ReconcileStats) {
    assert_eq!(
        stats.processed,
        stats.unchanged + stats.created + stats.updated + stats.deleted,
        "processed does not match per-transaction counts: {stats:?}"
    );
    assert_eq!(
        stats.old_records,
        stats.unchanged + stats.updated + stats.deleted,
        "old record count mismatch: {stats:?}"
    );
    assert_eq!(
        stats.new_records,
        stats.unchanged + stats.updated + stats.created,
        "new record count mismatch: {stats:?}"
    );
}
