//! Set diff between the previously persisted snapshot and the freshly
//! computed one, by stable offer id.

use std::collections::BTreeSet;

use fgw_core::DiffResult;

/// Partition the union of `previous` and `current` ids into added, removed,
/// and retained. The three partitions are disjoint and exhaustive.
pub fn diff_ids(previous: &BTreeSet<u64>, current: &BTreeSet<u64>) -> DiffResult {
    DiffResult {
        added: current.difference(previous).copied().collect(),
        removed: previous.difference(current).copied().collect(),
        retained: previous.intersection(current).copied().collect(),
    }
}
