//! Early correlation stages: noise filtering, adjacency merge, init pruning

use super::patterns::{ProbePatterns, EXCLUDED_PROBE};
use super::types::EventRecord;

/// Drop events from the excluded probe. The key-management fetch fires on
/// every keyed operation and carries no classification signal of its own.
pub(crate) fn drop_excluded_probes(records: Vec<EventRecord>) -> Vec<EventRecord> {
    records
        .into_iter()
        .filter(|r| r.func != EXCLUDED_PROBE)
        .collect()
}

/// Merge algorithm-fetch rows into the init row immediately preceding them.
///
/// An init call followed directly by a cipher/signature fetch belongs to the
/// same operation: the fetch names the algorithm the init could not. The
/// fetch row's op is copied onto the init row and the fetch row is deleted.
/// The record right after a merged fetch is not itself tested as a fetch; it
/// can still act as the preceding init for a later one.
pub(crate) fn merge_fetch_into_init(
    records: Vec<EventRecord>,
    patterns: &ProbePatterns,
) -> Vec<EventRecord> {
    let mut merged: Vec<EventRecord> = Vec::with_capacity(records.len());
    let mut exempt = false;

    for record in records {
        let test_as_fetch = !exempt && patterns.is_fetch(&record.func);
        exempt = false;

        if test_as_fetch {
            if let Some(prev) = merged.last_mut() {
                if patterns.is_init(&prev.func) {
                    prev.op = record.op;
                    exempt = true;
                    continue;
                }
            }
        }
        merged.push(record);
    }

    merged
}

/// Delete init-style rows that still have no operation code. The adjacency
/// merge failed to attach one, so they cannot be classified.
pub(crate) fn prune_unresolved_inits(
    records: Vec<EventRecord>,
    patterns: &ProbePatterns,
) -> Vec<EventRecord> {
    records
        .into_iter()
        .filter(|r| !(r.op.is_none() && patterns.is_init(&r.func)))
        .collect()
}
