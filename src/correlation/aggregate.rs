//! Late correlation stages: aggregation, address scrubbing, grouping by
//! operation, and function-name normalization

use super::patterns::ProbePatterns;
use super::types::{EventRecord, GroupedRecord, NO_DATA_MARKER};
use ahash::{HashMap, HashMapExt};

/// Collapse identical (op, extra, func) records, summing counts. Output is
/// sorted by the group key so downstream stages and documents are
/// deterministic.
pub(crate) fn aggregate_identical(records: Vec<EventRecord>) -> Vec<EventRecord> {
    let mut counts: HashMap<(Option<String>, String, String), u64> = HashMap::new();
    for r in records {
        *counts.entry((r.op, r.extra, r.func)).or_insert(0) += r.count;
    }

    let mut aggregated: Vec<EventRecord> = counts
        .into_iter()
        .map(|((op, extra, func), count)| EventRecord {
            func,
            op,
            extra,
            count,
        })
        .collect();
    aggregated.sort_by(|a, b| {
        (&a.op, &a.extra, &a.func).cmp(&(&b.op, &b.extra, &b.func))
    });
    aggregated
}

/// Strip leftover `prev=`/`next=` address tokens from every extra field.
/// An extra left empty by the scrub becomes the no-data marker.
pub(crate) fn scrub_addresses(
    records: Vec<EventRecord>,
    patterns: &ProbePatterns,
) -> Vec<EventRecord> {
    records
        .into_iter()
        .map(|mut r| {
            let cleaned = patterns.scrub_addresses(&r.extra);
            r.extra = if cleaned.is_empty() {
                NO_DATA_MARKER.to_string()
            } else {
                cleaned
            };
            r
        })
        .collect()
}

/// Merge all records sharing an operation code into one [`GroupedRecord`]:
/// union of function names, sum of counts, distinct extras comma-joined.
/// Input order (sorted by group key) determines order within each group.
pub(crate) fn group_by_op(records: Vec<EventRecord>) -> Vec<GroupedRecord> {
    struct OpGroup {
        op: Option<String>,
        funcs: Vec<String>,
        extras: Vec<String>,
        count: u64,
    }

    let mut groups: Vec<OpGroup> = Vec::new();
    let mut index: HashMap<Option<String>, usize> = HashMap::new();

    for r in records {
        let slot = match index.get(&r.op) {
            Some(&i) => i,
            None => {
                index.insert(r.op.clone(), groups.len());
                groups.push(OpGroup {
                    op: r.op,
                    funcs: Vec::new(),
                    extras: Vec::new(),
                    count: 0,
                });
                groups.len() - 1
            }
        };

        let group = &mut groups[slot];
        if !group.funcs.contains(&r.func) {
            group.funcs.push(r.func);
        }
        if !group.extras.contains(&r.extra) {
            group.extras.push(r.extra);
        }
        group.count += r.count;
    }

    groups
        .into_iter()
        .map(|g| GroupedRecord {
            op: g.op,
            funcs: g.funcs,
            extra: g.extras.join(","),
            count: g.count,
        })
        .collect()
}

/// Map library-specific hook names to generic operation labels. Names with
/// no mapping are dropped from the function list; duplicate labels collapse.
pub(crate) fn normalize_function_names(groups: Vec<GroupedRecord>) -> Vec<GroupedRecord> {
    groups
        .into_iter()
        .map(|mut g| {
            let mut labels: Vec<String> = Vec::new();
            for func in &g.funcs {
                if let Some(label) = map_hook_name(func) {
                    if !labels.iter().any(|l| l == label) {
                        labels.push(label.to_string());
                    }
                }
            }
            g.funcs = labels;
            g
        })
        .collect()
}

/// Generic label for a hook name, if it has one. Already-normalized labels
/// map to themselves so re-running the pipeline over its own output changes
/// nothing.
fn map_hook_name(func: &str) -> Option<&'static str> {
    match func {
        "encrypt" => Some("encrypt"),
        "decrypt" => Some("decrypt"),
        "sign" => Some("sign"),
        "verify" => Some("verify"),
        _ if func.ends_with("_encrypt_init") => Some("encrypt"),
        _ if func.ends_with("_decrypt_init") => Some("decrypt"),
        _ if func.ends_with("_sign_init") => Some("sign"),
        _ if func.ends_with("_verify_init") => Some("verify"),
        _ if func.contains("EncryptInit") => Some("encrypt"),
        _ if func.contains("DecryptInit") => Some("decrypt"),
        _ => None,
    }
}
