//! Event correlation pipeline
//!
//! Transforms the raw probe event stream into per-operation groups through
//! an ordered sequence of record-rewriting passes:
//!
//! 1. Noise filtering: drop the excluded key-management probe
//! 2. Adjacency merge: fold algorithm-fetch rows into the preceding init row
//! 3. Incomplete-init pruning: drop init rows that never got an op
//! 4. Pointer correlation: propagate key sizes through handle addresses
//! 5. Context-row removal: drop constructor and size rows
//! 6. Aggregation: count identical (op, extra, func) records
//! 7. Address scrubbing: strip leftover pointer tokens from extra text
//! 8. Grouping: one record per operation code
//! 9. Normalization: map hook names to generic operation labels
//!
//! Each pass is a pure collection-to-collection transform; the whole log is
//! held in memory because later passes need global visibility (adjacency
//! needs ordering, pointer correlation scans for candidate rows anywhere in
//! the log). Stage 4 is worst-case quadratic in the record count, which is
//! an accepted limit for trace-sized inputs.

mod aggregate;
mod merge;
mod patterns;
mod pointer;
mod types;

pub use patterns::{ProbePatterns, CONSTRUCTOR_FUNC, EXCLUDED_PROBE, SIZE_FUNC};
pub use types::{CorrelationStats, EventRecord, GroupedRecord, NO_DATA_MARKER};

use crate::error::Result;
use crate::ingest::RawEvent;
use std::time::Instant;

/// Runs the correlation passes over one ingested log.
pub struct Correlator {
    patterns: ProbePatterns,
}

impl Correlator {
    pub fn new() -> Result<Self> {
        Ok(Self {
            patterns: ProbePatterns::new()?,
        })
    }

    /// Correlate freshly ingested events into per-operation groups.
    pub fn correlate(&self, events: Vec<RawEvent>) -> Result<(Vec<GroupedRecord>, CorrelationStats)> {
        let records = events.into_iter().map(EventRecord::from).collect();
        self.correlate_records(records)
    }

    /// Correlate pre-built records. Records that already carry counts (for
    /// example, re-fed pipeline output) keep their totals through
    /// aggregation.
    pub fn correlate_records(
        &self,
        records: Vec<EventRecord>,
    ) -> Result<(Vec<GroupedRecord>, CorrelationStats)> {
        let start = Instant::now();
        let mut stats = CorrelationStats {
            input_records: records.len(),
            ..Default::default()
        };

        let records = merge::drop_excluded_probes(records);
        stats.after_noise_filter = records.len();
        tracing::debug!("Noise filter: {} records remain", records.len());

        let records = merge::merge_fetch_into_init(records, &self.patterns);
        stats.after_adjacency_merge = records.len();
        tracing::debug!("Adjacency merge: {} records remain", records.len());

        let records = merge::prune_unresolved_inits(records, &self.patterns);
        stats.after_init_pruning = records.len();
        tracing::debug!("Init pruning: {} records remain", records.len());

        let (records, resolved) = pointer::resolve_key_sizes(records, &self.patterns)?;
        stats.resolved_key_sizes = resolved;
        tracing::debug!("Pointer correlation: {} key sizes resolved", resolved);

        let records = pointer::drop_context_rows(records);
        stats.after_context_removal = records.len();
        tracing::debug!("Context removal: {} records remain", records.len());

        let records = aggregate::aggregate_identical(records);
        stats.aggregated_records = records.len();
        tracing::debug!("Aggregation: {} distinct records", records.len());

        let records = aggregate::scrub_addresses(records, &self.patterns);

        let groups = aggregate::group_by_op(records);
        let groups = aggregate::normalize_function_names(groups);
        stats.grouped_records = groups.len();
        stats.processing_time_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(
            "Correlation produced {} operation groups in {}ms",
            stats.grouped_records,
            stats.processing_time_ms
        );

        Ok((groups, stats))
    }
}
