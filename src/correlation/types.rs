// Shared types for the correlation pipeline
use crate::ingest::RawEvent;

/// Marker written into `extra` when scrubbing leaves no content behind.
pub const NO_DATA_MARKER: &str = "none";

/// One record flowing through the correlation stages.
///
/// Carries an occurrence count so that aggregation stages can merge
/// already-aggregated records without losing totals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    /// Function name from the probe descriptor
    pub func: String,
    /// Operation code, uppercased; `None` until one is resolved
    pub op: Option<String>,
    /// Auxiliary text (comma-joined key=value tokens)
    pub extra: String,
    /// Occurrence count (1 for freshly ingested events)
    pub count: u64,
}

impl From<RawEvent> for EventRecord {
    fn from(event: RawEvent) -> Self {
        Self {
            func: event.func,
            op: event.op,
            extra: event.extra,
            count: 1,
        }
    }
}

/// Final pipeline output unit: one per distinct operation code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupedRecord {
    /// Operation code shared by all merged records
    pub op: Option<String>,
    /// Distinct function labels observed for this operation
    pub funcs: Vec<String>,
    /// Distinct extra strings, comma-joined
    pub extra: String,
    /// Total occurrence count
    pub count: u64,
}

/// Statistics from one correlation run.
#[derive(Debug, Clone, Default)]
pub struct CorrelationStats {
    /// Records entering the pipeline
    pub input_records: usize,
    /// Records after the excluded-probe filter
    pub after_noise_filter: usize,
    /// Records after fetch rows were merged into their init rows
    pub after_adjacency_merge: usize,
    /// Records after unresolved init rows were pruned
    pub after_init_pruning: usize,
    /// Key sizes propagated through pointer correlation
    pub resolved_key_sizes: usize,
    /// Records after constructor/size context rows were removed
    pub after_context_removal: usize,
    /// Distinct (op, extra, func) groups after counting
    pub aggregated_records: usize,
    /// Final per-operation groups
    pub grouped_records: usize,
    /// Total processing time in milliseconds
    pub processing_time_ms: u64,
}
