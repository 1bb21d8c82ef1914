//! Trace log ingestion
//!
//! Parses the pipe-delimited event stream written by the tracer into
//! normalized [`RawEvent`] records. Each line has the shape
//! `proc | probe-descriptor | timestamp | pid | op | extra`, whitespace
//! around the delimiters is tolerated, and blank lines are ignored.
//!
//! Malformed lines (wrong field count, probe descriptor that does not split
//! into provider:path:function) are skipped and counted, not fatal: tracer
//! output routinely carries banner lines such as `Attaching 12 probes...`
//! that are not events. Timestamp and pid parse permissively; values that do
//! not parse become `None` instead of failing the line.

use crate::error::{Result, TracebomError};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::path::Path;

/// One parsed probe event.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    /// Process (comm) that triggered the probe
    pub process: String,
    /// Function name, the third segment of the probe descriptor
    pub func: String,
    /// Event timestamp, when the field parsed
    pub timestamp: Option<DateTime<Utc>>,
    /// Process id, when the field parsed
    pub pid: Option<i64>,
    /// Operation code, uppercased; `None` when the field was empty
    pub op: Option<String>,
    /// Free-text auxiliary field (comma-joined key=value tokens)
    pub extra: String,
}

/// Line accounting for one ingested log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Total lines seen, including blank and malformed ones
    pub total_lines: usize,
    /// Blank lines (ignored silently)
    pub blank_lines: usize,
    /// Non-blank lines that did not parse as events
    pub skipped_lines: usize,
}

/// Read and parse a trace log file.
pub fn read_log(path: &Path) -> Result<(Vec<RawEvent>, IngestStats)> {
    let content = std::fs::read_to_string(path).map_err(|e| TracebomError::Io {
        source: e,
        context: format!("Failed to read trace log: {:?}", path),
    })?;
    Ok(parse_events(&content))
}

/// Parse raw log text into events.
pub fn parse_events(input: &str) -> (Vec<RawEvent>, IngestStats) {
    let mut events = Vec::new();
    let mut stats = IngestStats::default();

    for (idx, line) in input.lines().enumerate() {
        stats.total_lines += 1;

        if line.trim().is_empty() {
            stats.blank_lines += 1;
            continue;
        }

        match parse_line(line) {
            Some(event) => events.push(event),
            None => {
                stats.skipped_lines += 1;
                tracing::debug!("Skipping unparsable log line {}: {}", idx + 1, line);
            }
        }
    }

    if stats.skipped_lines > 0 {
        tracing::warn!(
            "Skipped {} of {} log lines that did not parse as probe events",
            stats.skipped_lines,
            stats.total_lines
        );
    }
    tracing::debug!("Parsed {} probe events", events.len());

    (events, stats)
}

fn parse_line(line: &str) -> Option<RawEvent> {
    let fields: Vec<&str> = line.split('|').map(str::trim).collect();
    if fields.len() != 6 {
        return None;
    }

    // Probe descriptor format: "uprobe:/lib/path/libcrypto.so:EVP_EncryptInit_ex"
    let mut probe_parts = fields[1].splitn(3, ':');
    let _provider = probe_parts.next()?;
    let _target = probe_parts.next()?;
    let func = probe_parts.next()?.trim();
    if func.is_empty() {
        return None;
    }

    Some(RawEvent {
        process: fields[0].to_string(),
        func: func.to_string(),
        timestamp: parse_timestamp(fields[2]),
        pid: fields[3].parse::<i64>().ok(),
        op: normalize_op(fields[4]),
        extra: fields[5].to_string(),
    })
}

/// Accepts RFC 3339, bare `%Y-%m-%dT%H:%M:%S` (assumed UTC), or an integer
/// epoch-nanosecond value. Anything else is `None`.
fn parse_timestamp(field: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(field) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(field, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(nanos) = field.parse::<i64>() {
        return DateTime::from_timestamp(
            nanos.div_euclid(1_000_000_000),
            nanos.rem_euclid(1_000_000_000) as u32,
        );
    }
    None
}

/// Empty op fields (and the literal placeholder "nan" some toolchains emit)
/// become `None`; everything else is uppercased.
fn normalize_op(field: &str) -> Option<String> {
    let trimmed = field.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
        return None;
    }
    Some(trimmed.to_uppercase())
}
