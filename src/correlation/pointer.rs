//! Pointer/handle correlation
//!
//! A key operation leaves three related rows in the log, tied together by
//! address tokens rather than by adjacency:
//!
//! - the handle constructor (`EVP_PKEY_CTX_new`) with hex `prev=`/`next=`
//!   addresses in its extra text,
//! - a size row (`EVP_PKEY_get_size`) whose decimal `next=` address equals
//!   the constructor's `prev`, carrying a `pkey_size=` value,
//! - a key-init row whose hex `prev=` address equals the constructor's
//!   `next`.
//!
//! When all three line up, the size value is written into the init row's
//! extra field, replacing its content entirely. Only the first matching size
//! row and init row in scan order are used.

use super::patterns::{ProbePatterns, CONSTRUCTOR_FUNC, SIZE_FUNC};
use super::types::EventRecord;
use crate::error::{Result, TracebomError};

/// Stage name reported on correlation failures.
const STAGE: &str = "pointer-correlation";

/// Resolve key sizes through constructor rows. Returns the rewritten records
/// and the number of init rows that received a size.
///
/// A constructor row carrying neither a `prev` nor a `next` address violates
/// the correlation precondition and aborts the run: continuing would emit an
/// asset with silently missing parameter data.
pub(crate) fn resolve_key_sizes(
    mut records: Vec<EventRecord>,
    patterns: &ProbePatterns,
) -> Result<(Vec<EventRecord>, usize)> {
    let mut resolved = 0;

    for i in 0..records.len() {
        if records[i].func != CONSTRUCTOR_FUNC {
            continue;
        }

        let prev_ptr = patterns.hex_prev_value(&records[i].extra);
        let next_ptr = patterns.hex_next_value(&records[i].extra);

        if prev_ptr.is_none() && next_ptr.is_none() {
            return Err(TracebomError::Correlation {
                stage: STAGE.to_string(),
                message: format!(
                    "{} record #{} carries no prev/next address (extra: '{}')",
                    CONSTRUCTOR_FUNC, i, records[i].extra
                ),
            });
        }

        // First size row whose decimal next= equals the constructor's prev.
        let size_idx = prev_ptr.and_then(|prev| {
            records
                .iter()
                .position(|r| r.func == SIZE_FUNC && patterns.dec_next_value(&r.extra) == Some(prev))
        });

        // First key-init row whose hex prev= equals the constructor's next.
        let init_idx = next_ptr.and_then(|next| {
            records.iter().position(|r| {
                patterns.is_pkey_init(&r.func) && patterns.hex_prev_value(&r.extra) == Some(next)
            })
        });

        if let (Some(si), Some(ii)) = (size_idx, init_idx) {
            if let Some(size) = patterns.pkey_size_value(&records[si].extra) {
                records[ii].extra = format!("pkey_size={}", size);
                resolved += 1;
            }
        }
    }

    Ok((records, resolved))
}

/// Remove constructor and size rows once their information has been
/// propagated (or turned out to be unused).
pub(crate) fn drop_context_rows(records: Vec<EventRecord>) -> Vec<EventRecord> {
    records
        .into_iter()
        .filter(|r| r.func != CONSTRUCTOR_FUNC && r.func != SIZE_FUNC)
        .collect()
}
