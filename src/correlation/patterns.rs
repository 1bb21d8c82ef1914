//! Pre-compiled probe-name and pointer-token patterns
//!
//! All regexes used by the correlation stages are compiled once up front so
//! the per-record passes never pay compilation cost or surface regex errors
//! mid-pipeline.

use crate::error::{Result, TracebomError};
use regex::Regex;

/// Probe whose events carry no classification signal; dropped outright.
pub const EXCLUDED_PROBE: &str = "EVP_KEYMGMT_fetch";

/// Handle-constructor probe that anchors pointer correlation.
pub const CONSTRUCTOR_FUNC: &str = "EVP_PKEY_CTX_new";

/// Probe that reports the key size for a constructed handle.
pub const SIZE_FUNC: &str = "EVP_PKEY_get_size";

/// Compiled pattern set for the correlation pipeline.
#[derive(Debug)]
pub struct ProbePatterns {
    cipher_fetch: Regex,
    signature_fetch: Regex,
    pkey_init: Regex,
    generic_init: Regex,
    hex_prev: Regex,
    hex_next: Regex,
    dec_next: Regex,
    pkey_size: Regex,
    prev_scrub: Regex,
    next_scrub: Regex,
}

impl ProbePatterns {
    pub fn new() -> Result<Self> {
        Ok(Self {
            cipher_fetch: compile(r"EVP.*CIPHER_fetch$")?,
            signature_fetch: compile(r"EVP_SIGNATURE_fetch$")?,
            pkey_init: compile(r"EVP_PKEY_.*_init$")?,
            generic_init: compile(r"EVP_.*Init.*")?,
            hex_prev: compile(r"prev=\s*(0x[0-9a-fA-F]+)")?,
            hex_next: compile(r"next=\s*(0x[0-9a-fA-F]+)")?,
            dec_next: compile(r"next=\s*(\d+)")?,
            pkey_size: compile(r"pkey_size=\s*(\d+)")?,
            prev_scrub: compile(r"prev=\s*0x[0-9a-fA-F]+\s*,?\s*")?,
            next_scrub: compile(r"next=\s*0x[0-9a-fA-F]+\s*,?\s*")?,
        })
    }

    /// Algorithm-fetch probes that get merged into a preceding init row.
    pub fn is_fetch(&self, func: &str) -> bool {
        self.cipher_fetch.is_match(func) || self.signature_fetch.is_match(func)
    }

    /// Init-style probes (both the EVP_PKEY_*_init and EVP_*Init* families).
    pub fn is_init(&self, func: &str) -> bool {
        self.pkey_init.is_match(func) || self.generic_init.is_match(func)
    }

    /// Key-init probes eligible for pointer correlation.
    pub fn is_pkey_init(&self, func: &str) -> bool {
        self.pkey_init.is_match(func)
    }

    /// Hex `prev=0x...` address, if present.
    pub fn hex_prev_value(&self, extra: &str) -> Option<u64> {
        capture_u64_hex(&self.hex_prev, extra)
    }

    /// Hex `next=0x...` address, if present.
    pub fn hex_next_value(&self, extra: &str) -> Option<u64> {
        capture_u64_hex(&self.hex_next, extra)
    }

    /// Decimal `next=...` address, if present. The size probe reports its
    /// handle in decimal while the constructor reports hex.
    pub fn dec_next_value(&self, extra: &str) -> Option<u64> {
        capture_u64(&self.dec_next, extra)
    }

    /// `pkey_size=...` value, if present.
    pub fn pkey_size_value(&self, extra: &str) -> Option<u64> {
        capture_u64(&self.pkey_size, extra)
    }

    /// Strip leftover hex address tokens (with a trailing comma if any)
    /// from an extra string.
    pub fn scrub_addresses(&self, extra: &str) -> String {
        let cleaned = self.prev_scrub.replace_all(extra, "");
        let cleaned = self.next_scrub.replace_all(&cleaned, "");
        cleaned.trim().trim_matches(',').trim().to_string()
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| TracebomError::Config(format!("Invalid probe pattern '{}': {}", pattern, e)))
}

fn capture_u64(regex: &Regex, text: &str) -> Option<u64> {
    regex
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok())
}

fn capture_u64_hex(regex: &Regex, text: &str) -> Option<u64> {
    regex
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| u64::from_str_radix(m.as_str().trim_start_matches("0x"), 16).ok())
}
