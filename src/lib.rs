//! Tracebom - Dynamic Cryptography Inventory Tool
//!
//! Converts function-probe trace logs captured from a running target into a
//! CycloneDX cryptographic bill of materials (CBOM), and scores how well one
//! inventory matches a reference inventory via optimal bipartite assignment.

pub mod cbom;
pub mod cli;
pub mod config;
pub mod correlation;
pub mod error;
pub mod ingest;
pub mod matching;
pub mod rules;
pub mod tracer;

pub use error::{Result, TracebomError};
