//! Content fingerprints for raw processing-log rows.
//!
//! A fingerprint is the only deduplication key in the system: events carry
//! the fingerprints of their rows and the ledger stores them when an event
//! is confirmed.

use sha2::{Digest, Sha256};

use crate::log::RawLogRow;

const FIELD_DELIMITER: &str = "|";

/// SHA-256 (lowercase hex) over `timestamp|project|path|message`.
///
/// `part` is deliberately not part of the fingerprint.
pub fn fingerprint(row: &RawLogRow) -> String {
    fingerprint_parts(&row.timestamp, &row.project, &row.path, &row.message)
}

/// Fingerprint from the four logical fields; each is trimmed first.
pub fn fingerprint_parts(timestamp: &str, project: &str, path: &str, message: &str) -> String {
    let raw = [timestamp, project, path, message]
        .iter()
        .map(|field| field.trim())
        .collect::<Vec<_>>()
        .join(FIELD_DELIMITER);
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Splits a comma-joined hash list, dropping blanks.
pub fn split_hashes(joined: &str) -> impl Iterator<Item = &str> {
    joined
        .split(',')
        .map(str::trim)
        .filter(|hash| !hash.is_empty())
}
