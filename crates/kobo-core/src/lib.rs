//! Production tracking for a small workshop.
//!
//! Machine processing logs become deduplicated, confidence-scored production
//! events; operators confirm them into an append-only ledger; inventory is
//! reconciled on demand from master data, the ledger and observed sales.

pub mod classify;
pub mod config;
pub mod events;
pub mod fingerprint;
pub mod inventory;
pub mod ledger;
pub mod log;
pub mod master;
pub mod normalize;
pub mod table;

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
