//! Failure and run ledgers
//!
//! The failure ledger is the append-only audit trail of items that could not
//! be fetched or mapped. Rows are never deleted; the reprocessor only flips
//! `resolved`. The run ledger records one row per run controller invocation.

mod memory;
mod types;

pub use memory::{MemoryFailureLedger, MemoryRunLedger};
pub use types::{FailureLedger, FailureRecord, NewFailure, RunLedger, RunRecord};

#[cfg(test)]
mod tests;
