//! Staging database on DuckDB
//!
//! [`StagingDatabase`] implements every persistence seam of the core:
//! record sink, watermark store, failure ledger, run ledger and token store.

mod engine;

pub use engine::{StagedRow, StagingDatabase};

#[cfg(test)]
mod tests;
