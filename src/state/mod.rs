//! Watermark store
//!
//! Persists, per `(entity, physical_table, stage)`, the last successful load
//! time and whether the entity supports incremental loads. The run
//! controller reads it to compute the next window and advances it only after
//! a run finishes cleanly.
//!
//! - `WatermarkKey` / `WatermarkRecord` - the persisted shape
//! - `WatermarkStore` - storage seam, implemented in memory here and by
//!   [`crate::database::StagingDatabase`] on DuckDB

mod store;
mod types;

pub use store::{MemoryWatermarkStore, WatermarkStore};
pub use types::{WatermarkKey, WatermarkRecord};
