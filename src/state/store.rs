//! Watermark store trait and in-memory implementation

use super::types::{WatermarkKey, WatermarkRecord};
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::sync::RwLock;

/// Keyed persistence of watermarks.
///
/// At most one record exists per key; `upsert` replaces it.
pub trait WatermarkStore: Send + Sync {
    /// Watermark for `key`, if the target was ever loaded
    fn get(&self, key: &WatermarkKey) -> Result<Option<WatermarkRecord>>;

    /// Insert or replace the record for its key
    fn upsert(&self, record: &WatermarkRecord) -> Result<()>;

    /// All records ordered by key
    fn list(&self) -> Result<Vec<WatermarkRecord>>;
}

/// Watermark store backed by a map
#[derive(Debug, Default)]
pub struct MemoryWatermarkStore {
    records: RwLock<BTreeMap<WatermarkKey, WatermarkRecord>>,
}

impl MemoryWatermarkStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> Error {
    Error::state("watermark store lock poisoned")
}

impl WatermarkStore for MemoryWatermarkStore {
    fn get(&self, key: &WatermarkKey) -> Result<Option<WatermarkRecord>> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records.get(key).cloned())
    }

    fn upsert(&self, record: &WatermarkRecord) -> Result<()> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        records.insert(record.key.clone(), record.clone());
        Ok(())
    }

    fn list(&self) -> Result<Vec<WatermarkRecord>> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records.values().cloned().collect())
    }
}
