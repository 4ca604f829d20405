//! Watermark types

use crate::types::DEFAULT_STAGE;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a load target
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WatermarkKey {
    /// Logical entity name (e.g. `product`)
    pub entity: String,
    /// Destination table
    pub physical_table: String,
    /// Pipeline stage label
    pub stage: String,
}

impl WatermarkKey {
    /// Create a key
    pub fn new(
        entity: impl Into<String>,
        physical_table: impl Into<String>,
        stage: impl Into<String>,
    ) -> Self {
        Self {
            entity: entity.into(),
            physical_table: physical_table.into(),
            stage: stage.into(),
        }
    }

    /// Key for the default API → staging stage
    pub fn staging(entity: impl Into<String>, physical_table: impl Into<String>) -> Self {
        Self::new(entity, physical_table, DEFAULT_STAGE)
    }
}

impl fmt::Display for WatermarkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.entity, self.physical_table, self.stage)
    }
}

/// Last successful load of one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatermarkRecord {
    /// Target identity
    #[serde(flatten)]
    pub key: WatermarkKey,
    /// Boundary used to compute the next incremental window
    pub last_load_time: NaiveDateTime,
    /// Static capability of the entity
    pub supports_incremental: bool,
}

impl WatermarkRecord {
    /// Create a record
    pub fn new(key: WatermarkKey, last_load_time: NaiveDateTime, supports_incremental: bool) -> Self {
        Self {
            key,
            last_load_time,
            supports_incremental,
        }
    }
}
