//! Record sinks

use crate::error::{Error, Result};
use crate::mapping::StagingRecord;
use crate::types::JsonObject;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

/// Destination of mapped records with merge-on-natural-key semantics
pub trait RecordSink: Send + Sync {
    /// Upsert one batch into `table` as a single transaction, returning
    /// the number of records written
    fn upsert(&self, table: &str, records: &[StagingRecord]) -> Result<usize>;
}

#[derive(Debug, Default)]
struct SinkState {
    tables: HashMap<String, BTreeMap<String, JsonObject>>,
    batches: Vec<(String, usize)>,
    fail_after: Option<usize>,
}

/// In-memory sink, last write wins per natural key
#[derive(Debug, Default)]
pub struct MemorySink {
    state: RwLock<SinkState>,
}

impl MemorySink {
    /// Empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink that accepts `batches` batches and fails every later one
    pub fn failing_after(batches: usize) -> Self {
        let sink = Self::default();
        if let Ok(mut state) = sink.state.write() {
            state.fail_after = Some(batches);
        }
        sink
    }

    /// Rows of `table`, ordered by natural key
    pub fn rows(&self, table: &str) -> Vec<(String, JsonObject)> {
        self.state
            .read()
            .map(|s| {
                s.tables
                    .get(table)
                    .map(|rows| rows.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    /// Sizes of the accepted batches, in order
    pub fn batch_sizes(&self, table: &str) -> Vec<usize> {
        self.state
            .read()
            .map(|s| {
                s.batches
                    .iter()
                    .filter(|(t, _)| t == table)
                    .map(|(_, n)| *n)
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl RecordSink for MemorySink {
    fn upsert(&self, table: &str, records: &[StagingRecord]) -> Result<usize> {
        let mut state = self
            .state
            .write()
            .map_err(|_| Error::state("memory sink lock poisoned"))?;

        if let Some(limit) = state.fail_after {
            if state.batches.len() >= limit {
                return Err(Error::storage(format!("upsert into {table} rejected")));
            }
        }

        let rows = state.tables.entry(table.to_string()).or_default();
        for record in records {
            rows.insert(record.natural_key.clone(), record.fields.clone());
        }
        state.batches.push((table.to_string(), records.len()));
        Ok(records.len())
    }
}
