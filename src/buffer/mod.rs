//! Batch upsert buffer
//!
//! Mapped records accumulate in arrival order and go to a [`RecordSink`] one
//! batch at a time. The buffer never deduplicates; the sink's natural-key
//! upsert makes re-ingestion idempotent.

mod sink;

pub use sink::{MemorySink, RecordSink};

use crate::error::Result;
use crate::mapping::StagingRecord;
use tracing::debug;

/// Bounded buffer in front of a record sink
#[derive(Debug)]
pub struct BatchBuffer {
    table: String,
    threshold: usize,
    records: Vec<StagingRecord>,
    pending_refs: Vec<String>,
    committed_refs: Vec<String>,
    written: usize,
    flushes: usize,
}

impl BatchBuffer {
    /// Buffer flushing to `table` every `threshold` records (at least 1)
    pub fn new(table: impl Into<String>, threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            table: table.into(),
            threshold,
            records: Vec::with_capacity(threshold),
            pending_refs: Vec::new(),
            committed_refs: Vec::new(),
            written: 0,
            flushes: 0,
        }
    }

    /// Append one record
    pub fn append(&mut self, record: StagingRecord) {
        self.records.push(record);
    }

    /// Append every record mapped from one upstream item.
    ///
    /// The reference id is reported by [`take_committed`](Self::take_committed)
    /// once the batch holding those records has been written.
    pub fn append_item(&mut self, reference_id: &str, records: Vec<StagingRecord>) {
        self.records.extend(records);
        self.pending_refs.push(reference_id.to_string());
    }

    /// Flush when the threshold is reached, returning records written
    pub fn flush_if_full(&mut self, sink: &dyn RecordSink) -> Result<usize> {
        if self.records.len() >= self.threshold {
            self.flush(sink)
        } else {
            Ok(0)
        }
    }

    /// Flush whatever is left; an empty buffer writes nothing
    pub fn flush_remaining(&mut self, sink: &dyn RecordSink) -> Result<usize> {
        self.flush(sink)
    }

    /// Write the buffered records as one batch.
    ///
    /// The buffer is cleared before the sink is called, so a failed flush
    /// drops the batch.
    fn flush(&mut self, sink: &dyn RecordSink) -> Result<usize> {
        let batch = std::mem::take(&mut self.records);
        let refs = std::mem::take(&mut self.pending_refs);

        let written = if batch.is_empty() {
            0
        } else {
            sink.upsert(&self.table, &batch)?
        };

        if !batch.is_empty() {
            self.flushes += 1;
            debug!(table = %self.table, records = written, "Batch written");
        }
        self.written += written;
        self.committed_refs.extend(refs);
        Ok(written)
    }

    /// Reference ids whose records are now stored, draining the list
    pub fn take_committed(&mut self) -> Vec<String> {
        std::mem::take(&mut self.committed_refs)
    }

    /// Records waiting for the next flush
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no record is waiting
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Flush threshold
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Destination table
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Records written across all flushes
    pub fn written(&self) -> usize {
        self.written
    }

    /// Non-empty flushes performed
    pub fn flushes(&self) -> usize {
        self.flushes
    }
}
