//! Reprocessing of failed items
//!
//! Replays reference ids through the same fetch, map and batch path as a
//! regular run. Failure ledger rows of an `(entity, reference_id)` pair are
//! resolved together once a batch holding that id's records is stored.
//!
//! Two entry points exist. The manual path takes an explicit id list and
//! records a fresh failure row for every id that still fails. The
//! unresolved path replays the ledger itself and never adds rows.

use crate::buffer::{BatchBuffer, RecordSink};
use crate::engine::EntityDescriptor;
use crate::error::{ItemError, Result};
use crate::ledger::{FailureLedger, NewFailure, RunLedger};
use crate::types::{Clock, RunStatus, SystemClock, ACTION_REPROCESS};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Outcome of replaying one entity
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ReprocessReport {
    /// Entity name
    pub entity: String,
    /// Run ledger id of the replay
    pub run_id: i64,
    /// Distinct ids attempted
    pub attempted: usize,
    /// Ids whose records were stored
    pub loaded: Vec<String>,
    /// Ids that failed again
    pub still_failing: Vec<String>,
    /// Failure rows flipped to resolved
    pub resolved_failures: usize,
    /// Records written to staging
    pub records_written: usize,
}

/// Replays failed or hand-picked ids
pub struct Reprocessor {
    failures: Arc<dyn FailureLedger>,
    runs: Arc<dyn RunLedger>,
    sink: Arc<dyn RecordSink>,
    clock: Arc<dyn Clock>,
}

impl Reprocessor {
    /// Create a reprocessor using the system clock
    pub fn new(
        failures: Arc<dyn FailureLedger>,
        runs: Arc<dyn RunLedger>,
        sink: Arc<dyn RecordSink>,
    ) -> Self {
        Self {
            failures,
            runs,
            sink,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replay an explicit id list, recording a new failure row for each id
    /// that fails again
    pub async fn reprocess(
        &self,
        entity: &EntityDescriptor,
        ids: &[String],
    ) -> Result<ReprocessReport> {
        self.replay(entity, ids, true).await
    }

    /// Replay every unresolved failure of one entity
    pub async fn reprocess_unresolved(&self, entity: &EntityDescriptor) -> Result<ReprocessReport> {
        let ids: Vec<String> = self
            .failures
            .unresolved(Some(&entity.name))?
            .into_iter()
            .map(|f| f.reference_id)
            .collect();
        self.replay(entity, &ids, false).await
    }

    /// Replay every unresolved failure in the ledger.
    ///
    /// Failures of entities missing from `entities` are skipped with a
    /// warning. Entities are replayed in name order; the first run-level
    /// error stops the sweep.
    pub async fn reprocess_all_unresolved(
        &self,
        entities: &[EntityDescriptor],
    ) -> Result<Vec<ReprocessReport>> {
        let mut by_entity: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for failure in self.failures.unresolved(None)? {
            by_entity
                .entry(failure.entity)
                .or_default()
                .push(failure.reference_id);
        }

        let mut reports = Vec::new();
        for (name, ids) in by_entity {
            let Some(entity) = entities.iter().find(|e| e.name == name) else {
                warn!(entity = %name, failures = ids.len(), "No descriptor for entity, skipping");
                continue;
            };
            reports.push(self.replay(entity, &ids, false).await?);
        }
        Ok(reports)
    }

    async fn replay(
        &self,
        entity: &EntityDescriptor,
        ids: &[String],
        record_new_failures: bool,
    ) -> Result<ReprocessReport> {
        let run_id = self
            .runs
            .start(entity.table_label(), ACTION_REPROCESS, self.clock.now())?;
        info!(entity = %entity.name, run_id, ids = ids.len(), "Reprocess started");

        match self.replay_ids(entity, ids, run_id, record_new_failures).await {
            Ok(report) => {
                self.runs
                    .finish(run_id, RunStatus::Finished, self.clock.now(), None)?;
                info!(
                    entity = %entity.name,
                    run_id,
                    loaded = report.loaded.len(),
                    still_failing = report.still_failing.len(),
                    resolved = report.resolved_failures,
                    "Reprocess finished"
                );
                Ok(report)
            }
            Err(e) => {
                let message = e.to_string();
                error!(entity = %entity.name, run_id, error = %message, "Reprocess failed");
                if let Err(ledger_err) =
                    self.runs
                        .finish(run_id, RunStatus::Error, self.clock.now(), Some(&message))
                {
                    warn!(run_id, error = %ledger_err, "Could not mark run as failed");
                }
                Err(e)
            }
        }
    }

    async fn replay_ids(
        &self,
        entity: &EntityDescriptor,
        ids: &[String],
        run_id: i64,
        record_new_failures: bool,
    ) -> Result<ReprocessReport> {
        let mut report = ReprocessReport {
            entity: entity.name.clone(),
            run_id,
            ..ReprocessReport::default()
        };
        let mut buffer = BatchBuffer::new(&entity.physical_table, entity.batch_size);
        let mut seen = HashSet::new();

        for reference_id in ids {
            if !seen.insert(reference_id.as_str()) {
                continue;
            }
            report.attempted += 1;

            match self.fetch_and_map(entity, reference_id).await? {
                Ok(records) => {
                    buffer.append_item(reference_id, records);
                    buffer.flush_if_full(self.sink.as_ref())?;
                    self.resolve_committed(entity, &mut buffer, &mut report)?;
                }
                Err(item_error) => {
                    warn!(
                        entity = %entity.name,
                        run_id,
                        reference_id = %reference_id,
                        error = %item_error,
                        "Item still failing"
                    );
                    if record_new_failures {
                        let failure = NewFailure::new(
                            &entity.name,
                            reference_id,
                            item_error.to_string(),
                            Some(run_id),
                        );
                        self.failures.record(&failure, self.clock.now())?;
                    }
                    report.still_failing.push(reference_id.clone());
                }
            }
        }

        buffer.flush_remaining(self.sink.as_ref())?;
        self.resolve_committed(entity, &mut buffer, &mut report)?;
        report.records_written = buffer.written();
        Ok(report)
    }

    async fn fetch_and_map(
        &self,
        entity: &EntityDescriptor,
        reference_id: &str,
    ) -> Result<std::result::Result<Vec<crate::mapping::StagingRecord>, ItemError>> {
        let payload = match entity.source.fetch_detail(reference_id).await {
            Ok(Some(payload)) => payload,
            Ok(None) => return Ok(Err(ItemError::EmptyPayload)),
            Err(e) if e.is_run_fatal() => return Err(e),
            Err(e) => return Ok(Err(ItemError::from(&e))),
        };
        Ok(entity.mapper.map(reference_id, &payload))
    }

    fn resolve_committed(
        &self,
        entity: &EntityDescriptor,
        buffer: &mut BatchBuffer,
        report: &mut ReprocessReport,
    ) -> Result<()> {
        for reference_id in buffer.take_committed() {
            let flipped = self
                .failures
                .mark_resolved(&entity.name, &reference_id, self.clock.now())?;
            if flipped > 0 {
                info!(
                    entity = %entity.name,
                    reference_id = %reference_id,
                    failures = flipped,
                    "Failure resolved"
                );
            }
            report.resolved_failures += flipped;
            report.loaded.push(reference_id);
        }
        Ok(())
    }
}

impl std::fmt::Debug for Reprocessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reprocessor").finish_non_exhaustive()
    }
}
