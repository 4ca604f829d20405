//! In-memory ledgers

use super::types::{FailureLedger, FailureRecord, NewFailure, RunLedger, RunRecord};
use crate::error::{Error, Result};
use crate::types::RunStatus;
use chrono::NaiveDateTime;
use std::sync::RwLock;

fn poisoned() -> Error {
    Error::state("ledger lock poisoned")
}

fn matches_entity(record: &FailureRecord, entity: Option<&str>) -> bool {
    entity.map_or(true, |e| record.entity == e)
}

/// Failure ledger kept in a vector
#[derive(Debug, Default)]
pub struct MemoryFailureLedger {
    rows: RwLock<Vec<FailureRecord>>,
}

impl MemoryFailureLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }
}

impl FailureLedger for MemoryFailureLedger {
    fn record(&self, failure: &NewFailure, at: NaiveDateTime) -> Result<i64> {
        let mut rows = self.rows.write().map_err(|_| poisoned())?;
        let failure_id = rows.len() as i64 + 1;
        rows.push(FailureRecord {
            failure_id,
            entity: failure.entity.clone(),
            reference_id: failure.reference_id.clone(),
            error_message: failure.error_message.clone(),
            run_id: failure.run_id,
            occurred_at: at,
            resolved: false,
            resolved_at: None,
        });
        Ok(failure_id)
    }

    fn unresolved(&self, entity: Option<&str>) -> Result<Vec<FailureRecord>> {
        let rows = self.rows.read().map_err(|_| poisoned())?;
        Ok(rows
            .iter()
            .filter(|r| !r.resolved && matches_entity(r, entity))
            .cloned()
            .collect())
    }

    fn all(&self, entity: Option<&str>) -> Result<Vec<FailureRecord>> {
        let rows = self.rows.read().map_err(|_| poisoned())?;
        Ok(rows
            .iter()
            .filter(|r| matches_entity(r, entity))
            .cloned()
            .collect())
    }

    fn mark_resolved(
        &self,
        entity: &str,
        reference_id: &str,
        at: NaiveDateTime,
    ) -> Result<usize> {
        let mut rows = self.rows.write().map_err(|_| poisoned())?;
        let mut flipped = 0;
        for row in rows
            .iter_mut()
            .filter(|r| !r.resolved && r.entity == entity && r.reference_id == reference_id)
        {
            row.resolved = true;
            row.resolved_at = Some(at);
            flipped += 1;
        }
        Ok(flipped)
    }
}

/// Run ledger kept in a vector
#[derive(Debug, Default)]
pub struct MemoryRunLedger {
    runs: RwLock<Vec<RunRecord>>,
}

impl MemoryRunLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }
}

impl RunLedger for MemoryRunLedger {
    fn start(&self, table_label: &str, action: &str, at: NaiveDateTime) -> Result<i64> {
        let mut runs = self.runs.write().map_err(|_| poisoned())?;
        let run_id = runs.len() as i64 + 1;
        runs.push(RunRecord {
            run_id,
            table_label: table_label.to_string(),
            action: action.to_string(),
            status: RunStatus::Started,
            started_at: at,
            finished_at: None,
            error_message: None,
        });
        Ok(run_id)
    }

    fn finish(
        &self,
        run_id: i64,
        status: RunStatus,
        at: NaiveDateTime,
        error_message: Option<&str>,
    ) -> Result<()> {
        let mut runs = self.runs.write().map_err(|_| poisoned())?;
        let run = runs
            .iter_mut()
            .find(|r| r.run_id == run_id)
            .ok_or_else(|| Error::state(format!("run {run_id} does not exist")))?;
        if run.status.is_terminal() {
            return Err(Error::state(format!(
                "run {run_id} already {}",
                run.status
            )));
        }
        run.status = status;
        run.finished_at = Some(at);
        run.error_message = error_message.map(str::to_string);
        Ok(())
    }

    fn get(&self, run_id: i64) -> Result<Option<RunRecord>> {
        let runs = self.runs.read().map_err(|_| poisoned())?;
        Ok(runs.iter().find(|r| r.run_id == run_id).cloned())
    }

    fn recent(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let runs = self.runs.read().map_err(|_| poisoned())?;
        Ok(runs.iter().rev().take(limit).cloned().collect())
    }
}
