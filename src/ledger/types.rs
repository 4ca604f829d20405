//! Ledger records and storage traits

use crate::error::Result;
use crate::types::RunStatus;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ============================================================================
// Failure Ledger
// ============================================================================

/// One recorded item failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Ledger-assigned id
    pub failure_id: i64,
    /// Entity the item belongs to
    pub entity: String,
    /// Upstream id in string form
    pub reference_id: String,
    /// Why the item failed
    pub error_message: String,
    /// Run that observed the failure, if any
    pub run_id: Option<i64>,
    /// When the failure was recorded
    pub occurred_at: NaiveDateTime,
    /// Whether a later replay succeeded
    pub resolved: bool,
    /// When the replay succeeded
    pub resolved_at: Option<NaiveDateTime>,
}

/// A failure about to be recorded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFailure {
    /// Entity the item belongs to
    pub entity: String,
    /// Upstream id in string form
    pub reference_id: String,
    /// Why the item failed
    pub error_message: String,
    /// Run that observed the failure
    pub run_id: Option<i64>,
}

impl NewFailure {
    /// Create a failure for `reference_id`
    pub fn new(
        entity: impl Into<String>,
        reference_id: impl Into<String>,
        error_message: impl Into<String>,
        run_id: Option<i64>,
    ) -> Self {
        Self {
            entity: entity.into(),
            reference_id: reference_id.into(),
            error_message: error_message.into(),
            run_id,
        }
    }
}

/// Append-only store of item failures
pub trait FailureLedger: Send + Sync {
    /// Append a failure, returning its id
    fn record(&self, failure: &NewFailure, at: NaiveDateTime) -> Result<i64>;

    /// Unresolved failures, oldest first, optionally for one entity
    fn unresolved(&self, entity: Option<&str>) -> Result<Vec<FailureRecord>>;

    /// Every failure, oldest first, optionally for one entity
    fn all(&self, entity: Option<&str>) -> Result<Vec<FailureRecord>>;

    /// Resolve every unresolved failure of `(entity, reference_id)`,
    /// returning how many rows flipped
    fn mark_resolved(&self, entity: &str, reference_id: &str, at: NaiveDateTime)
        -> Result<usize>;
}

// ============================================================================
// Run Ledger
// ============================================================================

/// One run controller invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Ledger-assigned id
    pub run_id: i64,
    /// Destination table label
    pub table_label: String,
    /// `extraction` or `reprocess`
    pub action: String,
    /// Current status
    pub status: RunStatus,
    /// When the run opened
    pub started_at: NaiveDateTime,
    /// When the run reached a terminal status
    pub finished_at: Option<NaiveDateTime>,
    /// Error that aborted the run
    pub error_message: Option<String>,
}

/// Observability record of runs
pub trait RunLedger: Send + Sync {
    /// Open a run with status `started`, returning its id
    fn start(&self, table_label: &str, action: &str, at: NaiveDateTime) -> Result<i64>;

    /// Move a run to a terminal status
    fn finish(
        &self,
        run_id: i64,
        status: RunStatus,
        at: NaiveDateTime,
        error_message: Option<&str>,
    ) -> Result<()>;

    /// Run by id
    fn get(&self, run_id: i64) -> Result<Option<RunRecord>>;

    /// Most recent runs, newest first
    fn recent(&self, limit: usize) -> Result<Vec<RunRecord>>;
}
