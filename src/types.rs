//! Common types used throughout stagesync
//!
//! This module contains shared type definitions, type aliases,
//! and utility types used across multiple modules.

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

// ============================================================================
// Type Aliases
// ============================================================================

/// JSON value type (re-exported from serde_json)
pub type JsonValue = serde_json::Value;

/// JSON object type
pub type JsonObject = serde_json::Map<String, JsonValue>;

/// Stage label used for API → staging loads
pub const DEFAULT_STAGE: &str = "api_to_stg";

/// Action label written to the run ledger for scheduled extractions
pub const ACTION_EXTRACTION: &str = "extraction";

/// Action label written to the run ledger for replays
pub const ACTION_REPROCESS: &str = "reprocess";

// ============================================================================
// Load Mode
// ============================================================================

/// How an entity's extraction window is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    /// Re-import the configured historical range
    Full,
    /// Only fetch records changed since the last watermark
    #[default]
    Incremental,
}

impl LoadMode {
    /// Label used in logs and the CLI
    pub fn as_str(self) -> &'static str {
        match self {
            LoadMode::Full => "full",
            LoadMode::Incremental => "incremental",
        }
    }
}

impl fmt::Display for LoadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Run Status
// ============================================================================

/// Status of a run record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Run opened, not yet terminal
    Started,
    /// Crawl exhausted and every batch persisted
    Finished,
    /// Aborted by a run-level error
    Error,
}

impl RunStatus {
    /// Stored representation
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Started => "started",
            RunStatus::Finished => "finished",
            RunStatus::Error => "error",
        }
    }

    /// Whether the status is terminal
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Started)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(RunStatus::Started),
            "finished" => Ok(RunStatus::Finished),
            "error" => Ok(RunStatus::Error),
            other => Err(crate::error::Error::state(format!(
                "unknown run status '{other}'"
            ))),
        }
    }
}

// ============================================================================
// Clock
// ============================================================================

/// Source of "now" for window computation and ledger timestamps.
///
/// Upstream filters and ledger rows use naive local time.
pub trait Clock: Send + Sync {
    /// Current local time
    fn now(&self) -> NaiveDateTime;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    /// Create a clock frozen at `now`
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Jump to a new instant
    pub fn set(&self, now: NaiveDateTime) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    /// Move forward by `delta`
    pub fn advance(&self, delta: chrono::Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += delta;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        self.now
            .lock()
            .map(|guard| *guard)
            .unwrap_or_else(|poisoned| *poisoned.into_inner())
    }
}

// ============================================================================
// Utilities
// ============================================================================

/// Extension trait for Option<String> to handle empty strings
pub trait OptionStringExt {
    /// Returns None if the string is empty
    fn none_if_empty(self) -> Option<String>;
}

impl OptionStringExt for Option<String> {
    fn none_if_empty(self) -> Option<String> {
        self.filter(|s| !s.trim().is_empty())
    }
}

impl OptionStringExt for String {
    fn none_if_empty(self) -> Option<String> {
        if self.trim().is_empty() {
            None
        } else {
            Some(self)
        }
    }
}
