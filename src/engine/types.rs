//! Engine types

use crate::catalog::{EntitySpec, DEFAULT_BATCH_SIZE, DEFAULT_PAGE_SIZE};
use crate::config::EntityOverride;
use crate::error::{Error, Result};
use crate::mapping::RecordMapper;
use crate::source::EntitySource;
use crate::state::WatermarkKey;
use crate::types::{LoadMode, DEFAULT_STAGE};
use crate::window::ExtractionWindow;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Everything the run controller needs to know about one entity
#[derive(Clone)]
pub struct EntityDescriptor {
    /// Entity name
    pub name: String,
    /// Staging table
    pub physical_table: String,
    /// Watermark stage
    pub stage: String,
    /// Ids per listing page
    pub page_size: u32,
    /// Records per upsert batch
    pub batch_size: usize,
    /// Whether incremental windows apply
    pub supports_incremental: bool,
    /// Mode forcing, overriding the run default
    pub mode: Option<LoadMode>,
    /// Upstream access
    pub source: Arc<dyn EntitySource>,
    /// Payload mapper
    pub mapper: Arc<dyn RecordMapper>,
}

impl EntityDescriptor {
    /// Descriptor with default sizes and the default stage
    pub fn new(
        name: impl Into<String>,
        physical_table: impl Into<String>,
        source: Arc<dyn EntitySource>,
        mapper: Arc<dyn RecordMapper>,
    ) -> Self {
        Self {
            name: name.into(),
            physical_table: physical_table.into(),
            stage: DEFAULT_STAGE.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            supports_incremental: true,
            mode: None,
            source,
            mapper,
        }
    }

    /// Descriptor for a catalog entity
    pub fn from_spec(spec: &EntitySpec, source: Arc<dyn EntitySource>) -> Self {
        Self {
            page_size: spec.page_size,
            batch_size: spec.batch_size,
            supports_incremental: spec.supports_incremental,
            ..Self::new(spec.name, spec.physical_table, source, Arc::new(spec.mapper))
        }
    }

    /// Apply per-entity settings
    #[must_use]
    pub fn with_override(mut self, entity_override: Option<&EntityOverride>) -> Self {
        if let Some(o) = entity_override {
            if let Some(page_size) = o.page_size {
                self.page_size = page_size;
            }
            if let Some(batch_size) = o.batch_size {
                self.batch_size = batch_size as usize;
            }
            if o.mode.is_some() {
                self.mode = o.mode;
            }
        }
        self
    }

    /// Set the page size
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the batch size
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set incremental support
    #[must_use]
    pub fn with_incremental(mut self, supports_incremental: bool) -> Self {
        self.supports_incremental = supports_incremental;
        self
    }

    /// Force a mode for this entity
    #[must_use]
    pub fn with_mode(mut self, mode: LoadMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Mode a run actually uses; entities without incremental support
    /// always load in full
    pub fn effective_mode(&self, default: LoadMode) -> LoadMode {
        if self.supports_incremental {
            self.mode.unwrap_or(default)
        } else {
            LoadMode::Full
        }
    }

    /// Watermark key of this entity
    pub fn watermark_key(&self) -> WatermarkKey {
        WatermarkKey::new(&self.name, &self.physical_table, &self.stage)
    }

    /// Label written to the run ledger
    pub fn table_label(&self) -> &str {
        &self.physical_table
    }
}

impl fmt::Debug for EntityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityDescriptor")
            .field("name", &self.name)
            .field("physical_table", &self.physical_table)
            .field("stage", &self.stage)
            .field("page_size", &self.page_size)
            .field("batch_size", &self.batch_size)
            .field("supports_incremental", &self.supports_incremental)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// Lifecycle of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Nothing recorded yet
    NotStarted,
    /// Run record opened, crawl in progress
    Running,
    /// Crawl exhausted and watermark advanced
    Finished,
    /// Aborted by a run-level error
    Failed,
}

impl RunState {
    /// Move to `next`, rejecting transitions out of terminal states
    pub fn advance(self, next: RunState) -> Result<RunState> {
        let allowed = matches!(
            (self, next),
            (RunState::NotStarted, RunState::Running)
                | (RunState::Running, RunState::Finished)
                | (RunState::Running, RunState::Failed)
        );
        if allowed {
            Ok(next)
        } else {
            Err(Error::state(format!(
                "invalid run transition {self:?} -> {next:?}"
            )))
        }
    }

    /// Whether the run is over
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Finished | RunState::Failed)
    }
}

/// Outcome of a finished run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Run ledger id
    pub run_id: i64,
    /// Entity name
    pub entity: String,
    /// Mode actually used
    pub mode: LoadMode,
    /// Window extracted
    pub window: ExtractionWindow,
    /// Non-empty pages processed
    pub pages: usize,
    /// Ids visited
    pub items: usize,
    /// Records written to staging
    pub records_written: usize,
    /// Items recorded in the failure ledger
    pub failures: usize,
    /// Terminal state
    pub state: RunState,
    /// Wall time in milliseconds
    pub duration_ms: u64,
}

impl RunReport {
    /// Whether some items failed while the run itself finished
    pub fn has_item_failures(&self) -> bool {
        self.failures > 0
    }
}
