//! Run controller
//!
//! Drives one entity from window computation to watermark advance.
//!
//! # Overview
//!
//! A run opens a run record, computes the window, crawls every page, maps
//! each payload into the batch buffer and flushes in bounded batches. Item
//! failures go to the failure ledger and the crawl continues. On a clean
//! finish the watermark advances; on any run-level error the run record is
//! marked `error`, the watermark stays where it was and the error is
//! returned.

mod types;

pub use types::{EntityDescriptor, RunReport, RunState};

use crate::buffer::{BatchBuffer, RecordSink};
use crate::config::LoadOptions;
use crate::crawler::{CrawlOptions, CrawlVisitor, PaginatedCrawler};
use crate::error::{ItemError, Result};
use crate::ledger::{FailureLedger, NewFailure, RunLedger};
use crate::state::{WatermarkRecord, WatermarkStore};
use crate::types::{Clock, JsonValue, LoadMode, RunStatus, SystemClock, ACTION_EXTRACTION};
use crate::window::WindowCalculator;
use chrono::NaiveDateTime;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Orchestrates entity runs against shared stores
pub struct RunController {
    options: LoadOptions,
    watermarks: Arc<dyn WatermarkStore>,
    failures: Arc<dyn FailureLedger>,
    runs: Arc<dyn RunLedger>,
    sink: Arc<dyn RecordSink>,
    clock: Arc<dyn Clock>,
}

impl RunController {
    /// Create a controller using the system clock
    pub fn new(
        options: LoadOptions,
        watermarks: Arc<dyn WatermarkStore>,
        failures: Arc<dyn FailureLedger>,
        runs: Arc<dyn RunLedger>,
        sink: Arc<dyn RecordSink>,
    ) -> Self {
        Self {
            options,
            watermarks,
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

    /// Load options of every run
    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    /// Run one entity to a terminal state.
    ///
    /// Returns the report of a finished run, possibly with item failures.
    /// A run-level error is returned after the run record is marked `error`.
    pub async fn run(&self, entity: &EntityDescriptor) -> Result<RunReport> {
        let timer = Instant::now();
        let mode = entity.effective_mode(self.options.mode);
        let started_at = self.clock.now();

        let state = RunState::NotStarted;
        let run_id = self
            .runs
            .start(entity.table_label(), ACTION_EXTRACTION, started_at)?;
        let state = state.advance(RunState::Running)?;
        info!(entity = %entity.name, run_id, mode = %mode, "Run started");

        match self.execute(entity, mode, run_id, started_at).await {
            Ok(mut report) => {
                self.runs
                    .finish(run_id, RunStatus::Finished, self.clock.now(), None)?;
                report.state = state.advance(RunState::Finished)?;
                report.duration_ms = timer.elapsed().as_millis() as u64;
                info!(
                    entity = %entity.name,
                    run_id,
                    records = report.records_written,
                    failures = report.failures,
                    duration_ms = report.duration_ms,
                    "Run finished"
                );
                Ok(report)
            }
            Err(e) => {
                let message = e.to_string();
                error!(entity = %entity.name, run_id, error = %message, "Run failed");
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

    /// Run each entity in order; a failed entity does not stop the next
    pub async fn run_all(&self, entities: &[EntityDescriptor]) -> Vec<(String, Result<RunReport>)> {
        let mut outcomes = Vec::with_capacity(entities.len());
        for entity in entities {
            let outcome = self.run(entity).await;
            outcomes.push((entity.name.clone(), outcome));
        }
        outcomes
    }

    async fn execute(
        &self,
        entity: &EntityDescriptor,
        mode: LoadMode,
        run_id: i64,
        started_at: NaiveDateTime,
    ) -> Result<RunReport> {
        let key = entity.watermark_key();
        let last = self.watermarks.get(&key)?.map(|w| w.last_load_time);
        let window = WindowCalculator::new(&self.options).compute(mode, last, started_at)?;
        info!(entity = %entity.name, run_id, window = %window, "Window computed");

        let crawl_options = CrawlOptions::new(entity.page_size)
            .with_empty_page_tolerance(self.options.empty_page_tolerance);
        let crawler = PaginatedCrawler::new(entity.source.as_ref(), crawl_options);

        let mut loader = LoadVisitor {
            entity,
            run_id,
            buffer: BatchBuffer::new(&entity.physical_table, entity.batch_size),
            sink: self.sink.as_ref(),
            failures: self.failures.as_ref(),
            clock: self.clock.as_ref(),
            failed: 0,
        };
        let summary = crawler.crawl(window, mode, &mut loader).await?;
        loader.buffer.flush_remaining(loader.sink)?;

        let marker = match mode {
            LoadMode::Full => self.options.full_bounds.end.min(started_at),
            LoadMode::Incremental => started_at,
        };
        self.watermarks.upsert(&WatermarkRecord::new(
            key,
            marker,
            entity.supports_incremental,
        ))?;

        Ok(RunReport {
            run_id,
            entity: entity.name.clone(),
            mode,
            window,
            pages: summary.pages,
            items: summary.items,
            records_written: loader.buffer.written(),
            failures: loader.failed,
            state: RunState::Running,
            duration_ms: 0,
        })
    }
}

impl std::fmt::Debug for RunController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunController")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Maps crawled items into the buffer and records item failures
struct LoadVisitor<'a> {
    entity: &'a EntityDescriptor,
    run_id: i64,
    buffer: BatchBuffer,
    sink: &'a dyn RecordSink,
    failures: &'a dyn FailureLedger,
    clock: &'a dyn Clock,
    failed: usize,
}

impl LoadVisitor<'_> {
    fn record_failure(&mut self, reference_id: &str, item_error: &ItemError) -> Result<()> {
        let failure = NewFailure::new(
            &self.entity.name,
            reference_id,
            item_error.to_string(),
            Some(self.run_id),
        );
        self.failures.record(&failure, self.clock.now())?;
        self.failed += 1;
        warn!(
            entity = %self.entity.name,
            run_id = self.run_id,
            reference_id,
            error = %item_error,
            "Item failed"
        );
        Ok(())
    }
}

impl CrawlVisitor for LoadVisitor<'_> {
    fn visit(
        &mut self,
        reference_id: &str,
        outcome: std::result::Result<JsonValue, ItemError>,
    ) -> Result<()> {
        let mapped = outcome.and_then(|payload| self.entity.mapper.map(reference_id, &payload));
        match mapped {
            Ok(records) => {
                self.buffer.append_item(reference_id, records);
                self.buffer.flush_if_full(self.sink)?;
                Ok(())
            }
            Err(item_error) => self.record_failure(reference_id, &item_error),
        }
    }
}

#[cfg(test)]
mod tests;
