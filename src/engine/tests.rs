//! Tests for the run controller

use super::*;
use crate::buffer::MemorySink;
use crate::config::LoadOptions;
use crate::error::Error;
use crate::ledger::{MemoryFailureLedger, MemoryRunLedger};
use crate::mapping::StagingRecord;
use crate::source::{EntitySource, MemoryEntitySource};
use crate::state::{MemoryWatermarkStore, WatermarkKey};
use crate::types::ManualClock;
use crate::window::{midnight, ExtractionWindow};
use chrono::{NaiveDate, NaiveDateTime};
use pretty_assertions::assert_eq;
use serde_json::json;

fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, 0, 0)
        .unwrap()
}

// Wednesday
fn now() -> NaiveDateTime {
    at(2024, 3, 6, 10)
}

fn options() -> LoadOptions {
    let bounds = ExtractionWindow::new(at(2023, 1, 1, 0), at(2023, 12, 31, 0)).unwrap();
    LoadOptions::new(LoadMode::Incremental, bounds).with_margin_days(2)
}

fn map_item(reference_id: &str, payload: &JsonValue) -> std::result::Result<Vec<StagingRecord>, ItemError> {
    if payload.get("broken").is_some() {
        return Err(ItemError::mapping("payload flagged broken"));
    }
    Ok(vec![StagingRecord::new(reference_id, payload.clone())])
}

struct Harness {
    watermarks: Arc<MemoryWatermarkStore>,
    failures: Arc<MemoryFailureLedger>,
    runs: Arc<MemoryRunLedger>,
    sink: Arc<MemorySink>,
    controller: RunController,
}

fn harness_with(sink: MemorySink) -> Harness {
    let watermarks = Arc::new(MemoryWatermarkStore::new());
    let failures = Arc::new(MemoryFailureLedger::new());
    let runs = Arc::new(MemoryRunLedger::new());
    let sink = Arc::new(sink);
    let controller = RunController::new(
        options(),
        watermarks.clone(),
        failures.clone(),
        runs.clone(),
        sink.clone(),
    )
    .with_clock(Arc::new(ManualClock::new(now())));
    Harness {
        watermarks,
        failures,
        runs,
        sink,
        controller,
    }
}

fn harness() -> Harness {
    harness_with(MemorySink::new())
}

fn entity(source: MemoryEntitySource) -> EntityDescriptor {
    let source: Arc<dyn EntitySource> = Arc::new(source);
    EntityDescriptor::new("product", "product", source, Arc::new(map_item))
}

fn source_with(ids: &[&str]) -> MemoryEntitySource {
    let mut source = MemoryEntitySource::new().with_page(ids.iter().copied());
    for id in ids {
        source = source.with_detail(*id, json!({"id": id, "name": format!("item {id}")}));
    }
    source
}

fn key() -> WatermarkKey {
    WatermarkKey::staging("product", "product")
}

#[tokio::test]
async fn test_clean_run_advances_watermark() {
    let h = harness();
    let report = h
        .controller
        .run(&entity(source_with(&["1", "2", "3"])))
        .await
        .unwrap();

    assert_eq!(report.state, RunState::Finished);
    assert_eq!(report.records_written, 3);
    assert_eq!(report.failures, 0);
    assert_eq!(report.mode, LoadMode::Incremental);
    // No watermark yet: window starts at the initial epoch
    assert_eq!(report.window.start, options().initial_epoch);
    assert_eq!(report.window.end, now());

    let watermark = h.watermarks.get(&key()).unwrap().unwrap();
    assert_eq!(watermark.last_load_time, now());
    assert!(watermark.supports_incremental);

    let run = h.runs.get(report.run_id).unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Finished);
    assert_eq!(run.action, "extraction");
    assert_eq!(run.table_label, "product");
}

#[tokio::test]
async fn test_window_uses_existing_watermark() {
    let h = harness();
    h.watermarks
        .upsert(&WatermarkRecord::new(key(), at(2024, 3, 5, 18), true))
        .unwrap();

    let report = h.controller.run(&entity(source_with(&["1"]))).await.unwrap();
    assert_eq!(
        report.window.start,
        midnight(NaiveDate::from_ymd_opt(2024, 3, 3).unwrap())
    );
}

#[tokio::test]
async fn test_item_failures_are_isolated() {
    let h = harness();
    let ids = ["1", "2", "3", "4", "5", "6", "7", "8", "9", "10"];
    let source = source_with(&ids).with_detail_status("5", 500);

    let report = h.controller.run(&entity(source)).await.unwrap();

    assert_eq!(report.state, RunState::Finished);
    assert_eq!(report.records_written, 9);
    assert_eq!(report.failures, 1);
    assert!(report.has_item_failures());

    let failures = h.failures.unresolved(Some("product")).unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].reference_id, "5");
    assert_eq!(failures[0].run_id, Some(report.run_id));
    assert_eq!(
        h.runs.get(report.run_id).unwrap().unwrap().status,
        RunStatus::Finished
    );
}

#[tokio::test]
async fn test_mapping_failure_is_item_failure() {
    let h = harness();
    let source = source_with(&["1", "2"]).with_detail("2", json!({"id": 2, "broken": true}));

    let report = h.controller.run(&entity(source)).await.unwrap();
    assert_eq!(report.records_written, 1);

    let failures = h.failures.all(None).unwrap();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].error_message.contains("payload flagged broken"));
}

#[tokio::test]
async fn test_flush_failure_blocks_watermark_advance() {
    let h = harness_with(MemorySink::failing_after(1));
    let previous = WatermarkRecord::new(key(), at(2024, 3, 1, 0), true);
    h.watermarks.upsert(&previous).unwrap();

    // 25 items with batch size 20: the final partial flush fails
    let ids: Vec<String> = (1..=25).map(|i| i.to_string()).collect();
    let refs: Vec<&str> = ids.iter().map(String::as_str).collect();

    let err = h
        .controller
        .run(&entity(source_with(&refs)))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Storage { .. }));

    assert_eq!(h.watermarks.get(&key()).unwrap().unwrap(), previous);
    let runs = h.runs.recent(1).unwrap();
    let run = &runs[0];
    assert_eq!(run.status, RunStatus::Error);
    assert!(run.error_message.as_deref().unwrap().contains("rejected"));
    assert_eq!(h.sink.batch_sizes("product"), vec![20]);
}

#[tokio::test]
async fn test_listing_failure_marks_run_error() {
    let h = harness();
    let source = MemoryEntitySource::new().with_listing_status(1, 503);

    let err = h.controller.run(&entity(source)).await.unwrap_err();
    assert_eq!(err.status(), Some(503));
    assert!(h.watermarks.get(&key()).unwrap().is_none());
    assert_eq!(h.runs.recent(1).unwrap()[0].status, RunStatus::Error);
}

#[tokio::test]
async fn test_listing_404_finishes_empty_run() {
    let h = harness();
    let source = MemoryEntitySource::new().with_listing_status(1, 404);

    let report = h.controller.run(&entity(source)).await.unwrap();
    assert_eq!(report.items, 0);
    assert_eq!(report.state, RunState::Finished);
    assert!(h.watermarks.get(&key()).unwrap().is_some());
}

#[tokio::test]
async fn test_full_mode_marker_and_bounds() {
    let h = harness();
    let descriptor = entity(source_with(&["1"])).with_mode(LoadMode::Full);

    let report = h.controller.run(&descriptor).await.unwrap();
    assert_eq!(report.mode, LoadMode::Full);
    assert_eq!(report.window, options().full_bounds);
    // Bounds end before now, so the marker is the bounds end
    assert_eq!(
        h.watermarks.get(&key()).unwrap().unwrap().last_load_time,
        at(2023, 12, 31, 0)
    );
}

#[tokio::test]
async fn test_non_incremental_entity_always_runs_full() {
    let h = harness();
    let descriptor = entity(source_with(&["1"])).with_incremental(false);

    let report = h.controller.run(&descriptor).await.unwrap();
    assert_eq!(report.mode, LoadMode::Full);
    assert!(!h.watermarks.get(&key()).unwrap().unwrap().supports_incremental);
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let h = harness();
    let descriptor = entity(source_with(&["1", "2"]));
    h.controller.run(&descriptor).await.unwrap();
    h.controller.run(&descriptor).await.unwrap();

    assert_eq!(h.sink.rows("product").len(), 2);
    assert_eq!(h.runs.recent(10).unwrap().len(), 2);
}

#[tokio::test]
async fn test_run_all_continues_after_failure() {
    let h = harness();
    let failing = EntityDescriptor::new(
        "contact",
        "contact",
        Arc::new(MemoryEntitySource::new().with_listing_status(1, 500)),
        Arc::new(map_item),
    );
    let ok = entity(source_with(&["1"]));

    let outcomes = h.controller.run_all(&[failing, ok]).await;
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes[0].1.is_err());
    assert_eq!(outcomes[1].0, "product");
    assert!(outcomes[1].1.is_ok());
}

#[test]
fn test_run_state_transitions() {
    let running = RunState::NotStarted.advance(RunState::Running).unwrap();
    assert!(running.advance(RunState::Failed).unwrap().is_terminal());
    assert!(RunState::Finished.advance(RunState::Running).is_err());
    assert!(RunState::NotStarted.advance(RunState::Finished).is_err());
}

#[test]
fn test_descriptor_from_catalog_with_override() {
    let spec = crate::catalog::find("sales_order").unwrap();
    let source: Arc<dyn EntitySource> = Arc::new(MemoryEntitySource::new());
    let entity_override = crate::config::EntityOverride {
        page_size: Some(50),
        batch_size: Some(5),
        mode: Some(LoadMode::Full),
    };
    let descriptor = EntityDescriptor::from_spec(spec, source).with_override(Some(&entity_override));

    assert_eq!(descriptor.page_size, 50);
    assert_eq!(descriptor.batch_size, 5);
    assert_eq!(descriptor.effective_mode(LoadMode::Incremental), LoadMode::Full);
    assert_eq!(descriptor.watermark_key().stage, "api_to_stg");
}
