//! Tests for the staging database

use super::*;
use crate::auth::{TokenSet, TokenStore};
use crate::buffer::RecordSink;
use crate::error::Error;
use crate::ledger::{FailureLedger, NewFailure, RunLedger};
use crate::mapping::StagingRecord;
use crate::state::{WatermarkKey, WatermarkRecord, WatermarkStore};
use crate::types::{ManualClock, RunStatus};
use chrono::{NaiveDate, NaiveDateTime};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

fn at(d: u32, h: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, d)
        .unwrap()
        .and_hms_opt(h, 0, 0)
        .unwrap()
}

#[test]
fn test_upsert_is_idempotent_and_keeps_loaded_at() {
    let clock = Arc::new(ManualClock::new(at(1, 8)));
    let db = StagingDatabase::open_in_memory()
        .unwrap()
        .with_clock(clock.clone());

    let first = StagingRecord::new("42", json!({"id": 42, "name": "Caneca", "price": 10.0}));
    assert_eq!(RecordSink::upsert(&db, "product", &[first]).unwrap(), 1);

    clock.set(at(2, 8));
    let second = StagingRecord::new("42", json!({"id": 42, "name": "Caneca azul", "price": 12.5}));
    assert_eq!(RecordSink::upsert(&db, "product", &[second]).unwrap(), 1);

    let rows = db.staged_rows("product").unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].record["name"], "Caneca azul");
    assert_eq!(rows[0].loaded_at, at(1, 8));
    assert_eq!(rows[0].updated_at, at(2, 8));
}

#[test]
fn test_duplicate_keys_in_one_batch_last_wins() {
    let db = StagingDatabase::open_in_memory().unwrap();
    let batch = vec![
        StagingRecord::new("1", json!({"v": "old"})),
        StagingRecord::new("2", json!({"v": "x"})),
        StagingRecord::new("1", json!({"v": "new"})),
    ];
    assert_eq!(RecordSink::upsert(&db, "seller", &batch).unwrap(), 3);

    let rows = db.staged_rows("seller").unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].record["v"], "new");
}

#[test]
fn test_invalid_table_name_rejected() {
    let db = StagingDatabase::open_in_memory().unwrap();
    let records = [StagingRecord::new("1", json!({}))];
    let err = RecordSink::upsert(&db, "product; DROP TABLE x", &records).unwrap_err();
    assert!(matches!(err, Error::InvalidConfigValue { .. }));
    assert_eq!(RecordSink::upsert(&db, "product", &[]).unwrap(), 0);
}

#[test]
fn test_watermark_round_trip_and_update() {
    let db = StagingDatabase::open_in_memory().unwrap();
    let key = WatermarkKey::staging("contact", "contact");
    assert!(WatermarkStore::get(&db, &key).unwrap().is_none());

    WatermarkStore::upsert(&db, &WatermarkRecord::new(key.clone(), at(1, 0), true))
        .unwrap();
    WatermarkStore::upsert(&db, &WatermarkRecord::new(key.clone(), at(5, 10), true))
        .unwrap();

    let stored = WatermarkStore::get(&db, &key).unwrap().unwrap();
    assert_eq!(stored.last_load_time, at(5, 10));
    assert_eq!(db.list().unwrap().len(), 1);
}

#[test]
fn test_failure_ledger() {
    let db = StagingDatabase::open_in_memory().unwrap();
    let first = db
        .record(&NewFailure::new("product", "1", "boom", Some(7)), at(1, 1))
        .unwrap();
    db.record(&NewFailure::new("product", "1", "boom again", None), at(2, 1))
        .unwrap();
    db.record(&NewFailure::new("contact", "9", "bad", Some(7)), at(2, 2))
        .unwrap();

    assert_eq!(first, 1);
    assert_eq!(db.unresolved(None).unwrap().len(), 3);
    assert_eq!(db.unresolved(Some("product")).unwrap().len(), 2);

    assert_eq!(db.mark_resolved("product", "1", at(3, 0)).unwrap(), 2);
    assert_eq!(db.mark_resolved("product", "1", at(3, 0)).unwrap(), 0);

    let unresolved = db.unresolved(None).unwrap();
    assert_eq!(unresolved.len(), 1);
    assert_eq!(unresolved[0].entity, "contact");

    let all = db.all(Some("product")).unwrap();
    assert_eq!(all.len(), 2);
    assert!(all.iter().all(|f| f.resolved && f.resolved_at == Some(at(3, 0))));
    assert_eq!(all[0].run_id, Some(7));
    assert_eq!(all[1].run_id, None);
}

#[test]
fn test_run_ledger_lifecycle() {
    let db = StagingDatabase::open_in_memory().unwrap();
    let run_id = db.start("product", "extraction", at(1, 0)).unwrap();

    let started = RunLedger::get(&db, run_id).unwrap().unwrap();
    assert_eq!(started.status, RunStatus::Started);
    assert!(started.finished_at.is_none());

    db.finish(run_id, RunStatus::Error, at(1, 1), Some("listing failed"))
        .unwrap();
    let finished = RunLedger::get(&db, run_id).unwrap().unwrap();
    assert_eq!(finished.status, RunStatus::Error);
    assert_eq!(finished.error_message.as_deref(), Some("listing failed"));

    // Updated exactly once
    assert!(db.finish(run_id, RunStatus::Finished, at(1, 2), None).is_err());
    assert!(db.finish(999, RunStatus::Finished, at(1, 2), None).is_err());

    let second = db.start("contact", "reprocess", at(2, 0)).unwrap();
    let recent = db.recent(10).unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].run_id, second);
}

#[test]
fn test_token_store_single_row() {
    let db = StagingDatabase::open_in_memory().unwrap();
    assert!(db.load().unwrap().is_none());

    db.save(&TokenSet::new("a1", "r1", 1_700_000_000)).unwrap();
    db.save(&TokenSet::new("a2", "r2", 1_700_003_600_000)).unwrap();

    let tokens = db.load().unwrap().unwrap();
    assert_eq!(tokens.access_token, "a2");
    assert_eq!(tokens.expires_at, 1_700_003_600);
}

#[test]
fn test_state_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("staging.duckdb");
    let path = path.to_str().unwrap();
    let key = WatermarkKey::staging("product", "product");

    {
        let db = StagingDatabase::open(path).unwrap();
        WatermarkStore::upsert(&db, &WatermarkRecord::new(key.clone(), at(4, 4), true))
            .unwrap();
        RecordSink::upsert(&db, "product", &[StagingRecord::new("1", json!({"id": 1}))])
            .unwrap();
    }

    let db = StagingDatabase::open(path).unwrap();
    assert_eq!(
        WatermarkStore::get(&db, &key).unwrap().unwrap().last_load_time,
        at(4, 4)
    );
    assert_eq!(db.staged_rows("product").unwrap().len(), 1);
    db.check().unwrap();
}
