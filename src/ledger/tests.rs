//! Tests for the ledgers

use super::*;
use crate::types::RunStatus;
use chrono::{NaiveDate, NaiveDateTime};
use pretty_assertions::assert_eq;

fn at(h: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 5)
        .unwrap()
        .and_hms_opt(h, 0, 0)
        .unwrap()
}

// ============================================================================
// Failure Ledger
// ============================================================================

#[test]
fn test_record_and_list_failures() {
    let ledger = MemoryFailureLedger::new();
    let first = ledger
        .record(&NewFailure::new("product", "10", "not found upstream", Some(1)), at(8))
        .unwrap();
    let second = ledger
        .record(&NewFailure::new("contact", "abc", "malformed payload", Some(2)), at(9))
        .unwrap();

    assert_ne!(first, second);
    assert_eq!(ledger.unresolved(None).unwrap().len(), 2);

    let products = ledger.unresolved(Some("product")).unwrap();
    assert_eq!(products.len(), 1);
    assert_eq!(products[0].reference_id, "10");
    assert_eq!(products[0].run_id, Some(1));
    assert!(!products[0].resolved);
}

#[test]
fn test_mark_resolved_collapses_history_for_same_id() {
    let ledger = MemoryFailureLedger::new();
    ledger
        .record(&NewFailure::new("product", "10", "timeout", Some(1)), at(8))
        .unwrap();
    ledger
        .record(&NewFailure::new("product", "10", "timeout", Some(2)), at(9))
        .unwrap();
    ledger
        .record(&NewFailure::new("product", "11", "timeout", Some(2)), at(9))
        .unwrap();
    // Same id under another entity stays untouched
    ledger
        .record(&NewFailure::new("seller", "10", "timeout", Some(3)), at(9))
        .unwrap();

    let flipped = ledger.mark_resolved("product", "10", at(12)).unwrap();
    assert_eq!(flipped, 2);

    let unresolved: Vec<_> = ledger
        .unresolved(None)
        .unwrap()
        .into_iter()
        .map(|r| (r.entity, r.reference_id))
        .collect();
    assert_eq!(
        unresolved,
        vec![
            ("product".to_string(), "11".to_string()),
            ("seller".to_string(), "10".to_string())
        ]
    );

    // Rows are kept for audit
    let all = ledger.all(Some("product")).unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].resolved_at, Some(at(12)));

    assert_eq!(ledger.mark_resolved("product", "10", at(13)).unwrap(), 0);
}

// ============================================================================
// Run Ledger
// ============================================================================

#[test]
fn test_run_lifecycle() {
    let ledger = MemoryRunLedger::new();
    let run_id = ledger.start("products", "extraction", at(6)).unwrap();

    let open = ledger.get(run_id).unwrap().unwrap();
    assert_eq!(open.status, RunStatus::Started);
    assert!(open.finished_at.is_none());

    ledger
        .finish(run_id, RunStatus::Finished, at(7), None)
        .unwrap();
    let done = ledger.get(run_id).unwrap().unwrap();
    assert_eq!(done.status, RunStatus::Finished);
    assert_eq!(done.finished_at, Some(at(7)));
}

#[test]
fn test_run_updated_exactly_once() {
    let ledger = MemoryRunLedger::new();
    let run_id = ledger.start("products", "extraction", at(6)).unwrap();
    ledger
        .finish(run_id, RunStatus::Error, at(7), Some("HTTP 500: boom"))
        .unwrap();

    assert!(ledger
        .finish(run_id, RunStatus::Finished, at(8), None)
        .is_err());
    let run = ledger.get(run_id).unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Error);
    assert_eq!(run.error_message.as_deref(), Some("HTTP 500: boom"));
}

#[test]
fn test_recent_runs_newest_first() {
    let ledger = MemoryRunLedger::new();
    for h in 1..=4 {
        ledger.start("products", "extraction", at(h)).unwrap();
    }
    let recent = ledger.recent(2).unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].run_id, 4);
    assert_eq!(recent[1].run_id, 3);
    assert!(ledger.finish(99, RunStatus::Finished, at(5), None).is_err());
}
