//! Tests for the crawler module

use super::*;
use crate::error::Error;
use crate::source::MemoryEntitySource;
use crate::types::JsonValue;
use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use serde_json::json;

#[derive(Default)]
struct Collect {
    ok: Vec<String>,
    failed: Vec<(String, ItemError)>,
    fail_on: Option<String>,
}

impl CrawlVisitor for Collect {
    fn visit(
        &mut self,
        reference_id: &str,
        outcome: std::result::Result<JsonValue, ItemError>,
    ) -> Result<()> {
        if self.fail_on.as_deref() == Some(reference_id) {
            return Err(Error::storage("sink down"));
        }
        match outcome {
            Ok(_) => self.ok.push(reference_id.to_string()),
            Err(e) => self.failed.push((reference_id.to_string(), e)),
        }
        Ok(())
    }
}

fn window() -> ExtractionWindow {
    ExtractionWindow::from_dates(
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
    )
    .unwrap()
}

fn ids(prefix: &str, count: usize) -> Vec<String> {
    (0..count).map(|i| format!("{prefix}{i}")).collect()
}

fn with_details(mut source: MemoryEntitySource, ids: &[String]) -> MemoryEntitySource {
    for id in ids {
        source = source.with_detail(id.clone(), json!({"id": id}));
    }
    source
}

#[tokio::test]
async fn test_stops_after_first_empty_page() {
    let (a, b, c) = (ids("a", 100), ids("b", 100), ids("c", 37));
    let mut source = MemoryEntitySource::new()
        .with_page(a.clone())
        .with_page(b.clone())
        .with_page(c.clone())
        .with_page(Vec::<String>::new());
    for page in [&a, &b, &c] {
        source = with_details(source, page);
    }

    let crawler = PaginatedCrawler::new(&source, CrawlOptions::new(100));
    let mut visitor = Collect::default();
    let summary = crawler
        .crawl(window(), LoadMode::Incremental, &mut visitor)
        .await
        .unwrap();

    assert_eq!(summary.pages, 3);
    assert_eq!(summary.items, 237);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.stop, StopReason::EmptyPage);
    assert_eq!(source.listed_pages(), vec![1, 2, 3, 4]);
    assert_eq!(visitor.ok.len(), 237);
    assert_eq!(visitor.ok[0], "a0");
    assert_eq!(visitor.ok[236], "c36");
}

#[tokio::test]
async fn test_listing_404_is_graceful_stop() {
    let source = MemoryEntitySource::new().with_listing_status(1, 404);
    let crawler = PaginatedCrawler::new(&source, CrawlOptions::default());
    let mut visitor = Collect::default();

    let summary = crawler
        .crawl(window(), LoadMode::Full, &mut visitor)
        .await
        .unwrap();
    assert_eq!(summary.items, 0);
    assert_eq!(summary.stop, StopReason::NotFound);
    assert!(source.fetched_ids().is_empty());
}

#[tokio::test]
async fn test_listing_error_is_fatal() {
    let source = MemoryEntitySource::new()
        .with_page(["1"])
        .with_detail("1", json!({"id": 1}))
        .with_listing_status(2, 500);
    let crawler = PaginatedCrawler::new(&source, CrawlOptions::default());
    let mut visitor = Collect::default();

    let err = crawler
        .crawl(window(), LoadMode::Full, &mut visitor)
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert_eq!(visitor.ok, vec!["1".to_string()]);
}

#[tokio::test]
async fn test_item_failures_do_not_stop_the_page() {
    let page = ids("", 10);
    let source = with_details(MemoryEntitySource::new().with_page(page.clone()), &page)
        .with_detail_status("4", 500)
        .with_empty_detail("7");

    let crawler = PaginatedCrawler::new(&source, CrawlOptions::default());
    let mut visitor = Collect::default();
    let summary = crawler
        .crawl(window(), LoadMode::Incremental, &mut visitor)
        .await
        .unwrap();

    assert_eq!(summary.items, 10);
    assert_eq!(summary.failed, 2);
    assert_eq!(visitor.ok.len(), 8);
    assert_eq!(visitor.failed[0].0, "4");
    assert!(matches!(visitor.failed[0].1, ItemError::Fetch { .. }));
    assert_eq!(visitor.failed[1], ("7".to_string(), ItemError::EmptyPayload));
}

#[tokio::test]
async fn test_missing_detail_is_not_found_item() {
    let source = MemoryEntitySource::new().with_page(["9"]);
    let crawler = PaginatedCrawler::new(&source, CrawlOptions::default());
    let mut visitor = Collect::default();

    crawler
        .crawl(window(), LoadMode::Full, &mut visitor)
        .await
        .unwrap();
    assert_eq!(visitor.failed, vec![("9".to_string(), ItemError::NotFound)]);
}

#[tokio::test]
async fn test_credential_failure_aborts_crawl() {
    let source = MemoryEntitySource::new()
        .with_page(["1", "2", "3"])
        .with_detail("1", json!({"id": 1}))
        .with_detail_auth_failure("2")
        .with_detail("3", json!({"id": 3}));

    let crawler = PaginatedCrawler::new(&source, CrawlOptions::default());
    let mut visitor = Collect::default();
    let err = crawler
        .crawl(window(), LoadMode::Full, &mut visitor)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Auth { .. }));
    assert_eq!(source.fetched_ids(), vec!["1".to_string(), "2".to_string()]);
}

#[tokio::test]
async fn test_visitor_error_aborts_crawl() {
    let page = ids("", 3);
    let source = with_details(MemoryEntitySource::new().with_page(page.clone()), &page);
    let crawler = PaginatedCrawler::new(&source, CrawlOptions::default());
    let mut visitor = Collect {
        fail_on: Some("1".to_string()),
        ..Collect::default()
    };

    let err = crawler
        .crawl(window(), LoadMode::Full, &mut visitor)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Storage { .. }));
    assert_eq!(visitor.ok, vec!["0".to_string()]);
}

#[tokio::test]
async fn test_empty_page_tolerance_skips_spurious_gap() {
    let source = MemoryEntitySource::new()
        .with_page(["1"])
        .with_page(Vec::<String>::new())
        .with_page(["3"])
        .with_detail("1", json!({"id": 1}))
        .with_detail("3", json!({"id": 3}));

    let options = CrawlOptions::new(50).with_empty_page_tolerance(2);
    let crawler = PaginatedCrawler::new(&source, options);
    let mut visitor = Collect::default();
    let summary = crawler
        .crawl(window(), LoadMode::Full, &mut visitor)
        .await
        .unwrap();

    assert_eq!(visitor.ok, vec!["1".to_string(), "3".to_string()]);
    assert_eq!(summary.pages, 2);
    assert_eq!(source.listed_pages(), vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_tolerance_is_at_least_one() {
    assert_eq!(
        CrawlOptions::default().with_empty_page_tolerance(0).empty_page_tolerance,
        1
    );
}
