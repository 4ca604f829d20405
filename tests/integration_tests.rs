//! Integration tests using a mock HTTP server
//!
//! Tests the full flow: listing pages → detail calls → mapping → DuckDB
//! staging, then a replay of the recorded failures.

use chrono::{NaiveDate, NaiveDateTime};
use pretty_assertions::assert_eq;
use serde_json::json;
use stagesync::auth::StaticToken;
use stagesync::catalog;
use stagesync::config::{LoadOptions, Settings};
use stagesync::database::StagingDatabase;
use stagesync::engine::{EntityDescriptor, RunController};
use stagesync::http::{HttpClient, HttpClientConfig};
use stagesync::ledger::{FailureLedger, RunLedger};
use stagesync::reprocess::Reprocessor;
use stagesync::source::ApiEntitySource;
use stagesync::state::{WatermarkKey, WatermarkStore};
use stagesync::types::{LoadMode, ManualClock, RunStatus};
use stagesync::window::ExtractionWindow;
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn at(d: u32, h: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, d)
        .unwrap()
        .and_hms_opt(h, 0, 0)
        .unwrap()
}

fn client_for(server: &MockServer) -> Arc<HttpClient> {
    let base = Url::parse(&format!("{}/Api/v3/", server.uri())).unwrap();
    let config = HttpClientConfig::new(base)
        .min_request_interval(Duration::ZERO)
        .rate_limit_backoff(Duration::from_millis(10));
    let client = HttpClient::with_config(config)
        .unwrap()
        .with_credentials(Arc::new(StaticToken("test-token".to_string())));
    Arc::new(client)
}

fn options() -> LoadOptions {
    let bounds = ExtractionWindow::new(at(1, 0), at(5, 0)).unwrap();
    LoadOptions::new(LoadMode::Incremental, bounds)
        .with_margin_days(2)
        .with_initial_epoch(at(1, 0))
}

fn product(server: &MockServer) -> EntityDescriptor {
    let spec = catalog::find("product").unwrap();
    let source = Arc::new(ApiEntitySource::new(client_for(server), spec.endpoint));
    EntityDescriptor::from_spec(spec, source)
}

async fn mount_listing(server: &MockServer, ids: &[i64]) {
    let items: Vec<_> = ids.iter().map(|id| json!({ "id": id })).collect();
    Mock::given(method("GET"))
        .and(path("/Api/v3/produtos"))
        .and(query_param("pagina", "1"))
        .and(query_param("limite", "100"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": items })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Api/v3/produtos"))
        .and(query_param("pagina", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .mount(server)
        .await;
}

async fn mount_product(server: &MockServer, id: i64, name: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/Api/v3/produtos/{id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "id": id, "nome": name, "codigo": format!("P-{id}"), "preco": 9.9 }
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_run_stages_records_and_isolates_failures() {
    let server = MockServer::start().await;
    mount_listing(&server, &[1, 2, 3]).await;
    mount_product(&server, 1, "Caneca").await;
    mount_product(&server, 3, "Prato").await;
    Mock::given(method("GET"))
        .and(path("/Api/v3/produtos/2"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::new(at(6, 10)));
    let db = Arc::new(StagingDatabase::open_in_memory().unwrap().with_clock(clock.clone()));
    let controller = RunController::new(options(), db.clone(), db.clone(), db.clone(), db.clone())
        .with_clock(clock.clone());

    let report = controller.run(&product(&server)).await.unwrap();

    assert_eq!(report.items, 3);
    assert_eq!(report.records_written, 2);
    assert_eq!(report.failures, 1);
    assert!(report.has_item_failures());

    let rows = db.staged_rows("product").unwrap();
    let keys: Vec<_> = rows.iter().map(|r| r.natural_key.as_str()).collect();
    assert_eq!(keys, vec!["1", "3"]);
    assert_eq!(rows[0].record["name"], "Caneca");

    let failures = db.unresolved(Some("product")).unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].reference_id, "2");
    assert_eq!(failures[0].run_id, Some(report.run_id));

    let run = RunLedger::get(&*db, report.run_id).unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Finished);

    let watermark = WatermarkStore::get(&*db, &WatermarkKey::staging("product", "product"))
        .unwrap()
        .unwrap();
    assert_eq!(watermark.last_load_time, at(6, 10));
}

#[tokio::test]
async fn test_reprocess_resolves_recovered_items() {
    let server = MockServer::start().await;
    mount_listing(&server, &[1, 2]).await;
    mount_product(&server, 1, "Caneca").await;
    Mock::given(method("GET"))
        .and(path("/Api/v3/produtos/2"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_product(&server, 2, "Copo").await;

    let clock = Arc::new(ManualClock::new(at(6, 10)));
    let db = Arc::new(StagingDatabase::open_in_memory().unwrap().with_clock(clock.clone()));
    let controller = RunController::new(options(), db.clone(), db.clone(), db.clone(), db.clone())
        .with_clock(clock.clone());
    let entity = product(&server);

    controller.run(&entity).await.unwrap();
    assert_eq!(db.unresolved(None).unwrap().len(), 1);

    clock.set(at(6, 11));
    let reprocessor = Reprocessor::new(db.clone(), db.clone(), db.clone()).with_clock(clock.clone());
    let report = reprocessor.reprocess_unresolved(&entity).await.unwrap();

    assert_eq!(report.loaded, vec!["2".to_string()]);
    assert_eq!(report.resolved_failures, 1);
    assert!(db.unresolved(None).unwrap().is_empty());
    assert_eq!(db.staged_rows("product").unwrap().len(), 2);

    let resolved = db.all(Some("product")).unwrap();
    assert_eq!(resolved[0].resolved_at, Some(at(6, 11)));
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let server = MockServer::start().await;
    mount_listing(&server, &[1, 2]).await;
    mount_product(&server, 1, "Caneca").await;
    mount_product(&server, 2, "Copo").await;

    let clock = Arc::new(ManualClock::new(at(6, 10)));
    let db = Arc::new(StagingDatabase::open_in_memory().unwrap().with_clock(clock.clone()));
    let controller = RunController::new(options(), db.clone(), db.clone(), db.clone(), db.clone())
        .with_clock(clock.clone());
    let entity = product(&server);

    controller.run(&entity).await.unwrap();
    clock.set(at(7, 10));
    let second = controller.run(&entity).await.unwrap();

    // Second window starts from the first watermark minus the margin
    assert_eq!(second.window.start, at(4, 0));

    let rows = db.staged_rows("product").unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.loaded_at == at(6, 10)));
    assert!(rows.iter().all(|r| r.updated_at == at(7, 10)));
    assert_eq!(db.recent(10).unwrap().len(), 2);
}

#[tokio::test]
async fn test_listing_failure_keeps_previous_watermark() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Api/v3/produtos"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::new(at(6, 10)));
    let db = Arc::new(StagingDatabase::open_in_memory().unwrap().with_clock(clock.clone()));
    let controller = RunController::new(options(), db.clone(), db.clone(), db.clone(), db.clone())
        .with_clock(clock.clone());

    assert!(controller.run(&product(&server)).await.is_err());

    let key = WatermarkKey::staging("product", "product");
    assert!(WatermarkStore::get(&*db, &key).unwrap().is_none());
    let runs = db.recent(1).unwrap();
    assert_eq!(runs[0].status, RunStatus::Error);
    assert!(runs[0].error_message.is_some());
}

#[test]
fn test_settings_file_and_persistent_database() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("staging.duckdb");
    let config_path = dir.path().join("stagesync.yaml");
    std::fs::write(
        &config_path,
        format!(
            "api:\n  base_url: https://api.example.com/Api/v3\ndatabase:\n  path: {}\nentities:\n  enabled: [product, contact]\n",
            db_path.display()
        ),
    )
    .unwrap();

    let settings = Settings::from_file(&config_path).unwrap();
    settings.validate().unwrap();
    assert_eq!(catalog::select(&settings.entities.enabled).unwrap().len(), 2);

    {
        let db = StagingDatabase::open(&settings.database.path).unwrap();
        db.check().unwrap();
        db.record(
            &stagesync::ledger::NewFailure::new("contact", "77", "timeout", None),
            at(2, 2),
        )
        .unwrap();
    }

    let db = StagingDatabase::open(&settings.database.path).unwrap();
    assert_eq!(db.unresolved(Some("contact")).unwrap()[0].reference_id, "77");
}
