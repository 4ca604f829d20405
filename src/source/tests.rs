//! Tests for the entity source module

use super::*;
use crate::http::{HttpClient, HttpClientConfig};
use crate::types::LoadMode;
use crate::window::ExtractionWindow;
use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> Arc<HttpClient> {
    let base = Url::parse(&format!("{}/Api/v3/", server.uri())).unwrap();
    let config = HttpClientConfig::new(base).min_request_interval(Duration::ZERO);
    Arc::new(HttpClient::with_config(config).unwrap())
}

fn window() -> ExtractionWindow {
    let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    let end = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
    ExtractionWindow::from_dates(start, end).unwrap()
}

fn page(page: u32, mode: LoadMode) -> PageRequest {
    PageRequest {
        window: window(),
        mode,
        page,
        page_size: 100,
    }
}

const PRODUCTS: EndpointSpec = EndpointSpec {
    collection: "produtos",
    shape: ListingShape::IdsThenDetail,
    detail: DetailRequest::Path("produtos/{id}"),
    filter: WindowFilter::Modified,
};

#[test]
fn test_window_filter_params() {
    let w = window();
    assert!(WindowFilter::None.params(&w, LoadMode::Incremental).is_empty());
    assert_eq!(
        WindowFilter::Modified.params(&w, LoadMode::Full),
        vec![
            ("dataAlteracaoInicial".to_string(), "2024-03-01".to_string()),
            ("dataAlteracaoFinal".to_string(), "2024-03-04".to_string()),
        ]
    );
    assert_eq!(
        WindowFilter::CreatedOrModified.params(&w, LoadMode::Full)[0].0,
        "dataInicial"
    );
    assert_eq!(
        WindowFilter::CreatedOrModified.params(&w, LoadMode::Incremental)[0].0,
        "dataAlteracaoInicial"
    );
}

#[test]
fn test_detail_request_resolve() {
    assert_eq!(
        DetailRequest::Path("produtos/estruturas/{id}").resolve("42"),
        ("produtos/estruturas/42".to_string(), Vec::new())
    );
    assert_eq!(
        DetailRequest::Query {
            path: "estoques/saldos",
            param: "idsProdutos[]",
        }
        .resolve("7"),
        (
            "estoques/saldos".to_string(),
            vec![("idsProdutos[]".to_string(), "7".to_string())]
        )
    );
}

#[tokio::test]
async fn test_list_ids_sends_pagination_and_window() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Api/v3/produtos"))
        .and(query_param("pagina", "2"))
        .and(query_param("limite", "100"))
        .and(query_param("dataAlteracaoInicial", "2024-03-01"))
        .and(query_param("dataAlteracaoFinal", "2024-03-04"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{"id": 11}, {"id": "ABC"}, {"nome": "no id"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let source = ApiEntitySource::new(client_for(&server), PRODUCTS);
    let ids = source.list_ids(&page(2, LoadMode::Incremental)).await.unwrap();
    assert_eq!(ids, vec!["11".to_string(), "ABC".to_string()]);
}

#[tokio::test]
async fn test_list_ids_404_propagates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let source = ApiEntitySource::new(client_for(&server), PRODUCTS);
    let err = source.list_ids(&page(1, LoadMode::Full)).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_fetch_detail_unwraps_data() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Api/v3/produtos/11"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {"id": 11, "nome": "Caneca"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Api/v3/produtos/12"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": null})))
        .mount(&server)
        .await;

    let source = ApiEntitySource::new(client_for(&server), PRODUCTS);
    let detail = source.fetch_detail("11").await.unwrap().unwrap();
    assert_eq!(detail["nome"], "Caneca");
    assert!(source.fetch_detail("12").await.unwrap().is_none());
}

#[tokio::test]
async fn test_inline_listing_serves_details_from_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Api/v3/depositos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{"id": 1, "descricao": "Principal"}, {"id": 2, "descricao": "Loja"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let spec = EndpointSpec {
        collection: "depositos",
        shape: ListingShape::Inline,
        detail: DetailRequest::Path("depositos/{id}"),
        filter: WindowFilter::None,
    };
    let source = ApiEntitySource::new(client_for(&server), spec);

    let ids = source.list_ids(&page(1, LoadMode::Full)).await.unwrap();
    assert_eq!(ids, vec!["1".to_string(), "2".to_string()]);
    let second = source.fetch_detail("2").await.unwrap().unwrap();
    assert_eq!(second["descricao"], "Loja");
}

#[tokio::test]
async fn test_singleton_has_one_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Api/v3/empresas/me/dados-basicos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {"nome": "ACME", "cnpj": "00.000.000/0001-00"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let spec = EndpointSpec {
        collection: "empresas/me/dados-basicos",
        shape: ListingShape::Singleton,
        detail: DetailRequest::Path("empresas/me/dados-basicos"),
        filter: WindowFilter::None,
    };
    let source = ApiEntitySource::new(client_for(&server), spec);

    assert_eq!(
        source.list_ids(&page(1, LoadMode::Full)).await.unwrap(),
        vec![SINGLETON_ID.to_string()]
    );
    assert!(source.list_ids(&page(2, LoadMode::Full)).await.unwrap().is_empty());
    let company = source.fetch_detail(SINGLETON_ID).await.unwrap().unwrap();
    assert_eq!(company["nome"], "ACME");
}
