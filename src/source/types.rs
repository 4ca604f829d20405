//! Source types and the `EntitySource` trait

use crate::error::Result;
use crate::types::{JsonValue, LoadMode};
use crate::window::ExtractionWindow;
use async_trait::async_trait;

/// Reference id used for single-resource entities
pub const SINGLETON_ID: &str = "me";

/// One listing call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Window being extracted
    pub window: ExtractionWindow,
    /// Effective mode of the run
    pub mode: LoadMode,
    /// 1-based page index
    pub page: u32,
    /// Ids per page
    pub page_size: u32,
}

/// Upstream access for one entity
#[async_trait]
pub trait EntitySource: Send + Sync {
    /// Ids on one page, in upstream order.
    ///
    /// An empty list means the listing is exhausted. An HTTP 404 error is
    /// treated the same way by the crawler.
    async fn list_ids(&self, request: &PageRequest) -> Result<Vec<String>>;

    /// Full payload for one id, `None` when the upstream returns nothing
    async fn fetch_detail(&self, reference_id: &str) -> Result<Option<JsonValue>>;
}

/// How the listing endpoint exposes items
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingShape {
    /// Listing carries ids; each id needs a detail call
    IdsThenDetail,
    /// Listing already carries full items
    Inline,
    /// A single resource with no listing
    Singleton,
}

/// Window parameters sent on listing calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowFilter {
    /// No window parameters
    None,
    /// `dataAlteracaoInicial` / `dataAlteracaoFinal`
    Modified,
    /// `dataInicial` / `dataFinal` in full mode, modification dates otherwise
    CreatedOrModified,
}

impl WindowFilter {
    /// Query parameters for `window` in `mode`
    pub fn params(self, window: &ExtractionWindow, mode: LoadMode) -> Vec<(String, String)> {
        let (start_key, end_key) = match (self, mode) {
            (WindowFilter::None, _) => return Vec::new(),
            (WindowFilter::CreatedOrModified, LoadMode::Full) => ("dataInicial", "dataFinal"),
            _ => ("dataAlteracaoInicial", "dataAlteracaoFinal"),
        };
        vec![
            (start_key.to_string(), window.start_date()),
            (end_key.to_string(), window.end_date()),
        ]
    }
}

/// How a single item's payload is fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailRequest {
    /// Path template with an `{id}` placeholder
    Path(&'static str),
    /// Fixed path with the id passed as a query parameter
    Query {
        /// Endpoint path
        path: &'static str,
        /// Parameter carrying the id
        param: &'static str,
    },
}

impl DetailRequest {
    /// Path and query for `reference_id`
    pub fn resolve(self, reference_id: &str) -> (String, Vec<(String, String)>) {
        match self {
            DetailRequest::Path(template) => (template.replace("{id}", reference_id), Vec::new()),
            DetailRequest::Query { path, param } => (
                path.to_string(),
                vec![(param.to_string(), reference_id.to_string())],
            ),
        }
    }
}

/// Upstream endpoints of one entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointSpec {
    /// Listing path (or the resource itself for singletons)
    pub collection: &'static str,
    /// Listing shape
    pub shape: ListingShape,
    /// Detail call
    pub detail: DetailRequest,
    /// Window parameters on listing calls
    pub filter: WindowFilter,
}
