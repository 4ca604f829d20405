//! REST implementation of `EntitySource`

use super::types::{EndpointSpec, EntitySource, ListingShape, PageRequest, SINGLETON_ID};
use crate::error::{Error, Result};
use crate::http::HttpClient;
use crate::types::JsonValue;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Page parameter name
const PAGE_PARAM: &str = "pagina";

/// Page size parameter name
const LIMIT_PARAM: &str = "limite";

/// Entity source backed by the upstream REST API
pub struct ApiEntitySource {
    client: Arc<HttpClient>,
    endpoint: EndpointSpec,
    /// Items of the last inline page, consumed by `fetch_detail`
    inline_items: Mutex<HashMap<String, JsonValue>>,
}

impl ApiEntitySource {
    /// Create a source for `endpoint`
    pub fn new(client: Arc<HttpClient>, endpoint: EndpointSpec) -> Self {
        Self {
            client,
            endpoint,
            inline_items: Mutex::new(HashMap::new()),
        }
    }

    /// Endpoint this source reads
    pub fn endpoint(&self) -> &EndpointSpec {
        &self.endpoint
    }

    fn take_inline(&self, reference_id: &str) -> Result<Option<JsonValue>> {
        let mut items = self
            .inline_items
            .lock()
            .map_err(|_| Error::state("inline item cache poisoned"))?;
        Ok(items.remove(reference_id))
    }

    fn replace_inline(&self, page: HashMap<String, JsonValue>) -> Result<()> {
        let mut items = self
            .inline_items
            .lock()
            .map_err(|_| Error::state("inline item cache poisoned"))?;
        *items = page;
        Ok(())
    }
}

/// Items of a listing response: the `data` array, or a bare array
fn listing_items(body: JsonValue) -> Vec<JsonValue> {
    match body {
        JsonValue::Array(items) => items,
        JsonValue::Object(mut map) => match map.remove("data") {
            Some(JsonValue::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Payload of a detail response, unwrapped from its `data` envelope
fn unwrap_envelope(body: JsonValue) -> Option<JsonValue> {
    let payload = match body {
        JsonValue::Object(mut map) if map.contains_key("data") => map.remove("data")?,
        other => other,
    };
    match &payload {
        JsonValue::Null => None,
        JsonValue::Object(map) if map.is_empty() => None,
        _ => Some(payload),
    }
}

/// String form of an item's `id`, skipping items without one
fn item_id(item: &JsonValue) -> Option<String> {
    match item.get("id")? {
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::String(s) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    }
}

#[async_trait]
impl EntitySource for ApiEntitySource {
    async fn list_ids(&self, request: &PageRequest) -> Result<Vec<String>> {
        if self.endpoint.shape == ListingShape::Singleton {
            return Ok(if request.page == 1 {
                vec![SINGLETON_ID.to_string()]
            } else {
                Vec::new()
            });
        }

        let mut query = self.endpoint.filter.params(&request.window, request.mode);
        query.push((PAGE_PARAM.to_string(), request.page.to_string()));
        query.push((LIMIT_PARAM.to_string(), request.page_size.to_string()));

        let body = self.client.get_json(self.endpoint.collection, &query).await?;
        let items = listing_items(body);

        let mut ids = Vec::with_capacity(items.len());
        let mut inline = HashMap::new();
        for item in items {
            let Some(id) = item_id(&item) else {
                continue;
            };
            if self.endpoint.shape == ListingShape::Inline {
                inline.insert(id.clone(), item);
            }
            ids.push(id);
        }

        if self.endpoint.shape == ListingShape::Inline {
            self.replace_inline(inline)?;
        }

        debug!(
            collection = self.endpoint.collection,
            page = request.page,
            ids = ids.len(),
            "Listing page fetched"
        );
        Ok(ids)
    }

    async fn fetch_detail(&self, reference_id: &str) -> Result<Option<JsonValue>> {
        match self.endpoint.shape {
            ListingShape::Singleton => {
                let body = self.client.get_json(self.endpoint.collection, &[]).await?;
                Ok(unwrap_envelope(body))
            }
            ListingShape::Inline => {
                if let Some(item) = self.take_inline(reference_id)? {
                    return Ok(Some(item));
                }
                let (path, query) = self.endpoint.detail.resolve(reference_id);
                Ok(unwrap_envelope(self.client.get_json(&path, &query).await?))
            }
            ListingShape::IdsThenDetail => {
                let (path, query) = self.endpoint.detail.resolve(reference_id);
                Ok(unwrap_envelope(self.client.get_json(&path, &query).await?))
            }
        }
    }
}

impl std::fmt::Debug for ApiEntitySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiEntitySource")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}
