//! Scripted in-memory entity source

use super::types::{EntitySource, PageRequest};
use crate::error::{Error, Result};
use crate::types::JsonValue;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone)]
enum Detail {
    Payload(Option<JsonValue>),
    Status(u16),
    Auth,
}

/// Entity source answering from scripted pages and payloads.
///
/// Page `n` returns the `n`-th scripted page; pages past the script are
/// empty. Ids without a scripted detail answer HTTP 404.
#[derive(Debug, Default)]
pub struct MemoryEntitySource {
    pages: Vec<Vec<String>>,
    listing_status: HashMap<u32, u16>,
    details: HashMap<String, Detail>,
    listed: Mutex<Vec<u32>>,
    fetched: Mutex<Vec<String>>,
}

impl MemoryEntitySource {
    /// Empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a page of ids
    #[must_use]
    pub fn with_page<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pages.push(ids.into_iter().map(Into::into).collect());
        self
    }

    /// Answer listing page `page` with an HTTP status error
    #[must_use]
    pub fn with_listing_status(mut self, page: u32, status: u16) -> Self {
        self.listing_status.insert(page, status);
        self
    }

    /// Payload returned for `id`
    #[must_use]
    pub fn with_detail(mut self, id: impl Into<String>, payload: JsonValue) -> Self {
        self.details.insert(id.into(), Detail::Payload(Some(payload)));
        self
    }

    /// Answer `id` with no payload
    #[must_use]
    pub fn with_empty_detail(mut self, id: impl Into<String>) -> Self {
        self.details.insert(id.into(), Detail::Payload(None));
        self
    }

    /// Answer `id` with an HTTP status error
    #[must_use]
    pub fn with_detail_status(mut self, id: impl Into<String>, status: u16) -> Self {
        self.details.insert(id.into(), Detail::Status(status));
        self
    }

    /// Answer `id` with a credential failure
    #[must_use]
    pub fn with_detail_auth_failure(mut self, id: impl Into<String>) -> Self {
        self.details.insert(id.into(), Detail::Auth);
        self
    }

    /// Pages requested so far, in order
    pub fn listed_pages(&self) -> Vec<u32> {
        self.listed.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// Ids fetched so far, in order
    pub fn fetched_ids(&self) -> Vec<String> {
        self.fetched.lock().map(|f| f.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EntitySource for MemoryEntitySource {
    async fn list_ids(&self, request: &PageRequest) -> Result<Vec<String>> {
        self.listed
            .lock()
            .map_err(|_| Error::state("listing log poisoned"))?
            .push(request.page);

        if let Some(status) = self.listing_status.get(&request.page) {
            return Err(Error::http_status(*status, "scripted listing failure"));
        }
        let index = request.page.saturating_sub(1) as usize;
        Ok(self.pages.get(index).cloned().unwrap_or_default())
    }

    async fn fetch_detail(&self, reference_id: &str) -> Result<Option<JsonValue>> {
        self.fetched
            .lock()
            .map_err(|_| Error::state("fetch log poisoned"))?
            .push(reference_id.to_string());

        match self.details.get(reference_id) {
            Some(Detail::Payload(payload)) => Ok(payload.clone()),
            Some(Detail::Status(status)) => {
                Err(Error::http_status(*status, "scripted detail failure"))
            }
            Some(Detail::Auth) => Err(Error::auth("scripted credential failure")),
            None => Err(Error::http_status(404, "")),
        }
    }
}
