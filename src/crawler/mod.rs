//! Paginated crawler
//!
//! Walks the id pages of one entity for a window and fetches every item's
//! detail, strictly in order.
//!
//! # Overview
//!
//! - Pages start at 1 and advance by one after every call.
//! - A page with no ids ends the crawl (after `empty_page_tolerance`
//!   consecutive empty pages). A 404 on the listing also ends it.
//! - Detail failures are handed to the [`CrawlVisitor`] as an [`ItemError`]
//!   and the crawl moves on. Only run-fatal errors escape.

mod types;

pub use types::{CrawlOptions, CrawlSummary, CrawlVisitor, StopReason};

use crate::error::{ItemError, Result};
use crate::source::{EntitySource, PageRequest};
use crate::types::LoadMode;
use crate::window::ExtractionWindow;
use tracing::{debug, info, warn};

/// Crawler over one entity source
pub struct PaginatedCrawler<'a> {
    source: &'a dyn EntitySource,
    options: CrawlOptions,
}

impl<'a> PaginatedCrawler<'a> {
    /// Create a crawler for `source`
    pub fn new(source: &'a dyn EntitySource, options: CrawlOptions) -> Self {
        Self { source, options }
    }

    /// Crawl options
    pub fn options(&self) -> &CrawlOptions {
        &self.options
    }

    /// Walk every page of `window`, handing each item to `visitor`.
    ///
    /// Listing errors other than 404 and any error the visitor returns abort
    /// the crawl.
    pub async fn crawl(
        &self,
        window: ExtractionWindow,
        mode: LoadMode,
        visitor: &mut dyn CrawlVisitor,
    ) -> Result<CrawlSummary> {
        let mut summary = CrawlSummary::default();
        let mut page = 1u32;
        let mut empty_streak = 0u32;

        loop {
            let request = PageRequest {
                window,
                mode,
                page,
                page_size: self.options.page_size,
            };

            let ids = match self.source.list_ids(&request).await {
                Ok(ids) => ids,
                Err(e) if e.is_not_found() => {
                    info!(page, "Listing answered 404, no more data");
                    summary.stop = StopReason::NotFound;
                    break;
                }
                Err(e) => return Err(e),
            };

            if ids.is_empty() {
                empty_streak += 1;
                if empty_streak >= self.options.empty_page_tolerance {
                    debug!(page, "Empty page, crawl exhausted");
                    summary.stop = StopReason::EmptyPage;
                    break;
                }
                warn!(
                    page,
                    empty_streak,
                    tolerance = self.options.empty_page_tolerance,
                    "Empty page before tolerance reached, trying next page"
                );
                page += 1;
                continue;
            }

            empty_streak = 0;
            summary.pages += 1;
            info!(page, ids = ids.len(), "Page collected");

            for reference_id in &ids {
                let outcome = self.fetch_item(reference_id).await?;
                if let Err(ref item_error) = outcome {
                    summary.failed += 1;
                    warn!(reference_id = %reference_id, error = %item_error, "Item fetch failed");
                }
                summary.items += 1;
                visitor.visit(reference_id, outcome)?;
            }

            page += 1;
        }

        Ok(summary)
    }

    /// Fetch one detail, downgrading every non-fatal error to an item error
    async fn fetch_item(
        &self,
        reference_id: &str,
    ) -> Result<std::result::Result<crate::types::JsonValue, ItemError>> {
        match self.source.fetch_detail(reference_id).await {
            Ok(Some(payload)) => Ok(Ok(payload)),
            Ok(None) => Ok(Err(ItemError::EmptyPayload)),
            Err(e) if e.is_run_fatal() => Err(e),
            Err(e) => Ok(Err(ItemError::from(&e))),
        }
    }
}

#[cfg(test)]
mod tests;
