//! Crawler types

use crate::catalog::DEFAULT_PAGE_SIZE;
use crate::error::{ItemError, Result};
use crate::types::JsonValue;

/// Crawl configuration for one entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlOptions {
    /// Ids requested per page
    pub page_size: u32,
    /// Consecutive empty pages that end the crawl
    pub empty_page_tolerance: u32,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            empty_page_tolerance: 1,
        }
    }
}

impl CrawlOptions {
    /// Options with the given page size
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size,
            ..Self::default()
        }
    }

    /// Set the empty page tolerance (at least 1)
    #[must_use]
    pub fn with_empty_page_tolerance(mut self, tolerance: u32) -> Self {
        self.empty_page_tolerance = tolerance.max(1);
        self
    }
}

/// Why a crawl ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopReason {
    /// A page carried no ids
    #[default]
    EmptyPage,
    /// The listing answered 404
    NotFound,
}

/// Counters from one crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CrawlSummary {
    /// Non-empty pages processed
    pub pages: usize,
    /// Ids visited
    pub items: usize,
    /// Ids whose detail could not be fetched
    pub failed: usize,
    /// How the crawl ended
    pub stop: StopReason,
}

/// Receives each crawled item in discovery order
pub trait CrawlVisitor {
    /// Handle one item. An `Err` return aborts the crawl.
    fn visit(
        &mut self,
        reference_id: &str,
        outcome: std::result::Result<JsonValue, ItemError>,
    ) -> Result<()>;
}
