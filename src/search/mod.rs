//! Search module for paging through record metadata
//!
//! This module contains:
//! - The `SearchSource` trait the coordinator pages through
//! - `SruClient`, an SRU 2.0 `searchRetrieve` implementation
//! - The SRU XML response parser

mod response;
mod sru;

pub use response::parse_search_response;
pub use sru::SruClient;

use crate::HarvestError;
use async_trait::async_trait;

/// Raw metadata of one search result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Zero-based offset of this record in the search result sequence
    pub position: u64,

    /// Reference string a document identifier is derived from
    pub reference: Option<String>,

    /// Record title, when the source supplies one
    pub title: Option<String>,
}

/// One page of search results
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPage {
    /// Records in source order, starting at the requested offset
    pub records: Vec<Record>,

    /// Total number of records the source reports, if it reports one
    pub total_available: Option<u64>,
}

impl SearchPage {
    /// Returns true when the source has nothing at the requested offset
    pub fn is_exhausted(&self) -> bool {
        self.records.is_empty()
    }
}

/// A paged source of search records
#[async_trait]
pub trait SearchSource: Send + Sync {
    /// Fetches up to `page_size` records starting at `offset`
    ///
    /// Transient failures are retried internally; an `Err` means the run
    /// cannot continue.
    async fn fetch_page(&self, offset: u64, page_size: u32) -> Result<SearchPage, HarvestError>;
}
