//! Documents module: identifier resolution and full-text retrieval
//!
//! This module contains:
//! - CELEX identifier extraction from search records
//! - The `DocumentSource` trait and its EUR-Lex implementation
//! - HTML to plain-text extraction

mod eurlex;
mod extract;
mod identifier;

pub use eurlex::EurLexFetcher;
pub use extract::extract_text;
pub use identifier::{resolve, CelexId};

use async_trait::async_trait;
use thiserror::Error;

/// Why the text of one document could not be retrieved
///
/// These are per-record failures: the record is skipped and the run goes on.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(String),

    #[error("document source answered HTTP {status}")]
    Status { status: u16 },

    #[error("gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("no extractable text in document")]
    NoText,
}

impl FetchError {
    /// Whether the failure points at the source being unreachable or
    /// overloaded rather than at this one document
    ///
    /// A 404 or an empty page is a definitive answer about the document;
    /// only outage failures count toward aborting a run.
    pub fn is_outage(&self) -> bool {
        match self {
            FetchError::Http(_) | FetchError::RetriesExhausted { .. } => true,
            FetchError::Status { status } => *status == 429 || *status >= 500,
            FetchError::NoText => false,
        }
    }
}

/// A source of document full texts
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Retrieves the plain text of a document; the text is never empty
    async fn fetch_text(&self, id: &CelexId) -> Result<String, FetchError>;
}
