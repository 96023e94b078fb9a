//! EUR-Lex full-text fetcher
//!
//! Documents are addressed as
//! `{base}/legal-content/{LANG}/TXT/HTML/?uri=CELEX:{id}`.

use crate::config::DocumentsConfig;
use crate::crawler::{check_status, classify_error, with_retry, AttemptError, RequestFailure, RetryPolicy};
use crate::documents::{extract_text, CelexId, DocumentSource, FetchError};
use crate::HarvestError;
use async_trait::async_trait;
use reqwest::Client;
use url::Url;

/// Fetches document text from EUR-Lex by CELEX number
#[derive(Debug, Clone)]
pub struct EurLexFetcher {
    client: Client,
    base_url: Url,
    language: String,
    policy: RetryPolicy,
}

impl EurLexFetcher {
    pub fn new(
        client: Client,
        config: &DocumentsConfig,
        policy: RetryPolicy,
    ) -> Result<Self, HarvestError> {
        Ok(Self {
            client,
            base_url: Url::parse(&config.base_url)?,
            language: config.language.to_ascii_uppercase(),
            policy,
        })
    }

    /// Returns the HTML rendition URL of a document
    pub fn document_url(&self, id: &CelexId) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(&format!("/legal-content/{}/TXT/HTML/", self.language));
        url.set_query(None);
        url.query_pairs_mut()
            .append_pair("uri", &format!("CELEX:{}", id));
        url
    }

    async fn attempt_body(&self, url: &Url) -> Result<Vec<u8>, AttemptError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(classify_error)?;
        let response = check_status(response)?;
        let bytes = response.bytes().await.map_err(classify_error)?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl DocumentSource for EurLexFetcher {
    async fn fetch_text(&self, id: &CelexId) -> Result<String, FetchError> {
        let url = self.document_url(id);
        tracing::debug!("Fetching document {} from {}", id, url);

        let body = with_retry(&self.policy, "document fetch", || self.attempt_body(&url))
            .await
            .map_err(|failure| match failure {
                RequestFailure::Status(status) => FetchError::Status { status },
                RequestFailure::Exhausted {
                    attempts,
                    last_error,
                } => FetchError::RetriesExhausted {
                    attempts,
                    last_error,
                },
                RequestFailure::Fatal(message) => FetchError::Http(message),
            })?;

        extract_text(&body).ok_or(FetchError::NoText)
    }
}
