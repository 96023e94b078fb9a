//! SRU `searchRetrieve` client
//!
//! SRU positions are 1-based while checkpoint offsets are 0-based; the
//! client converts at the request boundary.

use crate::config::SearchConfig;
use crate::crawler::{check_status, classify_error, with_retry, AttemptError, RetryPolicy};
use crate::search::{parse_search_response, SearchPage, SearchSource};
use crate::HarvestError;
use async_trait::async_trait;
use reqwest::Client;
use url::Url;

const SRU_VERSION: &str = "2.0";
const HTTP_ACCEPT: &str = "application/xml";

/// Client for an SRU 2.0 search endpoint
#[derive(Debug, Clone)]
pub struct SruClient {
    client: Client,
    endpoint: Url,
    connection: String,
    query: String,
    policy: RetryPolicy,
}

impl SruClient {
    /// Creates a client for the configured endpoint
    ///
    /// # Example
    ///
    /// ```no_run
    /// use lex_harvest::config::{HttpConfig, SearchConfig};
    /// use lex_harvest::crawler::{build_http_client, RetryPolicy};
    /// use lex_harvest::search::SruClient;
    ///
    /// let http = HttpConfig::default();
    /// let client = build_http_client(&http).unwrap();
    /// let sru = SruClient::new(client, &SearchConfig::default(), RetryPolicy::from_config(&http)).unwrap();
    /// ```
    pub fn new(
        client: Client,
        config: &SearchConfig,
        policy: RetryPolicy,
    ) -> Result<Self, HarvestError> {
        Ok(Self {
            client,
            endpoint: Url::parse(&config.endpoint)?,
            connection: config.connection.clone(),
            query: config.query.clone(),
            policy,
        })
    }

    /// Builds the request URL for a page starting at 0-based `offset`
    pub fn page_url(&self, offset: u64, page_size: u32) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("x-connection", &self.connection)
            .append_pair("operation", "searchRetrieve")
            .append_pair("version", SRU_VERSION)
            .append_pair("query", &self.query)
            .append_pair("startRecord", &(offset + 1).to_string())
            .append_pair("maximumRecords", &page_size.to_string())
            .append_pair("httpAccept", HTTP_ACCEPT);
        url
    }

    async fn attempt_page(&self, url: &Url, offset: u64) -> Result<SearchPage, AttemptError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(classify_error)?;
        let response = check_status(response)?;
        let body = response.text().await.map_err(classify_error)?;

        // A truncated or error-page body is treated like a network hiccup.
        parse_search_response(&body, offset).map_err(AttemptError::Retryable)
    }
}

#[async_trait]
impl SearchSource for SruClient {
    async fn fetch_page(&self, offset: u64, page_size: u32) -> Result<SearchPage, HarvestError> {
        let url = self.page_url(offset, page_size);
        tracing::debug!("Fetching search page: {}", url);

        let page = with_retry(&self.policy, "search page", || {
            self.attempt_page(&url, offset)
        })
        .await
        .map_err(|failure| HarvestError::Search {
            offset,
            reason: failure.to_string(),
        })?;

        tracing::debug!(
            "Search page at {} returned {} records (total: {:?})",
            offset,
            page.records.len(),
            page.total_available
        );
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const EMPTY_PAGE: &str = r#"<sru:searchRetrieveResponse
        xmlns:sru="http://docs.oasis-open.org/ns/search-ws/sruResponse">
      <sru:numberOfRecords>3</sru:numberOfRecords>
    </sru:searchRetrieveResponse>"#;

    const ONE_RECORD: &str = r#"<sru:searchRetrieveResponse
        xmlns:sru="http://docs.oasis-open.org/ns/search-ws/sruResponse"
        xmlns:dcterms="http://purl.org/dc/terms/">
      <sru:numberOfRecords>3</sru:numberOfRecords>
      <sru:records>
        <sru:record><sru:recordData>
          <dcterms:identifier>32019L0790</dcterms:identifier>
        </sru:recordData></sru:record>
      </sru:records>
    </sru:searchRetrieveResponse>"#;

    fn client_for(server: &MockServer, max_retries: u32) -> SruClient {
        let config = SearchConfig {
            endpoint: format!("{}/sru/Search", server.uri()),
            ..SearchConfig::default()
        };
        SruClient::new(
            Client::new(),
            &config,
            RetryPolicy::new(max_retries, Duration::from_millis(1)),
        )
        .unwrap()
    }

    #[test]
    fn test_page_url_is_one_based() {
        let client = SruClient::new(
            Client::new(),
            &SearchConfig::default(),
            RetryPolicy::default(),
        )
        .unwrap();
        let url = client.page_url(0, 100);
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        assert!(pairs.contains(&("startRecord".to_string(), "1".to_string())));
        assert!(pairs.contains(&("maximumRecords".to_string(), "100".to_string())));
        assert!(pairs.contains(&("x-connection".to_string(), "eur".to_string())));
        assert!(pairs.contains(&("query".to_string(), "cql.allRecords=1".to_string())));
    }

    #[tokio::test]
    async fn test_fetch_page_sends_offset() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sru/Search"))
            .and(query_param("startRecord", "3"))
            .and(query_param("maximumRecords", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ONE_RECORD))
            .expect(1)
            .mount(&server)
            .await;

        let page = client_for(&server, 0).fetch_page(2, 2).await.unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].position, 2);
        assert_eq!(page.total_available, Some(3));
    }

    #[tokio::test]
    async fn test_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(EMPTY_PAGE))
            .mount(&server)
            .await;

        let page = client_for(&server, 3).fetch_page(3, 10).await.unwrap();
        assert!(page.is_exhausted());
    }

    #[tokio::test]
    async fn test_retries_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>down for maintenance"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ONE_RECORD))
            .mount(&server)
            .await;

        let page = client_for(&server, 1).fetch_page(0, 1).await.unwrap();
        assert_eq!(page.records.len(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let err = client_for(&server, 2).fetch_page(40, 10).await.unwrap_err();
        assert!(matches!(err, HarvestError::Search { offset: 40, .. }));
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        let err = client_for(&server, 5).fetch_page(0, 10).await.unwrap_err();
        match err {
            HarvestError::Search { reason, .. } => assert_eq!(reason, "HTTP 400"),
            other => panic!("unexpected error: {}", other),
        }
    }
}
