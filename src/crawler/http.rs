//! HTTP plumbing shared by the search, document and publish clients
//!
//! This module handles:
//! - Building the HTTP client with timeouts and user agent
//! - Classifying responses and transport errors as retryable or final
//! - The bounded exponential-backoff retry loop
//!
//! # Retry Logic
//!
//! | Condition | Action |
//! |-----------|--------|
//! | HTTP 2xx | Done |
//! | HTTP 429 | Retry with backoff |
//! | HTTP 5xx | Retry with backoff |
//! | Other HTTP status | Immediate failure |
//! | Timeout / connect / body error | Retry with backoff |
//! | Malformed payload (caller decides) | Retry with backoff |

use crate::config::HttpConfig;
use reqwest::{Client, Response, StatusCode};
use std::future::Future;
use std::time::Duration;

/// Builds an HTTP client with proper configuration
///
/// # Example
///
/// ```no_run
/// use lex_harvest::config::HttpConfig;
/// use lex_harvest::crawler::build_http_client;
///
/// let client = build_http_client(&HttpConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &HttpConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Bounded retry schedule with exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff_base: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_base: Duration) -> Self {
        Self {
            max_retries,
            backoff_base,
        }
    }

    pub fn from_config(config: &HttpConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.backoff_base_ms),
        )
    }

    /// Total attempts including the first one
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Delay before retry number `retry` (1-based), doubling up to 32x the base
    pub fn backoff(&self, retry: u32) -> Duration {
        let capped = retry.saturating_sub(1).min(5);
        self.backoff_base * (1u32 << capped)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&HttpConfig::default())
    }
}

/// Why a single attempt did not succeed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptError {
    /// Worth another attempt (timeouts, 429, 5xx, malformed payloads)
    Retryable(String),
    /// Final on the first occurrence
    Status(u16),
    /// Non-retryable transport failure
    Fatal(String),
}

/// Terminal outcome of a request that never produced a usable result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestFailure {
    /// The server answered with a status that retrying won't change
    Status(u16),
    /// Every attempt failed with a retryable error
    Exhausted { attempts: u32, last_error: String },
    /// Transport failure that retrying won't change
    Fatal(String),
}

impl std::fmt::Display for RequestFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Status(status) => write!(f, "HTTP {}", status),
            Self::Exhausted {
                attempts,
                last_error,
            } => write!(f, "gave up after {} attempts: {}", attempts, last_error),
            Self::Fatal(message) => write!(f, "{}", message),
        }
    }
}

/// Returns true for statuses a later attempt may fix
pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Returns true for transport errors a later attempt may fix
pub fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_body() || err.is_request() || err.is_decode()
}

/// Maps a transport error onto an attempt outcome
pub fn classify_error(err: reqwest::Error) -> AttemptError {
    if is_retryable_error(&err) {
        if err.is_timeout() {
            AttemptError::Retryable("request timeout".to_string())
        } else {
            AttemptError::Retryable(err.to_string())
        }
    } else {
        AttemptError::Fatal(err.to_string())
    }
}

/// Passes successful responses through and classifies the rest
pub fn check_status(response: Response) -> Result<Response, AttemptError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else if is_retryable_status(status) {
        Err(AttemptError::Retryable(format!("HTTP {}", status.as_u16())))
    } else {
        Err(AttemptError::Status(status.as_u16()))
    }
}

/// Runs `attempt` until it succeeds, fails finally, or the policy is exhausted
///
/// `what` only labels log lines.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut attempt: F,
) -> Result<T, RequestFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let mut tries = 0;
    loop {
        tries += 1;
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(AttemptError::Status(status)) => return Err(RequestFailure::Status(status)),
            Err(AttemptError::Fatal(message)) => return Err(RequestFailure::Fatal(message)),
            Err(AttemptError::Retryable(message)) => {
                if tries >= policy.max_attempts() {
                    return Err(RequestFailure::Exhausted {
                        attempts: tries,
                        last_error: message,
                    });
                }
                let delay = policy.backoff(tries);
                tracing::debug!(
                    "{} failed (attempt {}/{}): {}; retrying in {:?}",
                    what,
                    tries,
                    policy.max_attempts(),
                    message,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
