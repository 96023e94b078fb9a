//! Crawler module for the harvest run
//!
//! This module contains the core harvesting logic, including:
//! - HTTP client construction and retry logic
//! - The bounded batch of resolved documents
//! - Overall run coordination

mod batch;
mod coordinator;
mod http;

pub use batch::{BatchAccumulator, ResolvedEntry};
pub use coordinator::{run_harvest, Coordinator, RunReport, RunSettings};
pub use http::{
    build_http_client, check_status, classify_error, is_retryable_error, is_retryable_status,
    with_retry, AttemptError, RequestFailure, RetryPolicy,
};
