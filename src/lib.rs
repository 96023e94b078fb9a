//! Lex-Harvest: an incremental legal-text harvester
//!
//! This crate pages through an SRU search service, resolves every record to a
//! CELEX document number, fetches the full text of that document from EUR-Lex
//! and publishes the accumulated corpus to a dataset repository. Progress is
//! tracked by a checkpoint offset that only moves forward after a batch has
//! been published.

pub mod checkpoint;
pub mod config;
pub mod crawler;
pub mod documents;
pub mod output;
pub mod publish;
pub mod search;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Lex-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Search request at offset {offset} failed: {reason}")]
    Search { offset: u64, reason: String },

    #[error("Document source unavailable: {consecutive} consecutive outage failures (last: {identifier})")]
    DocumentSourceDown { consecutive: u32, identifier: String },

    #[error("Publish error: {0}")]
    Publish(#[from] publish::PublishError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] storage::LedgerError),

    #[error("Checkpoint error at {path}: {source}")]
    Checkpoint {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid run phase transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::RunPhase,
        to: state::RunPhase,
    },

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Lex-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use checkpoint::{CheckpointStore, FileCheckpointStore};
pub use config::Config;
pub use crawler::{BatchAccumulator, Coordinator, ResolvedEntry, RunReport};
pub use documents::{resolve, CelexId, DocumentSource, FetchError};
pub use publish::{DatasetRow, PublishError, Publisher};
pub use search::{Record, SearchPage, SearchSource};
pub use state::RunPhase;
