//! Publish module for the harvested dataset
//!
//! This module handles:
//! - The `Publisher` trait the coordinator hands a finished batch to
//! - Merging a batch into existing dataset rows, keyed by identifier
//! - JSONL encoding of dataset rows
//! - A dataset hub publisher and a local-file publisher

mod hub;
mod lfs;
mod local;

pub use hub::HubPublisher;
pub use local::LocalPublisher;

use crate::crawler::ResolvedEntry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur while publishing a batch
///
/// Any of these fails the run; the checkpoint is not advanced.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("HF_TOKEN is not set")]
    MissingToken,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{operation} rejected with HTTP {status}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("LFS upload failed: {0}")]
    Lfs(String),

    #[error("Malformed dataset row at line {line}: {message}")]
    MalformedRow { line: usize, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One row of the published dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRow {
    pub identifier: String,
    pub text: String,
    #[serde(default)]
    pub source: String,
}

impl DatasetRow {
    pub fn from_entry(entry: &ResolvedEntry, source: &str) -> Self {
        Self {
            identifier: entry.identifier.to_string(),
            text: entry.text.clone(),
            source: source.to_string(),
        }
    }
}

/// What a successful publish changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReceipt {
    /// Rows whose identifier was not in the dataset before
    pub added: usize,
    /// Rows whose identifier was already present
    pub updated: usize,
    /// Dataset size after the publish
    pub total_rows: usize,
    /// Remote commit id, when the store reports one
    pub commit: Option<String>,
}

/// Destination of finished batches
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Merges `batch` into the dataset and commits it in one step
    ///
    /// Observers see the dataset either before or after the whole batch.
    async fn publish(&self, batch: &[ResolvedEntry]) -> Result<PublishReceipt, PublishError>;
}

/// Result of merging a batch into existing rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub rows: Vec<DatasetRow>,
    pub added: usize,
    pub updated: usize,
}

/// Merges `incoming` into `existing`, keyed by identifier
///
/// An identifier keeps the position of its first occurrence and the content
/// of its last one. The output never repeats an identifier, so merging the
/// same rows twice is a no-op.
pub fn merge_rows(existing: Vec<DatasetRow>, incoming: Vec<DatasetRow>) -> MergeOutcome {
    let mut rows: Vec<DatasetRow> = Vec::with_capacity(existing.len() + incoming.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for row in existing {
        upsert(&mut rows, &mut index, row);
    }

    let baseline = rows.len();
    // identifier -> whether it existed before this batch
    let mut seen_in_batch: HashMap<String, bool> = HashMap::new();
    for row in incoming {
        if !seen_in_batch.contains_key(&row.identifier) {
            let present = index.contains_key(&row.identifier);
            seen_in_batch.insert(row.identifier.clone(), present);
        }
        upsert(&mut rows, &mut index, row);
    }

    let added = rows.len() - baseline;
    let updated = seen_in_batch.values().filter(|present| **present).count();

    MergeOutcome {
        rows,
        added,
        updated,
    }
}

fn upsert(rows: &mut Vec<DatasetRow>, index: &mut HashMap<String, usize>, row: DatasetRow) {
    match index.get(&row.identifier) {
        Some(&position) => rows[position] = row,
        None => {
            index.insert(row.identifier.clone(), rows.len());
            rows.push(row);
        }
    }
}

/// Parses JSON Lines into dataset rows; blank lines are skipped
pub fn parse_jsonl(content: &str) -> Result<Vec<DatasetRow>, PublishError> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(number, line)| {
            serde_json::from_str(line).map_err(|e| PublishError::MalformedRow {
                line: number + 1,
                message: e.to_string(),
            })
        })
        .collect()
}

/// Encodes rows as JSON Lines, one row per line with a trailing newline
pub fn to_jsonl(rows: &[DatasetRow]) -> Result<String, PublishError> {
    let mut out = String::new();
    for row in rows {
        out.push_str(&serde_json::to_string(row)?);
        out.push('\n');
    }
    Ok(out)
}
