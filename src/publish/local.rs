//! Local JSONL publisher
//!
//! Same merge as the Hub publisher, against a file on disk. The merged file
//! replaces the old one through a rename.

use crate::config::PublishConfig;
use crate::crawler::ResolvedEntry;
use crate::publish::{
    merge_rows, parse_jsonl, to_jsonl, DatasetRow, PublishError, PublishReceipt, Publisher,
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Publishes batches into a JSONL file
#[derive(Debug, Clone)]
pub struct LocalPublisher {
    path: PathBuf,
    source_label: String,
}

impl LocalPublisher {
    pub fn new(path: impl Into<PathBuf>, source_label: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            source_label: source_label.into(),
        }
    }

    pub fn from_config(config: &PublishConfig) -> Self {
        Self::new(&config.local_path, &config.source_label)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the current rows; a missing file is an empty dataset
    pub async fn read_rows(&self) -> Result<Vec<DatasetRow>, PublishError> {
        match fs::read_to_string(&self.path).await {
            Ok(content) => parse_jsonl(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_rows(&self, content: &str) -> Result<(), PublishError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let tmp_path = self.path.with_extension("jsonl.tmp");
        {
            let mut file = fs::File::create(&tmp_path).await?;
            file.write_all(content.as_bytes()).await?;
            file.sync_all().await?;
        }
        fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl Publisher for LocalPublisher {
    async fn publish(&self, batch: &[ResolvedEntry]) -> Result<PublishReceipt, PublishError> {
        let existing = self.read_rows().await?;
        let incoming = batch
            .iter()
            .map(|entry| DatasetRow::from_entry(entry, &self.source_label))
            .collect();
        let merged = merge_rows(existing, incoming);

        self.write_rows(&to_jsonl(&merged.rows)?).await?;
        tracing::info!(
            "Wrote {} rows to {} ({} new, {} updated)",
            merged.rows.len(),
            self.path.display(),
            merged.added,
            merged.updated
        );

        Ok(PublishReceipt {
            added: merged.added,
            updated: merged.updated,
            total_rows: merged.rows.len(),
            commit: None,
        })
    }
}
