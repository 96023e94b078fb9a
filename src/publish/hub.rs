//! Hugging Face Hub dataset publisher
//!
//! A publish reads the commit sha the configured revision points at,
//! downloads the data file at that sha, merges the batch into it and
//! uploads the merged file as one commit. The commit names the sha it was
//! based on, so a concurrent writer makes the commit fail instead of
//! silently losing rows.
//!
//! Small files are committed inline. Files at or above the LFS threshold,
//! or files the Hub asks to be stored in LFS, are uploaded to LFS first and
//! committed as a pointer.

use super::lfs::{self, LfsPointer};
use crate::config::PublishConfig;
use crate::crawler::ResolvedEntry;
use crate::publish::{
    merge_rows, parse_jsonl, to_jsonl, DatasetRow, PublishError, PublishReceipt, Publisher,
};
use crate::HarvestError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

/// Environment variable holding the Hub access token
pub const TOKEN_ENV: &str = "HF_TOKEN";

/// Bytes of the file sent along with a preupload query
const PREUPLOAD_SAMPLE_BYTES: usize = 512;

#[derive(Debug, Deserialize)]
struct RevisionInfo {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct PreuploadResponse {
    #[serde(default)]
    files: Vec<PreuploadFile>,
}

#[derive(Debug, Deserialize)]
struct PreuploadFile {
    path: String,
    #[serde(rename = "uploadMode")]
    upload_mode: String,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    #[serde(rename = "commitOid")]
    commit_oid: Option<String>,
}

/// How the data file travels in the commit
#[derive(Debug, Clone, PartialEq, Eq)]
enum CommitFile {
    Inline,
    Lfs(LfsPointer),
}

/// Publishes batches as JSONL into a Hub dataset repository
#[derive(Debug, Clone)]
pub struct HubPublisher {
    client: Client,
    hub_url: String,
    repo_id: String,
    revision: String,
    data_path: String,
    source_label: String,
    lfs_threshold: u64,
    token: Option<String>,
}

impl HubPublisher {
    pub fn new(
        client: Client,
        config: &PublishConfig,
        token: Option<String>,
    ) -> Result<Self, HarvestError> {
        // Fail on a bad base URL here rather than on the first publish
        url::Url::parse(&config.hub_url)?;

        Ok(Self {
            client,
            hub_url: config.hub_url.trim_end_matches('/').to_string(),
            repo_id: config.repo_id.clone(),
            revision: config.revision.clone(),
            data_path: config.data_path.trim_start_matches('/').to_string(),
            source_label: config.source_label.clone(),
            lfs_threshold: config.lfs_threshold_bytes,
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    /// Reads the token from `HF_TOKEN`
    pub fn token_from_env() -> Option<String> {
        std::env::var(TOKEN_ENV).ok().filter(|t| !t.trim().is_empty())
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// URL of the raw data file at a revision or commit sha
    pub fn resolve_url(&self, revision: &str) -> String {
        format!(
            "{}/datasets/{}/resolve/{}/{}",
            self.hub_url, self.repo_id, revision, self.data_path
        )
    }

    fn revision_url(&self) -> String {
        format!(
            "{}/api/datasets/{}/revision/{}",
            self.hub_url, self.repo_id, self.revision
        )
    }

    fn preupload_url(&self) -> String {
        format!(
            "{}/api/datasets/{}/preupload/{}",
            self.hub_url, self.repo_id, self.revision
        )
    }

    fn lfs_batch_url(&self) -> String {
        format!(
            "{}/datasets/{}.git/info/lfs/objects/batch",
            self.hub_url, self.repo_id
        )
    }

    fn commit_url(&self) -> String {
        format!(
            "{}/api/datasets/{}/commit/{}",
            self.hub_url, self.repo_id, self.revision
        )
    }

    fn create_url(&self) -> String {
        format!("{}/api/repos/create", self.hub_url)
    }

    /// Commit sha the configured revision points at; None when the
    /// repository or the revision does not exist yet
    async fn revision_sha(&self, token: &str) -> Result<Option<String>, PublishError> {
        let response = self
            .client
            .get(self.revision_url())
            .bearer_auth(token)
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let info: RevisionInfo = serde_json::from_str(&response.text().await?)?;
                Ok(Some(info.sha))
            }
            _ => Err(status_error("revision", response).await),
        }
    }

    /// Reads the data file as of `sha`; redirects to storage are followed
    async fn download(&self, token: &str, sha: &str) -> Result<Vec<DatasetRow>, PublishError> {
        let url = self.resolve_url(sha);
        tracing::debug!("Downloading current dataset from {}", url);

        let response = self.client.get(&url).bearer_auth(token).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            tracing::info!("Dataset file {} not found, starting empty", self.data_path);
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(status_error("download", response).await);
        }

        let body = response.text().await?;
        parse_jsonl(&body)
    }

    async fn ensure_repo(&self, token: &str) -> Result<(), PublishError> {
        let (organization, name) = match self.repo_id.split_once('/') {
            Some((owner, name)) => (Some(owner), name),
            None => (None, self.repo_id.as_str()),
        };
        let body = json!({
            "type": "dataset",
            "name": name,
            "organization": organization,
            "private": false,
        });

        let response = self
            .client
            .post(self.create_url())
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_string(&body)?)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                tracing::info!("Created dataset repository {}", self.repo_id);
                Ok(())
            }
            StatusCode::CONFLICT => Ok(()),
            _ => Err(status_error("create repository", response).await),
        }
    }

    /// Asks the Hub whether the data file must be stored in LFS
    async fn requires_lfs(&self, token: &str, content: &[u8]) -> Result<bool, PublishError> {
        let sample = &content[..content.len().min(PREUPLOAD_SAMPLE_BYTES)];
        let body = json!({
            "files": [{
                "path": self.data_path,
                "sample": STANDARD.encode(sample),
                "size": content.len(),
            }],
        });

        let response = self
            .client
            .post(self.preupload_url())
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_string(&body)?)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(status_error("preupload", response).await);
        }

        let answer: PreuploadResponse = serde_json::from_str(&response.text().await?)?;
        Ok(answer
            .files
            .iter()
            .any(|file| file.path == self.data_path && file.upload_mode == "lfs"))
    }

    /// Uploads the file to LFS when it needs to go there
    async fn prepare_file(&self, token: &str, content: &[u8]) -> Result<CommitFile, PublishError> {
        let use_lfs = content.len() as u64 >= self.lfs_threshold
            || self.requires_lfs(token, content).await?;
        if !use_lfs {
            return Ok(CommitFile::Inline);
        }

        let pointer = LfsPointer::for_content(content);
        lfs::upload(
            &self.client,
            &self.lfs_batch_url(),
            token,
            &self.revision,
            &pointer,
            content,
        )
        .await?;
        Ok(CommitFile::Lfs(pointer))
    }

    async fn commit(
        &self,
        token: &str,
        content: &[u8],
        file: &CommitFile,
        summary: &str,
        parent_commit: Option<&str>,
    ) -> Result<Option<String>, PublishError> {
        let mut header = json!({ "summary": summary, "description": "" });
        if let Some(parent) = parent_commit {
            header["parentCommit"] = json!(parent);
        }

        let operation = match file {
            CommitFile::Inline => json!({
                "key": "file",
                "value": {
                    "content": STANDARD.encode(content),
                    "path": self.data_path,
                    "encoding": "base64",
                },
            }),
            CommitFile::Lfs(pointer) => json!({
                "key": "lfsFile",
                "value": {
                    "path": self.data_path,
                    "algo": "sha256",
                    "oid": pointer.oid,
                    "size": pointer.size,
                },
            }),
        };

        let lines = [json!({ "key": "header", "value": header }), operation];
        let mut payload = String::new();
        for line in &lines {
            payload.push_str(&serde_json::to_string(line)?);
            payload.push('\n');
        }

        let response = self
            .client
            .post(self.commit_url())
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error("commit", response).await);
        }

        let body = response.text().await?;
        let commit = serde_json::from_str::<CommitResponse>(&body)
            .ok()
            .and_then(|r| r.commit_oid);
        Ok(commit)
    }
}

#[async_trait]
impl Publisher for HubPublisher {
    async fn publish(&self, batch: &[ResolvedEntry]) -> Result<PublishReceipt, PublishError> {
        let token = self.token.as_deref().ok_or(PublishError::MissingToken)?;

        let parent_commit = self.revision_sha(token).await?;
        let existing = match &parent_commit {
            Some(sha) => self.download(token, sha).await?,
            None => {
                self.ensure_repo(token).await?;
                Vec::new()
            }
        };

        let incoming = batch
            .iter()
            .map(|entry| DatasetRow::from_entry(entry, &self.source_label))
            .collect();
        let merged = merge_rows(existing, incoming);
        let content = to_jsonl(&merged.rows)?;

        let file = self.prepare_file(token, content.as_bytes()).await?;
        let summary = format!(
            "Add {} documents, update {}",
            merged.added, merged.updated
        );
        let commit = self
            .commit(
                token,
                content.as_bytes(),
                &file,
                &summary,
                parent_commit.as_deref(),
            )
            .await?;

        tracing::info!(
            "Committed {} rows to {} ({})",
            merged.rows.len(),
            self.repo_id,
            commit.as_deref().unwrap_or("no commit id")
        );

        Ok(PublishReceipt {
            added: merged.added,
            updated: merged.updated,
            total_rows: merged.rows.len(),
            commit,
        })
    }
}

pub(super) async fn status_error(
    operation: &'static str,
    response: reqwest::Response,
) -> PublishError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    PublishError::Status {
        operation,
        status,
        body: body.chars().take(500).collect(),
    }
}
