//! Git LFS upload for data files too large to commit inline
//!
//! The Hub stores large files out of band: the client asks the LFS batch
//! endpoint where to put the object, uploads the bytes there (in one PUT or
//! in presigned parts), optionally confirms the upload, and then commits a
//! pointer naming the object's sha256 and size.

use super::hub::status_error;
use crate::publish::PublishError;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

const LFS_CONTENT_TYPE: &str = "application/vnd.git-lfs+json";
const CHUNK_SIZE_KEY: &str = "chunk_size";

/// Content address of an uploaded object
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LfsPointer {
    pub oid: String,
    pub size: u64,
}

impl LfsPointer {
    pub fn for_content(content: &[u8]) -> Self {
        Self {
            oid: hex::encode(Sha256::digest(content)),
            size: content.len() as u64,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    objects: Vec<BatchObject>,
}

#[derive(Debug, Deserialize)]
struct BatchObject {
    oid: String,
    #[serde(default)]
    actions: Option<BatchActions>,
    #[serde(default)]
    error: Option<BatchObjectError>,
}

#[derive(Debug, Deserialize)]
struct BatchActions {
    upload: Option<BatchAction>,
    verify: Option<BatchAction>,
}

#[derive(Debug, Deserialize)]
struct BatchAction {
    href: String,
    #[serde(default)]
    header: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct BatchObjectError {
    code: u16,
    message: String,
}

/// Uploads `content` to the LFS store behind `batch_url`
///
/// Returns without transferring anything when the store already holds an
/// object with the same oid.
pub(crate) async fn upload(
    client: &Client,
    batch_url: &str,
    token: &str,
    revision: &str,
    pointer: &LfsPointer,
    content: &[u8],
) -> Result<(), PublishError> {
    let body = json!({
        "operation": "upload",
        "transfers": ["basic", "multipart"],
        "objects": [{ "oid": pointer.oid, "size": pointer.size }],
        "hash_algo": "sha256",
        "ref": { "name": revision },
    });

    let response = client
        .post(batch_url)
        .bearer_auth(token)
        .header(reqwest::header::ACCEPT, LFS_CONTENT_TYPE)
        .header(reqwest::header::CONTENT_TYPE, LFS_CONTENT_TYPE)
        .body(serde_json::to_string(&body)?)
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(status_error("lfs batch", response).await);
    }

    let batch: BatchResponse = serde_json::from_str(&response.text().await?)?;
    let object = batch
        .objects
        .into_iter()
        .find(|o| o.oid == pointer.oid)
        .ok_or_else(|| PublishError::Lfs(format!("batch answer lacks object {}", pointer.oid)))?;

    if let Some(error) = object.error {
        return Err(PublishError::Lfs(format!(
            "object {} refused ({}): {}",
            pointer.oid, error.code, error.message
        )));
    }

    let Some(actions) = object.actions else {
        tracing::debug!("LFS object {} already stored", pointer.oid);
        return Ok(());
    };
    let Some(upload) = actions.upload else {
        tracing::debug!("LFS object {} already stored", pointer.oid);
        return Ok(());
    };

    if upload.header.contains_key(CHUNK_SIZE_KEY) {
        upload_parts(client, &upload, pointer, content).await?;
    } else {
        upload_single(client, &upload, content).await?;
    }

    if let Some(verify) = actions.verify {
        let mut request = client.post(&verify.href).bearer_auth(token);
        for (name, value) in &verify.header {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request
            .header(reqwest::header::CONTENT_TYPE, LFS_CONTENT_TYPE)
            .body(serde_json::to_string(
                &json!({ "oid": pointer.oid, "size": pointer.size }),
            )?)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(status_error("lfs verify", response).await);
        }
    }

    tracing::info!("Uploaded {} bytes as LFS object {}", pointer.size, pointer.oid);
    Ok(())
}

async fn upload_single(
    client: &Client,
    action: &BatchAction,
    content: &[u8],
) -> Result<(), PublishError> {
    let mut request = client.put(&action.href);
    for (name, value) in &action.header {
        request = request.header(name.as_str(), value.as_str());
    }
    let response = request.body(content.to_vec()).send().await?;
    if !response.status().is_success() {
        return Err(status_error("lfs upload", response).await);
    }
    Ok(())
}

/// Multipart transfer: the action header carries `chunk_size` and one
/// presigned URL per part, keyed by part number. Completion posts the part
/// etags back to the action href.
async fn upload_parts(
    client: &Client,
    action: &BatchAction,
    pointer: &LfsPointer,
    content: &[u8],
) -> Result<(), PublishError> {
    let chunk_size = action
        .header
        .get(CHUNK_SIZE_KEY)
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|size| *size > 0)
        .ok_or_else(|| PublishError::Lfs("invalid chunk_size in upload action".to_string()))?;

    let mut part_urls: Vec<(u32, &str)> = action
        .header
        .iter()
        .filter_map(|(key, url)| key.parse::<u32>().ok().map(|n| (n, url.as_str())))
        .collect();
    part_urls.sort_by_key(|(number, _)| *number);

    let expected = content.len().div_ceil(chunk_size);
    if part_urls.len() != expected {
        return Err(PublishError::Lfs(format!(
            "expected {} part urls, got {}",
            expected,
            part_urls.len()
        )));
    }

    let mut parts = Vec::with_capacity(part_urls.len());
    for (index, (number, url)) in part_urls.into_iter().enumerate() {
        let start = index * chunk_size;
        let end = (start + chunk_size).min(content.len());
        let response = client
            .put(url)
            .body(content[start..end].to_vec())
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(status_error("lfs part upload", response).await);
        }
        let etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| PublishError::Lfs(format!("part {} answered without etag", number)))?;
        parts.push(json!({ "partNumber": number, "etag": etag }));
    }

    let response = client
        .post(&action.href)
        .header(reqwest::header::ACCEPT, LFS_CONTENT_TYPE)
        .header(reqwest::header::CONTENT_TYPE, LFS_CONTENT_TYPE)
        .body(serde_json::to_string(
            &json!({ "oid": pointer.oid, "parts": parts }),
        )?)
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(status_error("lfs completion", response).await);
    }
    Ok(())
}
