//! Single-shot HTTP fetches shared by both workflows.
//!
//! Handles file downloads with streaming SHA256 verification. There is no
//! retry loop here; the client's timeout bounds every request and the
//! caller decides whether a failure is worth another attempt.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures::StreamExt;
use reqwest::Client;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },
}

/// A file written by [`download_to_file`].
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub path: PathBuf,
    pub size: u64,
    pub sha256: String,
}

async fn get(client: &Client, url: &str) -> Result<reqwest::Response, DownloadError> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(DownloadError::Status {
            url: url.to_string(),
            status,
        });
    }
    Ok(response)
}

/// Fetch a whole response body into memory.
pub async fn fetch_bytes(client: &Client, url: &str) -> Result<Bytes, DownloadError> {
    tracing::debug!("GET {url}");
    let bytes = get(client, url).await?.bytes().await?;
    tracing::debug!("Fetched {} bytes from {url}", bytes.len());
    Ok(bytes)
}

/// Stream a response body to `dest`, hashing it on the way.
///
/// `dest` is created or truncated. When `expected_sha256` is given and does
/// not match, the file is removed and [`DownloadError::HashMismatch`] is
/// returned.
pub async fn download_to_file(
    client: &Client,
    url: &str,
    dest: &Path,
    expected_sha256: Option<&str>,
) -> Result<DownloadedFile, DownloadError> {
    tracing::debug!("Downloading {url} -> {}", dest.display());
    let response = get(client, url).await?;

    let mut file = File::create(dest).await?;
    let mut stream = response.bytes_stream();
    let mut hasher = Sha256::new();
    let mut size: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        hasher.update(&chunk);
        size += chunk.len() as u64;
    }

    file.flush().await?;
    file.sync_all().await?;
    drop(file);
    let actual_hash = hex::encode(hasher.finalize());

    if let Some(expected) = expected_sha256 {
        if !actual_hash.eq_ignore_ascii_case(expected) {
            tokio::fs::remove_file(dest).await.ok();
            return Err(DownloadError::HashMismatch {
                expected: expected.to_string(),
                actual: actual_hash,
            });
        }
    }

    tracing::debug!("Downloaded {size} bytes (sha256 {actual_hash})");
    Ok(DownloadedFile {
        path: dest.to_path_buf(),
        size,
        sha256: actual_hash,
    })
}

/// Download to a sibling `.part` file, then rename over `dest`.
///
/// Readers of `dest` see either the previous file or the complete new one.
pub async fn download_replace(
    client: &Client,
    url: &str,
    dest: &Path,
) -> Result<DownloadedFile, DownloadError> {
    let mut part = dest.as_os_str().to_owned();
    part.push(".part");
    let part = PathBuf::from(part);

    let downloaded = match download_to_file(client, url, &part, None).await {
        Ok(d) => d,
        Err(e) => {
            tokio::fs::remove_file(&part).await.ok();
            return Err(e);
        }
    };
    tokio::fs::rename(&part, dest).await?;

    Ok(DownloadedFile {
        path: dest.to_path_buf(),
        ..downloaded
    })
}
