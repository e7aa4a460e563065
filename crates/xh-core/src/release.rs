//! Release lookup against a GitHub-style release API.
//!
//! The response is walked as untyped JSON rather than deserialized into a
//! struct, so that a shape mismatch at any step is reported as
//! [`ReleaseError::MalformedRelease`] naming the step, and unrelated asset
//! entries with odd shapes are skipped instead of failing the whole lookup.

use reqwest::Client;
use serde_json::Value;
use thiserror::Error;

use crate::io::download::{DownloadError, fetch_bytes};

#[derive(Error, Debug)]
pub enum ReleaseError {
    #[error("Failed to fetch release info: {0}")]
    Network(#[from] DownloadError),

    #[error("Malformed release document: {0}")]
    MalformedRelease(String),

    #[error("No release asset matching '{0}'")]
    AssetNotFound(String),
}

/// One downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseAsset {
    pub name: String,
    pub download_url: String,
    /// Hex SHA-256 from the asset's `digest` field, when published.
    pub sha256: Option<String>,
}

/// Fetch `api_url` and return the first asset whose name contains `pattern`.
pub async fn resolve_asset(
    client: &Client,
    api_url: &str,
    pattern: &str,
) -> Result<ReleaseAsset, ReleaseError> {
    tracing::debug!("Resolving release asset '{pattern}' from {api_url}");
    let body = fetch_bytes(client, api_url).await?;
    let release: Value = serde_json::from_slice(&body)
        .map_err(|e| ReleaseError::MalformedRelease(format!("invalid JSON: {e}")))?;

    let asset = select_asset(&release, pattern)?;
    tracing::info!("Resolved release asset {}", asset.name);
    Ok(asset)
}

/// Pick the first asset of `release` whose name contains `pattern`.
pub fn select_asset(release: &Value, pattern: &str) -> Result<ReleaseAsset, ReleaseError> {
    let release = release
        .as_object()
        .ok_or_else(|| ReleaseError::MalformedRelease("release is not an object".to_string()))?;
    let assets = release
        .get("assets")
        .ok_or_else(|| ReleaseError::MalformedRelease("missing 'assets'".to_string()))?
        .as_array()
        .ok_or_else(|| ReleaseError::MalformedRelease("'assets' is not an array".to_string()))?;

    for asset in assets {
        let Some(asset) = asset.as_object() else {
            continue;
        };
        let Some(name) = asset.get("name").and_then(Value::as_str) else {
            continue;
        };
        if !name.contains(pattern) {
            continue;
        }

        let download_url = asset
            .get("browser_download_url")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ReleaseError::MalformedRelease(format!(
                    "asset '{name}' has no string 'browser_download_url'"
                ))
            })?;

        let sha256 = asset
            .get("digest")
            .and_then(Value::as_str)
            .and_then(|d| d.strip_prefix("sha256:"))
            .map(str::to_string);

        return Ok(ReleaseAsset {
            name: name.to_string(),
            download_url: download_url.to_string(),
            sha256,
        });
    }

    Err(ReleaseError::AssetNotFound(pattern.to_string()))
}
