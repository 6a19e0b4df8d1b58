//! Version manifest (`cli-versions.json`).
//!
//! The manifest is read with a tolerant scanner rather than a JSON parser:
//! the value is the first double-quoted token that follows the first
//! occurrence of `"cli-latest"`. Anything else in the document is ignored,
//! so a manifest that is not strictly valid JSON still yields a version.

use anyhow::Result;
use log::{debug, info};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::Config;
use crate::error::InstallError;
use crate::http::HttpClient;

pub const MANIFEST_FILE: &str = "cli-versions.json";
pub const LATEST_KEY: &str = "cli-latest";

/// Extract the `cli-latest` value from a manifest body.
pub fn extract_latest_version(body: &str) -> Result<String, InstallError> {
    let key = format!("\"{}\"", LATEST_KEY);
    let start = body
        .find(&key)
        .ok_or_else(|| InstallError::InvalidManifest(format!("no \"{}\" key", LATEST_KEY)))?;

    let rest = &body[start + key.len()..];
    let open = rest.find('"').ok_or_else(|| {
        InstallError::InvalidManifest(format!("no value after \"{}\"", LATEST_KEY))
    })?;
    let value = &rest[open + 1..];
    let close = value
        .find('"')
        .ok_or_else(|| InstallError::InvalidManifest("unterminated version string".into()))?;

    let version = &value[..close];
    if version.trim().is_empty() {
        return Err(InstallError::InvalidManifest(format!(
            "empty \"{}\" value",
            LATEST_KEY
        )));
    }
    Ok(version.to_string())
}

/// Fetch the manifest; the timestamp query defeats intermediate caches.
#[tracing::instrument(skip(http, bucket_url))]
pub async fn fetch_latest_version(http: &HttpClient, bucket_url: &str) -> Result<String> {
    let url = format!("{}/{}", bucket_url.trim_end_matches('/'), MANIFEST_FILE);
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
        .to_string();

    let body = http
        .get_text_with_query(&url, &[("t", timestamp.as_str())])
        .await?;
    debug!("Manifest body: {}", body);

    Ok(extract_latest_version(&body)?)
}

/// The pinned version when configured, otherwise the manifest's latest.
pub async fn resolve_version(config: &Config, http: &HttpClient) -> Result<String> {
    if let Some(version) = &config.cli_version {
        info!("Using pinned version {}", version);
        return Ok(version.clone());
    }
    let version = fetch_latest_version(http, &config.bucket_url).await?;
    info!("Latest version is {}", version);
    Ok(version)
}
