//! Input resolution: read a user-supplied path or URL into memory.
//!
//! The partitioner works on an in-memory buffer, so a URL is downloaded
//! straight into a `Vec<u8>` and a local path is read whole. Whether the bytes
//! are actually a PDF is decided later by the partitioner; here only
//! reachability matters, and every failure is a
//! [`PipelineError::SourceUnavailable`].

use crate::error::PipelineError;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load the document behind `input`, downloading it when it is a URL.
pub async fn load_input(input: &str, timeout_secs: u64) -> Result<Vec<u8>, PipelineError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(Path::new(input)).await
    }
}

async fn read_local(path: &Path) -> Result<Vec<u8>, PipelineError> {
    let unavailable = |reason: String| PipelineError::SourceUnavailable {
        location: path.display().to_string(),
        reason,
    };

    let meta = tokio::fs::metadata(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => unavailable("file not found".into()),
        std::io::ErrorKind::PermissionDenied => unavailable("permission denied".into()),
        _ => unavailable(e.to_string()),
    })?;
    if meta.is_dir() {
        return Err(unavailable("is a directory".into()));
    }

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| unavailable(e.to_string()))?;
    debug!("Read {} bytes from {}", bytes.len(), path.display());
    Ok(bytes)
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<Vec<u8>, PipelineError> {
    info!("Downloading PDF from: {}", url);
    let unavailable = |reason: String| PipelineError::SourceUnavailable {
        location: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| unavailable(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            unavailable(format!("timed out after {}s", timeout_secs))
        } else {
            unavailable(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(unavailable(format!("HTTP {}", response.status())));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| unavailable(e.to_string()))?;
    info!("Downloaded {} bytes", bytes.len());
    Ok(bytes.to_vec())
}
