//! Streaming download of source media to a local file.

use futures_util::StreamExt;
use std::path::Path;
use tokio::io::AsyncWriteExt;

use crate::core::error::{AppError, AppResult};

/// Message surfaced to clients for any download failure
pub const DOWNLOAD_FAILED: &str = "Failed to download video";

/// Streams `url` into `dest` chunk by chunk. Returns the number of bytes written.
///
/// On failure the partially written file is left for the caller to remove.
pub async fn download_to_file(client: &reqwest::Client, url: &str, dest: &Path) -> AppResult<u64> {
    let response = client.get(url).send().await.map_err(|e| {
        log::error!("Download request for {} failed: {}", url, e);
        AppError::DownloadFailed(DOWNLOAD_FAILED.to_string())
    })?;

    let status = response.status();
    if !status.is_success() {
        log::error!("Download of {} returned HTTP {}", url, status);
        return Err(AppError::DownloadFailed(DOWNLOAD_FAILED.to_string()));
    }

    let mut file = tokio::fs::File::create(dest).await.map_err(|e| {
        log::error!("Failed to create {}: {}", dest.display(), e);
        AppError::DownloadFailed(DOWNLOAD_FAILED.to_string())
    })?;

    let mut written: u64 = 0;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            log::error!("Error reading chunk from {}: {}", url, e);
            AppError::DownloadFailed(DOWNLOAD_FAILED.to_string())
        })?;
        file.write_all(&chunk).await.map_err(|e| {
            log::error!("Error writing to {}: {}", dest.display(), e);
            AppError::DownloadFailed(DOWNLOAD_FAILED.to_string())
        })?;
        written += chunk.len() as u64;
    }

    file.flush().await.map_err(|e| {
        log::error!("Error flushing {}: {}", dest.display(), e);
        AppError::DownloadFailed(DOWNLOAD_FAILED.to_string())
    })?;

    log::info!("Downloaded {} bytes to {}", written, dest.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_download_writes_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/x.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 4096]))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("x.mp4");
        let written = download_to_file(&reqwest::Client::new(), &format!("{}/x.mp4", server.uri()), &dest)
            .await
            .unwrap();

        assert_eq!(written, 4096);
        assert_eq!(std::fs::read(&dest).unwrap(), vec![7u8; 4096]);
    }

    #[tokio::test]
    async fn test_http_error_is_download_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("x.mp4");
        let err = download_to_file(&reqwest::Client::new(), &format!("{}/gone.mp4", server.uri()), &dest)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), DOWNLOAD_FAILED);
        assert!(!dest.exists());
    }
}
