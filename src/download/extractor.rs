//! Media extraction: Instagram post URL -> direct media URL + thumbnail.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tokio::process::Command;

use crate::core::config::ExtractorConfig;
use crate::core::error::{AppError, AppResult};

/// One media item of a post.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaDescriptor {
    pub url: Option<String>,
    pub thumbnail: Option<String>,
}

/// First usable item of an extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub media_url: String,
    pub thumbnail_url: Option<String>,
}

/// Resolves a post URL into its media items, in post order.
#[async_trait]
pub trait Extractor: Send + Sync {
    fn name(&self) -> &str;

    async fn extract(&self, url: &str) -> AppResult<Vec<MediaDescriptor>>;
}

/// Picks the first descriptor. Only the first item of a carousel is served.
pub fn first_media(descriptors: Vec<MediaDescriptor>) -> AppResult<ResolvedSource> {
    let first = descriptors.into_iter().next().ok_or(AppError::NoMediaFound)?;
    let media_url = first.url.filter(|u| !u.is_empty()).ok_or(AppError::NoMediaFound)?;
    Ok(ResolvedSource {
        media_url,
        thumbnail_url: first.thumbnail,
    })
}

/// Extractor backed by `yt-dlp --dump-single-json`.
#[derive(Debug, Clone)]
pub struct YtDlpExtractor {
    bin: String,
    timeout: Duration,
}

impl YtDlpExtractor {
    pub fn new(bin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            bin: bin.into(),
            timeout,
        }
    }

    pub fn from_config(config: &ExtractorConfig) -> Self {
        Self::new(config.ytdlp_bin.clone(), config.timeout())
    }

    fn args(url: &str) -> [&str; 6] {
        ["--dump-single-json", "--no-warnings", "--no-playlist", "-f", "b", url]
    }
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    async fn extract(&self, url: &str) -> AppResult<Vec<MediaDescriptor>> {
        log::info!("Extracting media for {}", url);

        let mut cmd = Command::new(&self.bin);
        cmd.args(Self::args(url)).kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(AppError::ExtractionFailed(format!("Failed to run yt-dlp: {}", e)));
            }
            Err(_) => {
                log::error!("yt-dlp timed out after {}s for {}", self.timeout.as_secs(), url);
                return Err(AppError::ExtractionFailed(format!(
                    "yt-dlp timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            log::warn!("yt-dlp failed for {}: {}", url, stderr.trim());
            return Err(AppError::ExtractionFailed(format!(
                "Failed to get media info: {}",
                stderr.trim()
            )));
        }

        let value: Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| AppError::ExtractionFailed(format!("Failed to parse JSON metadata: {}", e)))?;

        let descriptors = parse_descriptors(&value);
        log::info!("yt-dlp found {} media item(s) for {}", descriptors.len(), url);
        Ok(descriptors)
    }
}

/// Maps yt-dlp JSON to descriptors. A carousel comes back as a playlist with
/// `entries`; anything else is a single item.
pub fn parse_descriptors(value: &Value) -> Vec<MediaDescriptor> {
    match value.get("entries").and_then(Value::as_array) {
        Some(entries) => entries.iter().map(descriptor_from_info).collect(),
        None => vec![descriptor_from_info(value)],
    }
}

fn descriptor_from_info(info: &Value) -> MediaDescriptor {
    let url = info
        .get("url")
        .and_then(Value::as_str)
        .or_else(|| {
            info.get("requested_downloads")
                .and_then(Value::as_array)
                .and_then(|downloads| downloads.first())
                .and_then(|d| d.get("url"))
                .and_then(Value::as_str)
        })
        .map(str::to_string);

    // yt-dlp orders `thumbnails` by preference, best last
    let thumbnail = info
        .get("thumbnail")
        .and_then(Value::as_str)
        .or_else(|| {
            info.get("thumbnails")
                .and_then(Value::as_array)
                .and_then(|thumbs| thumbs.iter().rev().find_map(|t| t.get("url").and_then(Value::as_str)))
        })
        .map(str::to_string);

    MediaDescriptor { url, thumbnail }
}
