//! Media transcoding.
//!
//! The service only needs one conversion: the audio track of a downloaded
//! video re-encoded to MP3. FFmpeg does the work; [`Transcoder`] is the seam
//! tests replace.

pub mod audio;

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

pub use audio::FfmpegTranscoder;

/// Errors that can occur during conversion
#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),

    #[error("Input file not found: {0}")]
    InputNotFound(String),

    #[error("FFmpeg did not finish within {0}s")]
    Timeout(u64),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type ConversionResult<T> = Result<T, ConversionError>;

/// Extracts the audio of a media file into an MP3.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Writes `output` as MP3 at `bitrate_kbps`. `output` is overwritten.
    async fn to_mp3(&self, input: &Path, output: &Path, bitrate_kbps: u32) -> ConversionResult<()>;
}

/// Check if ffmpeg is available
pub async fn check_ffmpeg(bin: &str) -> bool {
    tokio::process::Command::new(bin)
        .arg("-version")
        .output()
        .await
        .map(|o| o.status.success())
        .unwrap_or(false)
}
