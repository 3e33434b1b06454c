//! MP3 extraction with FFmpeg

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;

use super::{ConversionError, ConversionResult, Transcoder};
use crate::core::config::TranscodeConfig;

/// Runs the `ffmpeg` binary with a per-run timeout.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    bin: String,
    timeout: Duration,
}

impl FfmpegTranscoder {
    pub fn new(bin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            bin: bin.into(),
            timeout,
        }
    }

    pub fn from_config(config: &TranscodeConfig) -> Self {
        Self::new(config.ffmpeg_bin.clone(), config.timeout())
    }
}

/// Arguments for dropping the video stream and encoding the audio as MP3.
pub fn mp3_args(input: &Path, output: &Path, bitrate_kbps: u32) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-hide_banner", "-loglevel", "error", "-y", "-i"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(input.as_os_str().to_owned());
    for arg in ["-vn", "-acodec", "libmp3lame", "-b:a"] {
        args.push(OsString::from(arg));
    }
    args.push(OsString::from(format!("{}k", bitrate_kbps)));
    args.push(output.as_os_str().to_owned());
    args
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn to_mp3(&self, input: &Path, output: &Path, bitrate_kbps: u32) -> ConversionResult<()> {
        if !input.exists() {
            return Err(ConversionError::InputNotFound(input.display().to_string()));
        }

        log::info!("Converting {} to MP3 at {}k", input.display(), bitrate_kbps);

        let mut cmd = Command::new(&self.bin);
        cmd.args(mp3_args(input, output, bitrate_kbps)).kill_on_drop(true);

        let output_result = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| ConversionError::Timeout(self.timeout.as_secs()))??;

        if !output_result.status.success() {
            let stderr = String::from_utf8_lossy(&output_result.stderr);
            log::error!("FFmpeg audio conversion error: {}", stderr);
            return Err(ConversionError::FfmpegError(stderr.trim().to_string()));
        }

        log::info!("Conversion finished: {}", output.display());
        Ok(())
    }
}
