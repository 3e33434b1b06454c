//! Service configuration
//!
//! Layers, later wins:
//! 1. built-in defaults (the values below)
//! 2. optional TOML file (`reelgrab.toml` or `--config <path>`)
//! 3. `REELGRAB_*` environment variables, nested keys split on `__`
//!    (`REELGRAB_RATE_LIMIT__MAX_REQUESTS=50`, `REELGRAB_SERVER__PORT=8080`)
//!
//! `.env` is loaded by `main` before this runs, so it feeds layer 3.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::error::{AppError, AppResult};
use crate::storage::uploads::{ResourceType, SignatureAlgorithm};

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "reelgrab.toml";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "REELGRAB_";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub cors: CorsConfig,
    pub rate_limit: RateLimitConfig,
    pub cache: CacheConfig,
    pub cleanup: CleanupConfig,
    pub extractor: ExtractorConfig,
    pub transcode: TranscodeConfig,
    pub download: DownloadConfig,
    pub cloudinary: CloudinaryConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// Cache/counter store. Without a Redis URL the service falls back to a
/// process-local store: fine for development, but the request counter and
/// pending remote deletions are lost on restart.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct StoreConfig {
    pub redis_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:8080".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Length of the fixed window, in seconds
    pub window_secs: u64,
    /// Requests allowed per client IP inside one window
    pub max_requests: u32,
    /// Key clients by the first `X-Forwarded-For` hop instead of the socket
    /// address. Only enable behind a proxy that overwrites the header.
    pub trust_forwarded_for: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: 15 * 60,
            max_requests: 100,
            trust_forwarded_for: false,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL for resolved mp4 links (CDN links expire quickly)
    pub video_ttl_secs: u64,
    /// TTL for uploaded mp3 links
    pub audio_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            video_ttl_secs: 60,
            audio_ttl_secs: 120,
        }
    }
}

impl CacheConfig {
    pub fn video_ttl(&self) -> Duration {
        Duration::from_secs(self.video_ttl_secs)
    }

    pub fn audio_ttl(&self) -> Duration {
        Duration::from_secs(self.audio_ttl_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    /// Delay between a successful mp3 response and deletion of the upload
    pub delay_secs: u64,
    /// How often the worker looks for due deletions
    pub poll_interval_secs: u64,
    /// Max deletions handled per poll
    pub batch_size: usize,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            delay_secs: 60,
            poll_interval_secs: 5,
            batch_size: 50,
        }
    }
}

impl CleanupConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub ytdlp_bin: String,
    pub timeout_secs: u64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            ytdlp_bin: "yt-dlp".to_string(),
            timeout_secs: 60,
        }
    }
}

impl ExtractorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    pub ffmpeg_bin: String,
    pub audio_bitrate_kbps: u32,
    pub timeout_secs: u64,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            ffmpeg_bin: "ffmpeg".to_string(),
            audio_bitrate_kbps: 128,
            timeout_secs: 300,
        }
    }
}

impl TranscodeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Directory for the per-request temp files
    pub temp_dir: PathBuf,
    pub timeout_secs: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            temp_dir: std::env::temp_dir(),
            timeout_secs: 300,
        }
    }
}

impl DownloadConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CloudinaryConfig {
    pub api_base: String,
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: SecretString,
    /// Resource type used for uploads and deletes. Cloudinary files audio
    /// under `video`.
    pub resource_type: ResourceType,
    /// Must match the product environment's signature setting. Cloudinary
    /// defaults to SHA-1.
    pub signature_algorithm: SignatureAlgorithm,
}

impl Default for CloudinaryConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.cloudinary.com".to_string(),
            cloud_name: String::new(),
            api_key: String::new(),
            api_secret: SecretString::from(String::new()),
            resource_type: ResourceType::Video,
            signature_algorithm: SignatureAlgorithm::Sha1,
        }
    }
}

impl CloudinaryConfig {
    pub fn is_configured(&self) -> bool {
        use secrecy::ExposeSecret;
        !self.cloud_name.is_empty() && !self.api_key.is_empty() && !self.api_secret.expose_secret().is_empty()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub file_path: PathBuf,
    pub error_file_path: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file_path: PathBuf::from("combined.log"),
            error_file_path: PathBuf::from("error.log"),
        }
    }
}

impl Config {
    /// Builds the layered figment without extracting it.
    ///
    /// A missing TOML file is not an error; figment treats it as empty.
    pub fn figment(config_file: Option<&Path>) -> Figment {
        let file = config_file
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        Figment::new()
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Loads configuration from file + environment.
    pub fn load(config_file: Option<&Path>) -> AppResult<Self> {
        Self::from_figment(Self::figment(config_file))
    }

    pub fn from_figment(figment: Figment) -> AppResult<Self> {
        let config: Config = figment.extract().map_err(|e| AppError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> AppResult<()> {
        if self.rate_limit.max_requests == 0 {
            return Err(AppError::Config("rate_limit.max_requests must be at least 1".to_string()));
        }
        if self.rate_limit.window_secs == 0 {
            return Err(AppError::Config("rate_limit.window_secs must be at least 1".to_string()));
        }
        if self.transcode.audio_bitrate_kbps == 0 {
            return Err(AppError::Config("transcode.audio_bitrate_kbps must be positive".to_string()));
        }
        Ok(())
    }
}
