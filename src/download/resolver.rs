//! Request resolution: cache lookup, extraction, and the audio pipeline.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::extractor::{first_media, Extractor, ResolvedSource};
use super::fetch::download_to_file;
use crate::conversion::Transcoder;
use crate::core::config::Config;
use crate::core::error::{AppError, AppResult};
use crate::core::metrics;
use crate::core::types::MediaFormat;
use crate::core::validation::ValidatedRequest;
use crate::storage::uploads::{ObjectStore, ResourceType, StoredObject};
use crate::storage::{CacheEntry, CleanupScheduler, ResolutionCache};

/// Body of a successful `POST /api/download`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedMedia {
    pub format: MediaFormat,
    pub url: String,
    pub thumbnail: Option<String>,
}

impl ResolvedMedia {
    fn from_entry(format: MediaFormat, entry: CacheEntry) -> Self {
        Self {
            format,
            url: entry.media_url,
            thumbnail: entry.thumbnail_url,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub video_ttl: Duration,
    pub audio_ttl: Duration,
    pub audio_bitrate_kbps: u32,
    pub temp_dir: PathBuf,
    pub resource_type: ResourceType,
}

impl ResolverSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            video_ttl: config.cache.video_ttl(),
            audio_ttl: config.cache.audio_ttl(),
            audio_bitrate_kbps: config.transcode.audio_bitrate_kbps,
            temp_dir: config.download.temp_dir.clone(),
            resource_type: config.cloudinary.resource_type,
        }
    }

    fn ttl_for(&self, format: MediaFormat) -> Duration {
        match format {
            MediaFormat::Mp4 => self.video_ttl,
            MediaFormat::Mp3 => self.audio_ttl,
        }
    }
}

/// Turns a validated request into a media URL.
///
/// All collaborators are injected so the whole flow runs against fakes in tests.
#[derive(Clone)]
pub struct Resolver {
    cache: ResolutionCache,
    extractor: Arc<dyn Extractor>,
    transcoder: Arc<dyn Transcoder>,
    object_store: Arc<dyn ObjectStore>,
    cleanup: CleanupScheduler,
    http: reqwest::Client,
    settings: ResolverSettings,
}

impl Resolver {
    pub fn new(
        cache: ResolutionCache,
        extractor: Arc<dyn Extractor>,
        transcoder: Arc<dyn Transcoder>,
        object_store: Arc<dyn ObjectStore>,
        cleanup: CleanupScheduler,
        http: reqwest::Client,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            cache,
            extractor,
            transcoder,
            object_store,
            cleanup,
            http,
            settings,
        }
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    /// Serves from cache when possible, otherwise resolves and caches.
    ///
    /// Two concurrent misses for the same key both resolve; the later cache
    /// write wins.
    pub async fn resolve(&self, request: &ValidatedRequest) -> AppResult<ResolvedMedia> {
        let format = request.format;

        if let Some(entry) = self.cache.lookup(&request.url, format).await? {
            log::info!("Serving {} from cache", request.url);
            metrics::record_cache_lookup(format.as_str(), true);
            return Ok(ResolvedMedia::from_entry(format, entry));
        }
        metrics::record_cache_lookup(format.as_str(), false);

        let timer = metrics::RESOLUTION_DURATION_SECONDS
            .with_label_values(&[format.as_str()])
            .start_timer();
        let result = match format {
            MediaFormat::Mp4 => self.resolve_video(&request.url).await,
            MediaFormat::Mp3 => self.resolve_audio_detached(&request.url).await,
        };
        timer.observe_duration();

        match result {
            Ok(entry) => Ok(ResolvedMedia::from_entry(format, entry)),
            Err(e) => {
                metrics::record_resolution_failure(format.as_str(), e.category());
                Err(e)
            }
        }
    }

    async fn extract(&self, url: &str) -> AppResult<ResolvedSource> {
        let descriptors = self.extractor.extract(url).await?;
        first_media(descriptors)
    }

    /// mp4: the direct link is the answer.
    async fn resolve_video(&self, url: &str) -> AppResult<CacheEntry> {
        let source = self.extract(url).await?;
        let entry = CacheEntry {
            media_url: source.media_url,
            thumbnail_url: source.thumbnail_url,
            storage_id: None,
        };
        self.cache
            .remember(url, MediaFormat::Mp4, &entry, self.settings.ttl_for(MediaFormat::Mp4))
            .await?;
        Ok(entry)
    }

    /// Runs the audio pipeline on its own task. Once started it reaches the
    /// scheduled deletion even if the request that started it is dropped.
    async fn resolve_audio_detached(&self, url: &str) -> AppResult<CacheEntry> {
        let resolver = self.clone();
        let url = url.to_string();
        tokio::spawn(async move { resolver.resolve_audio(&url).await })
            .await
            .map_err(|e| {
                log::error!("Audio pipeline task failed: {}", e);
                AppError::from(e)
            })?
    }

    /// mp3: download, transcode, upload, then schedule the upload's deletion.
    async fn resolve_audio(&self, url: &str) -> AppResult<CacheEntry> {
        let source = self.extract(url).await?;

        fs_err::tokio::create_dir_all(&self.settings.temp_dir).await?;
        let id = Uuid::new_v4();
        let temp = TempFiles::new(vec![
            self.settings.temp_dir.join(format!("{}.mp4", id)),
            self.settings.temp_dir.join(format!("{}.mp3", id)),
        ]);

        let uploaded = self.produce_audio(&source, &temp.paths[0], &temp.paths[1]).await;
        drop(temp);
        let stored = uploaded?;

        let entry = CacheEntry {
            media_url: stored.url,
            thumbnail_url: source.thumbnail_url,
            storage_id: Some(stored.id.clone()),
        };
        let cached = self
            .cache
            .remember(url, MediaFormat::Mp3, &entry, self.settings.ttl_for(MediaFormat::Mp3))
            .await;

        // The object exists whether or not the cache write worked
        if let Err(e) = self.cleanup.schedule(&stored.id).await {
            log::error!("Failed to schedule deletion of {}: {}", stored.id, e);
        }

        cached?;
        Ok(entry)
    }

    async fn produce_audio(
        &self,
        source: &ResolvedSource,
        video_path: &Path,
        audio_path: &Path,
    ) -> AppResult<StoredObject> {
        download_to_file(&self.http, &source.media_url, video_path).await?;
        self.transcoder
            .to_mp3(video_path, audio_path, self.settings.audio_bitrate_kbps)
            .await?;
        let stored = self
            .object_store
            .upload(audio_path, self.settings.resource_type)
            .await
            .map_err(|e| {
                log::error!("Upload to {} failed: {}", self.object_store.name(), e);
                AppError::UploadFailed(e)
            })?;
        log::info!("Uploaded audio to {} as {}", self.object_store.name(), stored.id);
        Ok(stored)
    }
}

/// Temp files of one request, removed when the guard drops.
///
/// Missing files are fine: a step may fail before writing its output.
struct TempFiles {
    paths: Vec<PathBuf>,
}

impl TempFiles {
    fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }
}

impl Drop for TempFiles {
    fn drop(&mut self) {
        for path in &self.paths {
            match fs_err::remove_file(path) {
                Ok(()) => log::debug!("Removed temp file {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => log::warn!("Failed to remove temp file: {}", e),
            }
        }
    }
}
