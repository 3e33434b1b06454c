//! In-memory stand-ins for yt-dlp, ffmpeg, Cloudinary and an unreachable Redis
#![allow(dead_code)]

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use reelgrab::conversion::{ConversionError, ConversionResult, Transcoder};
use reelgrab::download::{Extractor, MediaDescriptor};
use reelgrab::storage::uploads::{ObjectStore, ObjectStoreError, ResourceType, StoredObject};
use reelgrab::storage::{KvStore, StoreError, StoreResult};
use reelgrab::AppResult;

/// Returns a fixed list of descriptors and counts calls.
pub struct FakeExtractor {
    descriptors: Vec<MediaDescriptor>,
    calls: AtomicUsize,
}

impl FakeExtractor {
    pub fn returning(url: &str, thumbnail: Option<&str>) -> Self {
        Self::with_descriptors(vec![MediaDescriptor {
            url: Some(url.to_string()),
            thumbnail: thumbnail.map(str::to_string),
        }])
    }

    pub fn with_descriptors(descriptors: Vec<MediaDescriptor>) -> Self {
        Self {
            descriptors,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Extractor for FakeExtractor {
    fn name(&self) -> &str {
        "fake"
    }

    async fn extract(&self, _url: &str) -> AppResult<Vec<MediaDescriptor>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.descriptors.clone())
    }
}

/// Lets a test hold a transcode in progress.
#[derive(Default)]
pub struct TranscodeGate {
    /// Notified once the transcoder is entered
    pub started: Notify,
    /// Lets the held transcode finish
    pub release: Notify,
}

/// Copies the input to the output instead of encoding.
#[derive(Default)]
pub struct FakeTranscoder {
    calls: AtomicUsize,
    bitrates: Mutex<Vec<u32>>,
    fail: bool,
    gate: Option<Arc<TranscodeGate>>,
}

impl FakeTranscoder {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// A transcoder that waits on the returned gate before writing output.
    pub fn gated() -> (Self, Arc<TranscodeGate>) {
        let gate = Arc::new(TranscodeGate::default());
        let transcoder = Self {
            gate: Some(gate.clone()),
            ..Default::default()
        };
        (transcoder, gate)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn bitrates(&self) -> Vec<u32> {
        self.bitrates.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn to_mp3(&self, input: &Path, output: &Path, bitrate_kbps: u32) -> ConversionResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.bitrates.lock().unwrap().push(bitrate_kbps);
        if let Some(gate) = &self.gate {
            gate.started.notify_one();
            gate.release.notified().await;
        }
        if self.fail {
            return Err(ConversionError::FfmpegError("Invalid data found when processing input".to_string()));
        }
        tokio::fs::copy(input, output).await?;
        Ok(())
    }
}

/// Records uploads and deletes; uploads can be made to fail.
#[derive(Default)]
pub struct FakeObjectStore {
    pub fail_uploads: bool,
    uploads: Mutex<Vec<(Vec<u8>, ResourceType)>>,
    deletes: Mutex<Vec<(String, ResourceType)>>,
}

impl FakeObjectStore {
    pub fn failing() -> Self {
        Self {
            fail_uploads: true,
            ..Default::default()
        }
    }

    /// Bytes of every uploaded file, with the resource type used
    pub fn uploads(&self) -> Vec<(Vec<u8>, ResourceType)> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn deletes(&self) -> Vec<(String, ResourceType)> {
        self.deletes.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    fn name(&self) -> &str {
        "fake-cloudinary"
    }

    async fn upload(&self, path: &Path, resource_type: ResourceType) -> Result<StoredObject, ObjectStoreError> {
        if self.fail_uploads {
            return Err(ObjectStoreError::Rejected {
                status: 500,
                message: "upstream exploded".to_string(),
            });
        }
        let bytes = tokio::fs::read(path).await?;
        self.uploads.lock().unwrap().push((bytes, resource_type));
        Ok(StoredObject {
            url: "https://res.cloudinary.com/x/abc123.mp3".to_string(),
            id: "abc123".to_string(),
        })
    }

    async fn delete(&self, id: &str, resource_type: ResourceType) -> Result<(), ObjectStoreError> {
        self.deletes.lock().unwrap().push((id.to_string(), resource_type));
        Ok(())
    }
}

/// A store whose every command fails, as if Redis were down.
pub struct DownStore;

fn refused() -> StoreError {
    StoreError::Redis(redis::RedisError::from((redis::ErrorKind::IoError, "Connection refused")))
}

#[async_trait]
impl KvStore for DownStore {
    fn backend(&self) -> &'static str {
        "down"
    }

    async fn get(&self, _key: &str) -> StoreResult<Option<String>> {
        Err(refused())
    }

    async fn set_ex(&self, _key: &str, _value: &str, _ttl: Duration) -> StoreResult<()> {
        Err(refused())
    }

    async fn incr(&self, _key: &str) -> StoreResult<i64> {
        Err(refused())
    }

    async fn zadd(&self, _key: &str, _member: &str, _score: i64) -> StoreResult<()> {
        Err(refused())
    }

    async fn zrange_due(&self, _key: &str, _max_score: i64, _limit: usize) -> StoreResult<Vec<String>> {
        Err(refused())
    }

    async fn zrem(&self, _key: &str, _member: &str) -> StoreResult<bool> {
        Err(refused())
    }

    async fn ping(&self) -> StoreResult<()> {
        Err(refused())
    }
}
