//! Common test utilities
//!
//! Fakes for the external collaborators plus helpers that drive the router
//! in-process with `tower::ServiceExt::oneshot`.

pub mod fakes;

use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use reelgrab::core::web_server::{build_router, AppState, Services};
use reelgrab::storage::{KvStore, MemoryStore};
use reelgrab::Config;

#[allow(unused_imports)]
pub use fakes::{DownStore, FakeExtractor, FakeObjectStore, FakeTranscoder, TranscodeGate};

/// A router wired to fakes, with handles on every fake.
#[allow(dead_code)]
pub struct TestApp {
    pub router: Router,
    pub config: Config,
    pub services: Services,
    pub store: Arc<MemoryStore>,
    pub extractor: Arc<FakeExtractor>,
    pub transcoder: Arc<FakeTranscoder>,
    pub objects: Arc<FakeObjectStore>,
    pub temp_dir: TempDir,
}

pub fn test_config(temp_dir: &Path) -> Config {
    let mut config = Config::default();
    config.download.temp_dir = temp_dir.to_path_buf();
    config.cors.allowed_origins = vec!["http://localhost:8080".to_string()];
    config
}

#[allow(dead_code)]
impl TestApp {
    pub fn new(extractor: FakeExtractor) -> Self {
        Self::with_parts(extractor, FakeObjectStore::default(), |_| {})
    }

    pub fn with_parts(extractor: FakeExtractor, objects: FakeObjectStore, configure: impl FnOnce(&mut Config)) -> Self {
        Self::assemble(extractor, FakeTranscoder::default(), objects, configure)
    }

    pub fn with_transcoder(extractor: FakeExtractor, transcoder: FakeTranscoder) -> Self {
        Self::assemble(extractor, transcoder, FakeObjectStore::default(), |_| {})
    }

    fn assemble(
        extractor: FakeExtractor,
        transcoder: FakeTranscoder,
        objects: FakeObjectStore,
        configure: impl FnOnce(&mut Config),
    ) -> Self {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let mut config = test_config(temp_dir.path());
        configure(&mut config);

        let store = Arc::new(MemoryStore::new());
        let extractor = Arc::new(extractor);
        let transcoder = Arc::new(transcoder);
        let objects = Arc::new(objects);

        let services = Services {
            store: store.clone(),
            extractor: extractor.clone(),
            transcoder: transcoder.clone(),
            object_store: objects.clone(),
        };
        let state = AppState::new(&config, &services).expect("state");

        Self {
            router: build_router(state),
            config,
            services,
            store,
            extractor,
            transcoder,
            objects,
            temp_dir,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
        send(&self.router, request).await
    }

    /// Files left in the temp directory
    pub fn temp_files(&self) -> usize {
        std::fs::read_dir(self.temp_dir.path()).expect("read temp dir").count()
    }
}

/// Router over `store` with otherwise fake collaborators, for store failures.
#[allow(dead_code)]
pub fn router_over(store: Arc<dyn KvStore>, extractor: Arc<FakeExtractor>) -> Router {
    let config = test_config(&std::env::temp_dir());
    let services = Services {
        store,
        extractor,
        transcoder: Arc::new(FakeTranscoder::default()),
        object_store: Arc::new(FakeObjectStore::default()),
    };
    build_router(AppState::new(&config, &services).expect("state"))
}

/// Sends one request; the body comes back as JSON, or as a JSON string
/// when it is not JSON.
pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let response = router.clone().oneshot(request).await.expect("router is infallible");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, headers, json)
}

#[allow(dead_code)]
pub fn post_download(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/download")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

#[allow(dead_code)]
pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).expect("request")
}
