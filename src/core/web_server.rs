//! HTTP API.
//!
//! Routes:
//! - `POST /api/download` resolves an Instagram URL (rate limited, counted)
//! - `GET /api/stats` returns the request counter
//! - `GET /health` liveness plus store reachability
//! - `GET /metrics` Prometheus exposition

use axum::extract::rejection::JsonRejection;
use axum::extract::{MatchedPath, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::conversion::{FfmpegTranscoder, Transcoder};
use crate::core::access::{enforce_origin, rate_limit, OriginPolicy};
use crate::core::config::Config;
use crate::core::error::{AppError, AppResult};
use crate::core::metrics;
use crate::core::rate_limiter::RateLimiter;
use crate::core::stats::{count_requests, stats_handler};
use crate::core::validation::{validate_download_request, DownloadBody, ValidationError};
use crate::download::{Extractor, ResolvedMedia, Resolver, ResolverSettings, YtDlpExtractor};
use crate::storage::uploads::{CloudinaryStore, ObjectStore};
use crate::storage::{self, CleanupScheduler, CleanupWorker, KvStore, RequestCounter, ResolutionCache};

/// External collaborators. Built once in `main`, replaced by fakes in tests.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn KvStore>,
    pub extractor: Arc<dyn Extractor>,
    pub transcoder: Arc<dyn Transcoder>,
    pub object_store: Arc<dyn ObjectStore>,
}

impl Services {
    pub async fn from_config(config: &Config) -> AppResult<Self> {
        let store = storage::connect(config.store.redis_url.as_deref()).await?;
        if !config.cloudinary.is_configured() {
            log::warn!("Cloudinary credentials missing; mp3 requests will fail");
        }

        Ok(Self {
            store,
            extractor: Arc::new(YtDlpExtractor::from_config(&config.extractor)),
            transcoder: Arc::new(FfmpegTranscoder::from_config(&config.transcode)),
            object_store: Arc::new(CloudinaryStore::new(&config.cloudinary)?),
        })
    }

    /// Background worker running the deferred deletions.
    pub fn cleanup_worker(&self, config: &Config) -> CleanupWorker {
        CleanupWorker::new(
            self.store.clone(),
            self.object_store.clone(),
            config.cloudinary.resource_type,
            config.cleanup.poll_interval(),
            config.cleanup.batch_size,
        )
    }
}

/// Shared state handed to every handler and middleware.
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<Resolver>,
    pub counter: RequestCounter,
    pub rate_limiter: RateLimiter,
    pub origins: OriginPolicy,
    pub store: Arc<dyn KvStore>,
    pub trust_forwarded_for: bool,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: &Config, services: &Services) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("reelgrab/", env!("CARGO_PKG_VERSION")))
            .timeout(config.download.timeout())
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let resolver = Resolver::new(
            ResolutionCache::new(services.store.clone()),
            services.extractor.clone(),
            services.transcoder.clone(),
            services.object_store.clone(),
            CleanupScheduler::new(services.store.clone(), config.cleanup.delay()),
            http,
            ResolverSettings::from_config(config),
        );

        Ok(Self {
            resolver: Arc::new(resolver),
            counter: RequestCounter::new(services.store.clone()),
            rate_limiter: RateLimiter::new(config.rate_limit.window(), config.rate_limit.max_requests),
            origins: OriginPolicy::new(config.cors.allowed_origins.iter().cloned()),
            store: services.store.clone(),
            trust_forwarded_for: config.rate_limit.trust_forwarded_for,
            start_time: Instant::now(),
        })
    }
}

/// Builds the router.
///
/// Layer order on `/api/download`, outermost first: origin check, CORS,
/// rate limit, request counter, handler.
pub fn build_router(state: AppState) -> Router {
    let download = Router::new()
        .route("/api/download", post(download_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), count_requests))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit));

    Router::new()
        .merge(download)
        .route("/api/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route_layer(middleware::from_fn(track_requests))
        .layer(state.origins.cors_layer())
        .layer(middleware::from_fn_with_state(state.clone(), enforce_origin))
        .with_state(state)
}

/// Serves until `shutdown` is cancelled.
pub async fn serve(addr: SocketAddr, state: AppState, shutdown: CancellationToken) -> anyhow::Result<()> {
    let app = build_router(state);

    log::info!("Starting web server on http://{}", addr);
    log::info!("  POST /api/download - Resolve an Instagram URL");
    log::info!("  GET  /api/stats    - Request counter");
    log::info!("  GET  /health       - Health check");
    log::info!("  GET  /metrics      - Prometheus metrics");

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    log::info!("Web server stopped");
    Ok(())
}

/// POST /api/download
async fn download_handler(
    State(state): State<AppState>,
    body: Result<Json<DownloadBody>, JsonRejection>,
) -> AppResult<Json<ResolvedMedia>> {
    // An unreadable body carries neither field
    let Json(body) = body.map_err(|rejection| {
        log::debug!("Rejected download body: {}", rejection.body_text());
        AppError::from(ValidationError::MissingFields)
    })?;

    let request = validate_download_request(&body)?;
    log::info!("Resolving {} as {}", request.url, request.format);

    let media = state.resolver.resolve(&request).await?;
    Ok(Json(media))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let store_status = match state.store.ping().await {
        Ok(()) => "ok",
        Err(e) => {
            log::warn!("Health check: store unreachable: {}", e);
            "unavailable"
        }
    };

    let status = if store_status == "ok" { "healthy" } else { "degraded" };

    Json(serde_json::json!({
        "status": status,
        "service": "reelgrab",
        "version": env!("CARGO_PKG_VERSION"),
        "store": {
            "backend": state.store.backend(),
            "status": store_status,
        },
        "uptime_seconds": state.start_time.elapsed().as_secs(),
    }))
}

/// GET /metrics
async fn metrics_handler() -> Response {
    match metrics::render() {
        Ok(body) => ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response(),
        Err(e) => {
            log::error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to encode metrics: {}", e)).into_response()
        }
    }
}

async fn track_requests(request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;
    metrics::record_request(&route, response.status().as_u16());
    response
}
