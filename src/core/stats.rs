//! Request counting and the stats endpoint

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

use crate::core::error::AppResult;
use crate::core::web_server::AppState;

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_requests: i64,
}

/// Counts every request that reaches the resolution endpoint.
///
/// Runs after the rate limiter, so rejected requests are not counted. If the
/// counter cannot be written the request is not served.
pub async fn count_requests(State(state): State<AppState>, request: Request, next: Next) -> Response {
    match state.counter.increment().await {
        Ok(total) => {
            log::info!("Total requests: {}", total);
            next.run(request).await
        }
        Err(e) => {
            log::error!("Failed to increment request counter: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Internal server error" })),
            )
                .into_response()
        }
    }
}

/// GET /api/stats
pub async fn stats_handler(State(state): State<AppState>) -> AppResult<Json<StatsResponse>> {
    let total_requests = state.counter.current().await?;
    Ok(Json(StatsResponse { total_requests }))
}
