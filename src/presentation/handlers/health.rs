use axum::Json;
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::presentation::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub ready: bool,
    pub model: String,
    pub device: String,
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub model: String,
    pub device: String,
    pub ffmpeg: Option<String>,
    pub running: usize,
    pub queued: usize,
    pub normalizing: usize,
    pub concurrency: usize,
    pub queue_capacity: usize,
}

/// Liveness. Always 200 while the process serves requests.
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let (model, device) = state.model_info();
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            ready: state.engine_pool.is_ready(),
            model,
            device,
        }),
    )
}

/// Readiness. 503 until the engine is installed in the pool.
pub async fn readiness_handler(State(state): State<AppState>) -> Response {
    let ready = state.engine_pool.is_ready();
    let (model, device) = state.model_info();
    let stats = state.scheduler.stats();

    let body = ReadinessResponse {
        ready,
        model,
        device,
        ffmpeg: state.ffmpeg_version.clone(),
        running: stats.running,
        queued: stats.queued,
        normalizing: stats.normalizing,
        concurrency: stats.concurrency,
        queue_capacity: stats.queue_capacity,
    };

    if ready {
        return (StatusCode::OK, Json(body)).into_response();
    }

    let mut response = (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response();
    let retry_after = state.settings.scheduler.retry_after_secs.max(1);
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
    response
}
