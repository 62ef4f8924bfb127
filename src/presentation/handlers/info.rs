use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use serde::Serialize;

use crate::presentation::state::AppState;

const ENDPOINTS: [&str; 7] = [
    "GET /",
    "GET /health",
    "GET /ready",
    "GET /models",
    "POST /transcribe",
    "GET /jobs/{job_id}",
    "DELETE /jobs/{job_id}",
];

#[derive(Serialize)]
pub struct ServiceInfoResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub model: String,
    pub device: String,
    pub ready: bool,
    pub endpoints: Vec<&'static str>,
}

pub async fn info_handler(State(state): State<AppState>) -> impl IntoResponse {
    let (model, device) = state.model_info();
    Json(ServiceInfoResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        model,
        device,
        ready: state.engine_pool.is_ready(),
        endpoints: ENDPOINTS.to_vec(),
    })
}
