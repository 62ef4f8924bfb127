use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use serde::Serialize;

use crate::domain::{SUPPORTED_EXTENSIONS, SUPPORTED_LANGUAGES, TaskKind};
use crate::presentation::state::AppState;

#[derive(Serialize)]
pub struct ModelsResponse {
    pub model: String,
    pub device: String,
    pub ready: bool,
    pub concurrency: usize,
    pub languages: Vec<&'static str>,
    pub tasks: Vec<&'static str>,
    pub extensions: Vec<&'static str>,
}

pub async fn models_handler(State(state): State<AppState>) -> impl IntoResponse {
    let (model, device) = state.model_info();
    Json(ModelsResponse {
        model,
        device,
        ready: state.engine_pool.is_ready(),
        concurrency: state.engine_pool.concurrency(),
        languages: SUPPORTED_LANGUAGES.to_vec(),
        tasks: vec![TaskKind::Transcribe.as_str(), TaskKind::Translate.as_str()],
        extensions: SUPPORTED_EXTENSIONS.to_vec(),
    })
}
