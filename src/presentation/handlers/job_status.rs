use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::domain::{Job, JobId};
use crate::presentation::state::AppState;

use super::error::ApiError;
use super::transcribe::SegmentResponse;

#[derive(Debug, Serialize)]
pub struct JobResultResponse {
    pub text: String,
    pub language: String,
    pub segments: Vec<SegmentResponse>,
}

#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub status: String,
    pub file_name: String,
    pub size_bytes: u64,
    pub task: String,
    pub language: Option<String>,
    pub error_message: Option<String>,
    pub result: Option<JobResultResponse>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Job> for JobStatusResponse {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.id.to_string(),
            status: job.status.as_str().to_string(),
            file_name: job.file_name,
            size_bytes: job.size_bytes,
            task: job.options.task.as_str().to_string(),
            language: job.options.language,
            error_message: job.error_message,
            result: job.result.map(|t| JobResultResponse {
                segments: t.segments.iter().map(SegmentResponse::from).collect(),
                text: t.text,
                language: t.language,
            }),
            created_at: job.created_at.to_rfc3339(),
            updated_at: job.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub job_id: String,
    pub status: String,
    pub message: String,
}

fn parse_job_id(raw: &str) -> Result<JobId, ApiError> {
    JobId::parse(raw)
        .ok_or_else(|| ApiError::bad_request("invalid_job_id", format!("Invalid job ID: {}", raw)))
}

async fn fetch_job(state: &AppState, job_id: JobId) -> Result<Job, ApiError> {
    state
        .job_repository
        .get_by_id(job_id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to fetch job: {}", e)))?
        .ok_or_else(|| ApiError::not_found(format!("Job not found: {}", job_id)))
}

#[tracing::instrument(skip(state))]
pub async fn job_status_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Response, ApiError> {
    let job_id = parse_job_id(&job_id)?;
    let job = fetch_job(&state, job_id).await?;
    Ok((StatusCode::OK, Json(JobStatusResponse::from(job))).into_response())
}

/// Requests cancellation of a queued or running job. Cancellation of a running
/// job is best-effort: the engine call finishes in the background and its
/// result is discarded.
#[tracing::instrument(skip(state))]
pub async fn cancel_job_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Response, ApiError> {
    let job_id = parse_job_id(&job_id)?;
    let job = fetch_job(&state, job_id).await?;

    if job.status.is_terminal() {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            "job_finished",
            format!("Job {} is already {}", job_id, job.status),
        ));
    }

    if !state.transcription_service.cancel(job_id) {
        // Finished between the lookup and the cancel request.
        let job = fetch_job(&state, job_id).await?;
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            "job_finished",
            format!("Job {} is already {}", job_id, job.status),
        ));
    }

    tracing::info!(job_id = %job_id, "Job cancellation accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(CancelResponse {
            job_id: job_id.to_string(),
            status: "cancelling".to_string(),
            message: "Cancellation requested".to_string(),
        }),
    )
        .into_response())
}
