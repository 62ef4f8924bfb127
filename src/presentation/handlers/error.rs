use std::time::Duration;

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::ports::NormalizationError;
use crate::application::services::{SchedulerError, TranscriptionServiceError};
use crate::domain::JobId;

pub const JOB_ID_HEADER: &str = "x-job-id";

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: &'static str,
}

/// An error response: status, machine-readable code and message, plus the
/// optional `Retry-After` and `x-job-id` headers.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub retry_after: Option<Duration>,
    pub job_id: Option<JobId>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            retry_after: None,
            job_id: None,
        }
    }

    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn payload_too_large(limit_bytes: usize) -> Self {
        Self::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            "payload_too_large",
            format!("Upload exceeds the {} byte limit", limit_bytes),
        )
    }

    pub fn engine_not_ready(retry_after: Duration) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "engine_not_ready",
            "Inference engine is still loading",
        )
        .with_retry_after(retry_after)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    pub fn with_job_id(mut self, job_id: JobId) -> Self {
        self.job_id = Some(job_id);
        self
    }

    /// Maps a service failure. `retry_after` is used when the engine is not
    /// loaded yet; overload carries its own hint.
    pub fn from_service(error: TranscriptionServiceError, retry_after: Duration) -> Self {
        let job_id = error.job_id();
        let api_error = match error {
            TranscriptionServiceError::EngineNotReady => Self::engine_not_ready(retry_after),
            TranscriptionServiceError::Normalization { source, .. } => source.into(),
            TranscriptionServiceError::Scheduler { source, .. } => source.into(),
            TranscriptionServiceError::Repository(e) => Self::internal(e.to_string()),
        };
        match job_id {
            Some(id) => api_error.with_job_id(id),
            None => api_error,
        }
    }
}

impl From<NormalizationError> for ApiError {
    fn from(error: NormalizationError) -> Self {
        let message = error.to_string();
        match error {
            NormalizationError::UnsupportedFormat(_) => {
                Self::bad_request("unsupported_format", message)
            }
            NormalizationError::CorruptInput(_) => Self::bad_request("corrupt_input", message),
            NormalizationError::EmptyAudio => Self::bad_request("empty_audio", message),
            NormalizationError::Timeout(_) => {
                Self::new(StatusCode::GATEWAY_TIMEOUT, "normalization_timeout", message)
            }
            NormalizationError::ToolUnavailable(_) => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "normalizer_unavailable", message)
            }
            NormalizationError::Io(_) => Self::internal(message),
        }
    }
}

impl From<SchedulerError> for ApiError {
    fn from(error: SchedulerError) -> Self {
        let message = error.to_string();
        match error {
            SchedulerError::Overloaded { retry_after, .. } => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "overloaded", message)
                    .with_retry_after(retry_after)
            }
            SchedulerError::EngineNotReady => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "engine_not_ready",
                message,
            ),
            SchedulerError::Cancelled => Self::new(StatusCode::CONFLICT, "cancelled", message),
            SchedulerError::InvalidInput(_) => Self::bad_request("unsupported_option", message),
            SchedulerError::DeadlineExceeded(_) => {
                Self::new(StatusCode::GATEWAY_TIMEOUT, "deadline_exceeded", message)
            }
            SchedulerError::Inference(_) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "inference_error", message)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::warn!(status = %self.status, code = self.code, error = %self.message, "Request failed");
        } else {
            tracing::debug!(status = %self.status, code = self.code, error = %self.message, "Request rejected");
        }

        let body = ErrorResponse {
            success: false,
            error: self.message,
            code: self.code,
        };
        let mut response = (self.status, Json(body)).into_response();

        let headers = response.headers_mut();
        if let Some(retry_after) = self.retry_after {
            let secs = retry_after.as_secs_f64().ceil().max(1.0) as u64;
            headers.insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        if let Some(job_id) = self.job_id {
            if let Ok(value) = HeaderValue::from_str(&job_id.to_string()) {
                headers.insert(JOB_ID_HEADER, value);
            }
        }

        response
    }
}
