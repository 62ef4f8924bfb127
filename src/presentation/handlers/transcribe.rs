use std::convert::Infallible;

use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::multipart::MultipartError;
use axum::extract::{FromRequest, Multipart, Query, Request, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::application::services::{JobEvent, JobTicket, TranscriptionRequest};
use crate::domain::{
    Transcript, TranscriptSegment, TranscriptionOptions, is_accepted_content_type,
    is_supported_extension,
};
use crate::presentation::state::AppState;

use super::error::{ApiError, JOB_ID_HEADER};

const DEFAULT_FILE_NAME: &str = "upload";

/// Options may come as query parameters or as multipart text fields; fields win.
#[derive(Debug, Default, Deserialize)]
pub struct TranscribeParams {
    pub language: Option<String>,
    pub task: Option<String>,
    pub stream: Option<String>,
    pub file_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SegmentResponse {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl From<&TranscriptSegment> for SegmentResponse {
    fn from(segment: &TranscriptSegment) -> Self {
        Self {
            start: round2(segment.start),
            end: round2(segment.end),
            text: segment.text.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TranscribeResponse {
    pub success: bool,
    pub job_id: String,
    pub text: String,
    pub segments: Vec<SegmentResponse>,
    pub language: String,
    pub file_name: String,
    pub duration: f64,
}

#[derive(Debug, Serialize)]
struct StreamSummary {
    done: bool,
    success: bool,
    job_id: String,
    text: String,
    language: String,
    file_name: String,
    duration: f64,
    segment_count: usize,
}

#[derive(Debug, Serialize)]
struct StreamFailure {
    done: bool,
    success: bool,
    job_id: String,
    error: String,
    code: &'static str,
}

struct Upload {
    file_name: Option<String>,
    data: Bytes,
}

#[tracing::instrument(skip(state, params, request))]
pub async fn transcribe_handler(
    State(state): State<AppState>,
    Query(params): Query<TranscribeParams>,
    request: Request,
) -> Result<Response, ApiError> {
    let retry_after = state.settings.scheduler.retry_after();
    if !state.engine_pool.is_ready() {
        return Err(ApiError::engine_not_ready(retry_after));
    }

    let limit = state.settings.upload.max_upload_bytes();
    let mut params = params;
    let upload = if is_multipart(&request) {
        read_multipart(request, &state, limit, &mut params).await?
    } else {
        read_raw_body(request, limit, params.file_name.clone()).await?
    };

    if let Some(name) = &upload.file_name {
        if !is_supported_extension(name) {
            return Err(ApiError::bad_request(
                "unsupported_extension",
                format!("Unsupported file type: {}", name),
            ));
        }
    }
    if upload.data.is_empty() {
        return Err(ApiError::bad_request("empty_file", "Uploaded file is empty"));
    }
    if upload.data.len() > limit {
        return Err(ApiError::payload_too_large(limit));
    }

    let options = TranscriptionOptions::parse(params.language.as_deref(), params.task.as_deref())
        .map_err(|e| ApiError::bad_request("invalid_options", e))?;
    let stream = parse_flag(params.stream.as_deref())?;

    let file_name = upload
        .file_name
        .unwrap_or_else(|| DEFAULT_FILE_NAME.to_string());

    tracing::debug!(
        file_name = %file_name,
        bytes = upload.data.len(),
        task = %options.task,
        language = ?options.language,
        stream,
        "Transcription request accepted"
    );

    let ticket = state
        .transcription_service
        .submit(TranscriptionRequest {
            file_name: file_name.clone(),
            data: upload.data,
            options,
        })
        .await
        .map_err(|e| ApiError::from_service(e, retry_after))?;

    if stream {
        return stream_response(ticket, file_name);
    }

    let job_id = ticket.job_id;
    let duration = ticket.duration;
    let transcript = ticket
        .wait()
        .await
        .map_err(|e| ApiError::from(e).with_job_id(job_id))?;

    let body = TranscribeResponse::new(job_id.to_string(), transcript, file_name, duration);
    Ok((
        StatusCode::OK,
        [(JOB_ID_HEADER, job_id.to_string())],
        Json(body),
    )
        .into_response())
}

impl TranscribeResponse {
    fn new(job_id: String, transcript: Transcript, file_name: String, duration: f64) -> Self {
        Self {
            success: true,
            job_id,
            segments: transcript.segments.iter().map(SegmentResponse::from).collect(),
            text: transcript.text,
            language: transcript.language,
            file_name,
            duration: round2(duration),
        }
    }
}

/// One JSON object per segment as it is decoded, then a summary or error line.
/// Dropping the body (client gone) drops the ticket, which cancels the job.
fn stream_response(mut ticket: JobTicket, file_name: String) -> Result<Response, ApiError> {
    let job_id = ticket.job_id;
    let duration = ticket.duration;

    let lines = async_stream::stream! {
        loop {
            match ticket.next_event().await {
                Some(JobEvent::Segment(segment)) => {
                    yield Ok::<Bytes, Infallible>(ndjson_line(&SegmentResponse::from(&segment)));
                }
                Some(JobEvent::Finished(Ok(transcript))) => {
                    yield Ok(ndjson_line(&StreamSummary {
                        done: true,
                        success: true,
                        job_id: job_id.to_string(),
                        segment_count: transcript.segments.len(),
                        text: transcript.text,
                        language: transcript.language,
                        file_name: file_name.clone(),
                        duration: round2(duration),
                    }));
                    break;
                }
                Some(JobEvent::Finished(Err(e))) => {
                    let error = ApiError::from(e);
                    yield Ok(ndjson_line(&StreamFailure {
                        done: true,
                        success: false,
                        job_id: job_id.to_string(),
                        error: error.message,
                        code: error.code,
                    }));
                    break;
                }
                None => {
                    yield Ok(ndjson_line(&StreamFailure {
                        done: true,
                        success: false,
                        job_id: job_id.to_string(),
                        error: "job ended without a result".to_string(),
                        code: "cancelled",
                    }));
                    break;
                }
            }
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .header(JOB_ID_HEADER, job_id.to_string())
        .body(Body::from_stream(lines))
        .map_err(|e| ApiError::internal(e.to_string()))
}

fn is_multipart(request: &Request) -> bool {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_lowercase().starts_with("multipart/form-data"))
}

async fn read_multipart(
    request: Request,
    state: &AppState,
    limit: usize,
    params: &mut TranscribeParams,
) -> Result<Upload, ApiError> {
    let mut multipart = Multipart::from_request(request, state)
        .await
        .map_err(|e| ApiError::bad_request("invalid_multipart", e.body_text()))?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .filter(|n| !n.trim().is_empty());
                let data = field.bytes().await.map_err(|e| multipart_error(e, limit))?;
                upload = Some(Upload { file_name, data });
            }
            "language" | "task" | "stream" => {
                let value = field.text().await.map_err(|e| multipart_error(e, limit))?;
                let slot = match name.as_str() {
                    "language" => &mut params.language,
                    "task" => &mut params.task,
                    _ => &mut params.stream,
                };
                *slot = Some(value);
            }
            other => tracing::debug!(field = other, "Ignoring unknown multipart field"),
        }
    }

    upload.ok_or_else(|| ApiError::bad_request("missing_file", "Multipart field 'file' is required"))
}

async fn read_raw_body(
    request: Request,
    limit: usize,
    file_name: Option<String>,
) -> Result<Upload, ApiError> {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    if !is_accepted_content_type(&content_type) {
        return Err(ApiError::bad_request(
            "unsupported_media_type",
            format!("Unsupported content type: {}", content_type),
        ));
    }

    let data = axum::body::to_bytes(request.into_body(), limit)
        .await
        .map_err(|_| ApiError::payload_too_large(limit))?;

    Ok(Upload {
        file_name: file_name.filter(|n| !n.trim().is_empty()),
        data,
    })
}

fn multipart_error(error: MultipartError, limit: usize) -> ApiError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::payload_too_large(limit)
    } else {
        ApiError::bad_request("invalid_multipart", error.body_text())
    }
}

fn parse_flag(value: Option<&str>) -> Result<bool, ApiError> {
    match value.map(|v| v.trim().to_lowercase()) {
        None => Ok(false),
        Some(v) => match v.as_str() {
            "" | "false" | "0" | "no" => Ok(false),
            "true" | "1" | "yes" => Ok(true),
            other => Err(ApiError::bad_request(
                "invalid_options",
                format!("Invalid stream flag: {}", other),
            )),
        },
    }
}

fn ndjson_line<T: Serialize>(value: &T) -> Bytes {
    let mut line = serde_json::to_vec(value).unwrap_or_default();
    line.push(b'\n');
    Bytes::from(line)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
