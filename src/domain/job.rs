use chrono::{DateTime, Utc};

use super::{JobId, JobStatus, Transcript, TranscriptionOptions};

/// A single transcription submission and its lifecycle record.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub file_name: String,
    pub size_bytes: u64,
    pub options: TranscriptionOptions,
    pub status: JobStatus,
    pub result: Option<Transcript>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(file_name: String, size_bytes: u64, options: TranscriptionOptions) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            file_name,
            size_bytes,
            options,
            status: JobStatus::Queued,
            result: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}
