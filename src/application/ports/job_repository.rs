use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{Job, JobId, JobStatus, Transcript};

use super::RepositoryError;

#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn create(&self, job: &Job) -> Result<(), RepositoryError>;

    async fn get_by_id(&self, id: JobId) -> Result<Option<Job>, RepositoryError>;

    /// Fails with `InvalidTransition` when the job is already terminal or the
    /// move is not part of the job state machine.
    async fn update_status(
        &self,
        id: JobId,
        status: JobStatus,
        error_message: Option<&str>,
    ) -> Result<(), RepositoryError>;

    /// Moves a running job to `Done` and stores its transcript.
    async fn complete(&self, id: JobId, transcript: Transcript) -> Result<(), RepositoryError>;

    async fn list_by_status(&self, status: JobStatus) -> Result<Vec<Job>, RepositoryError>;

    /// Removes terminal jobs last updated before `cutoff`. Returns how many were removed.
    async fn evict_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<usize, RepositoryError>;
}
