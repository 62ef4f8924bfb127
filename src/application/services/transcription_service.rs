use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::DropGuard;
use tracing::Instrument;

use crate::application::ports::{AudioNormalizer, JobRepository, NormalizationError, RepositoryError};
use crate::domain::{Job, JobId, JobStatus, Transcript, TranscriptionOptions};

use super::job_scheduler::{JobEvent, JobScheduler, SchedulerError};

pub struct TranscriptionRequest {
    pub file_name: String,
    pub data: Bytes,
    pub options: TranscriptionOptions,
}

/// Handle on a submitted job. Dropping it before the job finishes cancels the job.
pub struct JobTicket {
    pub job_id: JobId,
    /// Duration of the normalized audio in seconds.
    pub duration: f64,
    events: mpsc::UnboundedReceiver<JobEvent>,
    _cancel_on_drop: DropGuard,
}

impl JobTicket {
    pub async fn next_event(&mut self) -> Option<JobEvent> {
        self.events.recv().await
    }

    /// Waits for the terminal outcome, skipping streamed segments.
    pub async fn wait(mut self) -> Result<Transcript, SchedulerError> {
        while let Some(event) = self.events.recv().await {
            if let JobEvent::Finished(outcome) = event {
                return outcome;
            }
        }
        Err(SchedulerError::Cancelled)
    }
}

/// Runs one upload through normalization and hands it to the scheduler.
pub struct TranscriptionService {
    normalizer: Arc<dyn AudioNormalizer>,
    scheduler: Arc<JobScheduler>,
    job_repository: Arc<dyn JobRepository>,
}

impl TranscriptionService {
    pub fn new(
        normalizer: Arc<dyn AudioNormalizer>,
        scheduler: Arc<JobScheduler>,
        job_repository: Arc<dyn JobRepository>,
    ) -> Self {
        Self {
            normalizer,
            scheduler,
            job_repository,
        }
    }

    pub fn scheduler(&self) -> &Arc<JobScheduler> {
        &self.scheduler
    }

    pub async fn submit(
        &self,
        request: TranscriptionRequest,
    ) -> Result<JobTicket, TranscriptionServiceError> {
        if !self.scheduler.is_ready() {
            return Err(TranscriptionServiceError::EngineNotReady);
        }

        let TranscriptionRequest {
            file_name,
            data,
            options,
        } = request;

        let job = Job::new(file_name, data.len() as u64, options.clone());
        let job_id = job.id;
        self.job_repository
            .create(&job)
            .await
            .map_err(TranscriptionServiceError::Repository)?;

        let span = tracing::info_span!(
            "transcription_job",
            job_id = %job_id,
            file_name = %job.file_name,
            task = %options.task,
        );

        let cancel = self.scheduler.register(job_id);
        let mut pending = PendingJob::new(job_id, Arc::clone(&self.job_repository), Arc::clone(&self.scheduler));

        // Capacity is claimed before decoding so a saturated scheduler never
        // stages or transcodes uploads it will reject.
        let reservation = match self.scheduler.reserve(job_id) {
            Ok(reservation) => reservation,
            Err(e) => {
                pending.settle(JobStatus::Failed, &e.to_string()).await;
                return Err(TranscriptionServiceError::Scheduler { job_id, source: e });
            }
        };

        let normalized = tokio::select! {
            result = self.normalizer.normalize(data).instrument(span.clone()) => result,
            _ = cancel.cancelled() => {
                drop(reservation);
                pending.settle(JobStatus::Cancelled, "cancelled by client").await;
                return Err(TranscriptionServiceError::Scheduler {
                    job_id,
                    source: SchedulerError::Cancelled,
                });
            }
        };

        let audio = match normalized {
            Ok(audio) => audio,
            Err(e) => {
                drop(reservation);
                span.in_scope(|| tracing::warn!(error = %e, "Audio normalization failed"));
                pending.settle(JobStatus::Failed, &e.to_string()).await;
                return Err(TranscriptionServiceError::Normalization { job_id, source: e });
            }
        };

        let admission = reservation.admit();
        pending.disarm();

        let duration = audio.duration();
        span.in_scope(|| {
            tracing::info!(
                duration_secs = duration,
                queued = admission.is_queued(),
                "Audio normalized, job admitted"
            )
        });

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let scheduler = Arc::clone(&self.scheduler);
        tokio::spawn(
            async move {
                let _ = scheduler.run(admission, audio, options, events_tx).await;
            }
            .instrument(span),
        );

        Ok(JobTicket {
            job_id,
            duration,
            events: events_rx,
            _cancel_on_drop: cancel.drop_guard(),
        })
    }

    pub fn cancel(&self, job_id: JobId) -> bool {
        self.scheduler.cancel(job_id)
    }
}

/// A job that exists in the repository but has not reached the scheduler yet.
/// If the submitting future is dropped (client went away), the job is still
/// settled as cancelled.
struct PendingJob {
    job_id: JobId,
    repository: Option<Arc<dyn JobRepository>>,
    scheduler: Arc<JobScheduler>,
}

impl PendingJob {
    fn new(job_id: JobId, repository: Arc<dyn JobRepository>, scheduler: Arc<JobScheduler>) -> Self {
        Self {
            job_id,
            repository: Some(repository),
            scheduler,
        }
    }

    async fn settle(&mut self, status: JobStatus, message: &str) {
        self.scheduler.forget(self.job_id);
        if let Some(repository) = self.repository.take() {
            if let Err(e) = repository
                .update_status(self.job_id, status, Some(message))
                .await
            {
                tracing::warn!(job_id = %self.job_id, error = %e, "Failed to record job status");
            }
        }
    }

    fn disarm(&mut self) {
        self.repository = None;
    }
}

impl Drop for PendingJob {
    fn drop(&mut self) {
        let Some(repository) = self.repository.take() else {
            return;
        };
        self.scheduler.forget(self.job_id);
        let job_id = self.job_id;
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let _ = repository
                    .update_status(job_id, JobStatus::Cancelled, Some("client disconnected"))
                    .await;
            });
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TranscriptionServiceError {
    #[error("inference engine is still loading")]
    EngineNotReady,
    #[error("normalization: {source}")]
    Normalization {
        job_id: JobId,
        #[source]
        source: NormalizationError,
    },
    #[error("{source}")]
    Scheduler {
        job_id: JobId,
        #[source]
        source: SchedulerError,
    },
    #[error("repository: {0}")]
    Repository(RepositoryError),
}

impl TranscriptionServiceError {
    /// The job the failure was recorded against, if one was created.
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            Self::Normalization { job_id, .. } | Self::Scheduler { job_id, .. } => Some(*job_id),
            Self::EngineNotReady | Self::Repository(_) => None,
        }
    }
}
