use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{JobRepository, RepositoryError, TranscriptionError};
use crate::domain::{AudioBuffer, JobId, JobStatus, Transcript, TranscriptSegment, TranscriptionOptions};

use super::engine_pool::{EnginePool, EnginePoolError};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Jobs allowed to wait for a slot. Zero disables queueing.
    pub queue_capacity: usize,
    pub job_timeout: Duration,
    /// Hint returned to clients rejected with `Overloaded`.
    pub retry_after: Duration,
}

#[derive(Debug)]
pub enum JobEvent {
    Segment(TranscriptSegment),
    Finished(Result<Transcript, SchedulerError>),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SchedulerError {
    #[error("server overloaded: {queued} jobs already waiting")]
    Overloaded { queued: usize, retry_after: Duration },
    #[error("job cancelled")]
    Cancelled,
    #[error("job exceeded its {0:?} deadline")]
    DeadlineExceeded(Duration),
    #[error("inference engine is still loading")]
    EngineNotReady,
    /// The engine cannot serve the requested options, e.g. a language it has no token for.
    #[error("{0}")]
    InvalidInput(String),
    #[error("inference failed: {0}")]
    Inference(String),
}

impl From<EnginePoolError> for SchedulerError {
    fn from(e: EnginePoolError) -> Self {
        match e {
            EnginePoolError::NotReady => SchedulerError::EngineNotReady,
            EnginePoolError::Engine(
                e @ (TranscriptionError::UnsupportedLanguage(_)
                | TranscriptionError::UnsupportedTask(_)),
            ) => SchedulerError::InvalidInput(e.to_string()),
            other => SchedulerError::Inference(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStats {
    pub running: usize,
    pub queued: usize,
    /// Jobs holding a reservation while their upload is normalized.
    pub normalizing: usize,
    pub concurrency: usize,
    pub queue_capacity: usize,
}

struct Waiter {
    job_id: JobId,
    grant: oneshot::Sender<SlotGuard>,
}

#[derive(Default)]
struct SchedulerState {
    running: usize,
    reserved: usize,
    waiting: VecDeque<Waiter>,
    cancellations: HashMap<JobId, CancellationToken>,
}

type SharedState = Arc<Mutex<SchedulerState>>;

fn lock(state: &Mutex<SchedulerState>) -> MutexGuard<'_, SchedulerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One of the N running slots. Dropping it passes the slot to the oldest live
/// waiter, or frees it when nobody is waiting.
pub struct SlotGuard {
    state: Option<SharedState>,
}

impl SlotGuard {
    fn new(state: SharedState) -> Self {
        Self { state: Some(state) }
    }

    fn disarm(mut self) {
        self.state = None;
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            release_slot(&state);
        }
    }
}

fn release_slot(state: &SharedState) {
    loop {
        let waiter = {
            let mut st = lock(state);
            match st.waiting.pop_front() {
                Some(w) => w,
                None => {
                    st.running = st.running.saturating_sub(1);
                    return;
                }
            }
        };

        // The slot stays counted in `running` while it is handed over.
        match waiter.grant.send(SlotGuard::new(Arc::clone(state))) {
            Ok(()) => {
                tracing::debug!(job_id = %waiter.job_id, "Slot handed to queued job");
                return;
            }
            Err(slot) => slot.disarm(),
        }
    }
}

/// Capacity held for a job before its audio is ready. Counts against
/// `concurrency + queue_capacity` so that uploads beyond it are rejected before
/// any decoding work. Dropping it gives the capacity back.
pub struct Reservation {
    job_id: JobId,
    cancel: CancellationToken,
    state: SharedState,
    concurrency: usize,
    held: bool,
}

impl Reservation {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Converts the held capacity into a running slot or a queue place.
    pub fn admit(mut self) -> Admission {
        let job_id = self.job_id;
        let cancel = self.cancel.clone();
        let state = Arc::clone(&self.state);
        self.held = false;

        let mut st = lock(&state);
        st.reserved = st.reserved.saturating_sub(1);
        st.waiting.retain(|w| !w.grant.is_closed());

        if st.running < self.concurrency && st.waiting.is_empty() {
            st.running += 1;
            tracing::debug!(job_id = %job_id, running = st.running, "Job admitted to a free slot");
            drop(st);
            return Admission {
                job_id,
                cancel,
                ticket: Ticket::Running(SlotGuard::new(state)),
            };
        }

        let (grant, granted) = oneshot::channel();
        st.waiting.push_back(Waiter { job_id, grant });
        tracing::debug!(job_id = %job_id, queued = st.waiting.len(), "Job queued");
        Admission {
            job_id,
            cancel,
            ticket: Ticket::Queued(granted),
        }
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.held {
            let mut st = lock(&self.state);
            st.reserved = st.reserved.saturating_sub(1);
        }
    }
}

enum Ticket {
    Running(SlotGuard),
    Queued(oneshot::Receiver<SlotGuard>),
}

/// Result of a successful admission: either a slot, or a place in the queue.
pub struct Admission {
    job_id: JobId,
    cancel: CancellationToken,
    ticket: Ticket,
}

impl Admission {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn is_queued(&self) -> bool {
        matches!(self.ticket, Ticket::Queued(_))
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Admission control and FIFO ordering in front of the [`EnginePool`].
pub struct JobScheduler {
    state: SharedState,
    pool: Arc<EnginePool>,
    job_repository: Arc<dyn JobRepository>,
    config: SchedulerConfig,
    concurrency: usize,
}

impl JobScheduler {
    pub fn new(
        config: SchedulerConfig,
        pool: Arc<EnginePool>,
        job_repository: Arc<dyn JobRepository>,
    ) -> Self {
        let concurrency = pool.concurrency();
        Self {
            state: Arc::new(Mutex::new(SchedulerState::default())),
            pool,
            job_repository,
            config,
            concurrency,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.pool.is_ready()
    }

    pub fn pool(&self) -> &Arc<EnginePool> {
        &self.pool
    }

    pub fn stats(&self) -> SchedulerStats {
        let st = lock(&self.state);
        SchedulerStats {
            running: st.running,
            queued: st.waiting.iter().filter(|w| !w.grant.is_closed()).count(),
            normalizing: st.reserved,
            concurrency: self.concurrency,
            queue_capacity: self.config.queue_capacity,
        }
    }

    /// Creates the job's cancellation token before admission so that work done
    /// ahead of the queue (normalization) can observe it too.
    pub fn register(&self, job_id: JobId) -> CancellationToken {
        lock(&self.state)
            .cancellations
            .entry(job_id)
            .or_default()
            .clone()
    }

    /// Requests cancellation. Returns `false` when the job is unknown or finished.
    pub fn cancel(&self, job_id: JobId) -> bool {
        match lock(&self.state).cancellations.get(&job_id) {
            Some(token) => {
                token.cancel();
                tracing::info!(job_id = %job_id, "Cancellation requested");
                true
            }
            None => false,
        }
    }

    pub fn forget(&self, job_id: JobId) {
        lock(&self.state).cancellations.remove(&job_id);
    }

    /// Holds capacity for a job, or rejects it with `Overloaded` when running,
    /// queued and reserved jobs already fill `concurrency + queue_capacity`.
    pub fn reserve(&self, job_id: JobId) -> Result<Reservation, SchedulerError> {
        let mut st = lock(&self.state);
        st.waiting.retain(|w| !w.grant.is_closed());

        let occupied = st.running + st.waiting.len() + st.reserved;
        if occupied >= self.concurrency + self.config.queue_capacity {
            st.cancellations.remove(&job_id);
            let queued = st.waiting.len();
            tracing::warn!(job_id = %job_id, queued = queued, "Rejecting job: scheduler overloaded");
            return Err(SchedulerError::Overloaded {
                queued,
                retry_after: self.config.retry_after,
            });
        }

        st.reserved += 1;
        let cancel = st.cancellations.entry(job_id).or_default().clone();
        Ok(Reservation {
            job_id,
            cancel,
            state: Arc::clone(&self.state),
            concurrency: self.concurrency,
            held: true,
        })
    }

    /// Reserves and admits in one step, for jobs whose audio is already decoded.
    pub fn admit(&self, job_id: JobId) -> Result<Admission, SchedulerError> {
        self.reserve(job_id).map(Reservation::admit)
    }

    /// Drives an admitted job to its terminal state.
    ///
    /// Segments are forwarded as they are decoded, followed by exactly one
    /// `Finished` event. The same outcome is returned.
    pub async fn run(
        &self,
        admission: Admission,
        audio: AudioBuffer,
        options: TranscriptionOptions,
        events: mpsc::UnboundedSender<JobEvent>,
    ) -> Result<Transcript, SchedulerError> {
        let Admission {
            job_id,
            cancel,
            ticket,
        } = admission;

        let slot = match ticket {
            Ticket::Running(slot) => slot,
            Ticket::Queued(granted) => {
                tracing::debug!(job_id = %job_id, "Waiting for a slot");
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        self.withdraw(job_id);
                        return self.finish(job_id, Err(SchedulerError::Cancelled), &events).await;
                    }
                    granted = granted => match granted {
                        Ok(slot) => slot,
                        Err(_) => {
                            return self.finish(job_id, Err(SchedulerError::Cancelled), &events).await;
                        }
                    },
                }
            }
        };

        self.transition(job_id, JobStatus::Running, None).await;
        let outcome = self
            .execute(slot, audio, options, &cancel, &events)
            .await;
        self.finish(job_id, outcome, &events).await
    }

    async fn execute(
        &self,
        slot: SlotGuard,
        audio: AudioBuffer,
        options: TranscriptionOptions,
        cancel: &CancellationToken,
        events: &mpsc::UnboundedSender<JobEvent>,
    ) -> Result<Transcript, SchedulerError> {
        // A worker can still be busy with a call abandoned by an earlier job;
        // the deadline only covers this job's own engine call.
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("Job cancelled while waiting for an engine worker");
                return Err(SchedulerError::Cancelled);
            }
            permit = self.pool.acquire() => permit.map_err(SchedulerError::from)?,
        };

        let (segment_tx, mut segment_rx) = mpsc::unbounded_channel();
        let execution = self.pool.run(permit, audio, options, segment_tx);
        tokio::pin!(execution);
        let deadline = tokio::time::sleep(self.config.job_timeout);
        tokio::pin!(deadline);

        // Abandoning `execution` detaches the blocking call; it finishes on its
        // worker and its result is dropped.
        let outcome = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("Running job cancelled, engine result will be discarded");
                    break Err(SchedulerError::Cancelled);
                }
                _ = &mut deadline => {
                    tracing::warn!(
                        timeout_secs = self.config.job_timeout.as_secs_f64(),
                        "Job deadline exceeded, engine result will be discarded"
                    );
                    break Err(SchedulerError::DeadlineExceeded(self.config.job_timeout));
                }
                Some(segment) = segment_rx.recv() => {
                    let _ = events.send(JobEvent::Segment(segment));
                }
                result = &mut execution => {
                    while let Ok(segment) = segment_rx.try_recv() {
                        let _ = events.send(JobEvent::Segment(segment));
                    }
                    break result.map_err(SchedulerError::from);
                }
            }
        };

        drop(slot);
        outcome
    }

    async fn finish(
        &self,
        job_id: JobId,
        outcome: Result<Transcript, SchedulerError>,
        events: &mpsc::UnboundedSender<JobEvent>,
    ) -> Result<Transcript, SchedulerError> {
        match &outcome {
            Ok(transcript) => {
                if let Err(e) = self.job_repository.complete(job_id, transcript.clone()).await {
                    log_repository_error(job_id, JobStatus::Done, &e);
                }
                tracing::info!(
                    segments = transcript.segments.len(),
                    language = %transcript.language,
                    "Transcription job done"
                );
            }
            Err(SchedulerError::Cancelled) => {
                self.transition(job_id, JobStatus::Cancelled, Some("cancelled by client"))
                    .await;
            }
            Err(e @ SchedulerError::DeadlineExceeded(_)) => {
                self.transition(job_id, JobStatus::Cancelled, Some(&e.to_string()))
                    .await;
            }
            Err(e @ SchedulerError::InvalidInput(_)) => {
                tracing::warn!(error = %e, "Transcription job rejected by the engine");
                self.transition(job_id, JobStatus::Failed, Some(&e.to_string()))
                    .await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Transcription job failed");
                self.transition(job_id, JobStatus::Failed, Some(&e.to_string()))
                    .await;
            }
        }

        self.forget(job_id);
        let _ = events.send(JobEvent::Finished(outcome.clone()));
        outcome
    }

    fn withdraw(&self, job_id: JobId) {
        lock(&self.state).waiting.retain(|w| w.job_id != job_id);
    }

    async fn transition(&self, job_id: JobId, status: JobStatus, error_message: Option<&str>) {
        tracing::debug!(status = %status, "Job status transition");
        if let Err(e) = self
            .job_repository
            .update_status(job_id, status, error_message)
            .await
        {
            log_repository_error(job_id, status, &e);
        }
    }
}

fn log_repository_error(job_id: JobId, status: JobStatus, error: &RepositoryError) {
    match error {
        RepositoryError::InvalidTransition(_) => {
            tracing::debug!(job_id = %job_id, status = %status, error = %error, "Status update skipped")
        }
        _ => {
            tracing::warn!(job_id = %job_id, status = %status, error = %error, "Failed to record job status")
        }
    }
}
