mod engine_pool;
mod job_scheduler;
mod retention_sweeper;
mod transcription_service;

pub use engine_pool::{EnginePermit, EnginePool, EnginePoolError};
pub use job_scheduler::{
    Admission, JobEvent, JobScheduler, Reservation, SchedulerConfig, SchedulerError,
    SchedulerStats,
};
pub use retention_sweeper::RetentionSweeper;
pub use transcription_service::{
    JobTicket, TranscriptionRequest, TranscriptionService, TranscriptionServiceError,
};
