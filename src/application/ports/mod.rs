mod audio_normalizer;
mod job_repository;
mod repository_error;
mod transcription_engine;

pub use audio_normalizer::{AudioNormalizer, NormalizationError};
pub use job_repository::JobRepository;
pub use repository_error::RepositoryError;
pub use transcription_engine::{TranscriptionEngine, TranscriptionError};
