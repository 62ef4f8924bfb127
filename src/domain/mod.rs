mod audio_buffer;
mod job;
mod job_id;
mod job_status;
mod media_type;
mod transcript;
mod transcription_options;

pub use audio_buffer::{AudioBuffer, CANONICAL_SAMPLE_RATE};
pub use job::Job;
pub use job_id::JobId;
pub use job_status::JobStatus;
pub use media_type::{
    SUPPORTED_EXTENSIONS, file_extension, is_accepted_content_type, is_supported_extension,
};
pub use transcript::{Transcript, TranscriptSegment, normalize_segments};
pub use transcription_options::{SUPPORTED_LANGUAGES, TaskKind, TranscriptionOptions};
