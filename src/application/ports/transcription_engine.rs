use crate::domain::{AudioBuffer, Transcript, TranscriptSegment, TranscriptionOptions};

/// Synchronous speech-to-text engine.
///
/// Implementations are not required to be reentrant; callers bound concurrency
/// through [`crate::application::services::EnginePool`]. `on_segment` is called
/// once per segment, in temporal order, as soon as the segment is decoded.
pub trait TranscriptionEngine: Send + Sync {
    fn model_name(&self) -> &str;

    fn device(&self) -> &str;

    fn transcribe(
        &self,
        audio: &AudioBuffer,
        options: &TranscriptionOptions,
        on_segment: &mut dyn FnMut(&TranscriptSegment),
    ) -> Result<Transcript, TranscriptionError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TranscriptionError {
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("model loading failed: {0}")]
    ModelLoadFailed(String),
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),
    #[error("unsupported task: {0}")]
    UnsupportedTask(String),
}
