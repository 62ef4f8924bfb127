use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::AudioBuffer;

/// Decodes arbitrary audio/video containers into canonical 16 kHz mono PCM.
#[async_trait]
pub trait AudioNormalizer: Send + Sync {
    async fn normalize(&self, data: Bytes) -> Result<AudioBuffer, NormalizationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NormalizationError {
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),
    #[error("corrupt audio input: {0}")]
    CorruptInput(String),
    #[error("decoded audio stream is empty")]
    EmptyAudio,
    #[error("audio normalization timed out after {0:?}")]
    Timeout(Duration),
    #[error("transcoding tool unavailable: {0}")]
    ToolUnavailable(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
