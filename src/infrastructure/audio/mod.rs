mod candle_whisper_engine;
mod ffmpeg_audio_normalizer;
mod model_lock;
mod scaffold_engine;
mod transcription_engine_factory;
pub mod voice_activity;

pub use candle_whisper_engine::CandleWhisperEngine;
pub use ffmpeg_audio_normalizer::{
    FfmpegAudioNormalizer, check_ffmpeg_binary, classify_ffmpeg_failure,
};
pub use model_lock::lock_model;
pub use scaffold_engine::ScaffoldEngine;
pub use transcription_engine_factory::TranscriptionEngineFactory;
