use std::time::Duration;

use crate::application::ports::{TranscriptionEngine, TranscriptionError};
use crate::domain::{
    AudioBuffer, TaskKind, Transcript, TranscriptSegment, TranscriptionOptions, normalize_segments,
};

use super::voice_activity::{DEFAULT_SILENCE_THRESHOLD, rms};

const DEFAULT_WINDOW_SECS: f64 = 5.0;

/// Deterministic stand-in engine used in scaffold mode.
///
/// Emits one segment per fixed window whose energy is above the silence
/// threshold. Needs no model download, which makes the HTTP surface usable
/// before a real model is provisioned.
pub struct ScaffoldEngine {
    window_secs: f64,
    silence_threshold: f32,
    delay: Duration,
}

impl ScaffoldEngine {
    pub fn new() -> Self {
        Self {
            window_secs: DEFAULT_WINDOW_SECS,
            silence_threshold: DEFAULT_SILENCE_THRESHOLD,
            delay: Duration::ZERO,
        }
    }

    pub fn with_window_secs(mut self, window_secs: f64) -> Self {
        self.window_secs = window_secs.max(0.1);
        self
    }

    /// Blocks every call for `delay`, simulating a slow model.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Default for ScaffoldEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscriptionEngine for ScaffoldEngine {
    fn model_name(&self) -> &str {
        "scaffold"
    }

    fn device(&self) -> &str {
        "cpu"
    }

    fn transcribe(
        &self,
        audio: &AudioBuffer,
        options: &TranscriptionOptions,
        on_segment: &mut dyn FnMut(&TranscriptSegment),
    ) -> Result<Transcript, TranscriptionError> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        let window_len = ((self.window_secs * audio.sample_rate() as f64) as usize).max(1);
        let label = match options.task {
            TaskKind::Transcribe => "speech",
            TaskKind::Translate => "translated speech",
        };

        let raw: Vec<TranscriptSegment> = audio
            .samples()
            .chunks(window_len)
            .enumerate()
            .filter_map(|(i, window)| {
                let level = rms(window);
                if level < self.silence_threshold {
                    return None;
                }
                let start = (i * window_len) as f64 / audio.sample_rate() as f64;
                let end = start + window.len() as f64 / audio.sample_rate() as f64;
                Some(
                    TranscriptSegment::new(start, end, format!("[{} {}]", label, i + 1))
                        .with_confidence(level.min(1.0)),
                )
            })
            .collect();

        let segments = normalize_segments(raw, audio.duration());
        for segment in &segments {
            on_segment(segment);
        }

        let language = options.language.clone().or_else(|| Some("en".to_string()));
        Ok(Transcript::new(segments, language))
    }
}
