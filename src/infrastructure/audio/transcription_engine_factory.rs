use std::sync::Arc;

use crate::application::ports::{TranscriptionEngine, TranscriptionError};
use crate::presentation::config::{EngineProvider, EngineSettings, ScaffoldConfig};

use super::candle_whisper_engine::CandleWhisperEngine;
use super::scaffold_engine::ScaffoldEngine;

pub struct TranscriptionEngineFactory;

impl TranscriptionEngineFactory {
    /// Builds the configured engine. Scaffold mode overrides the provider.
    ///
    /// Loading a local model downloads weights and is slow; call this from a
    /// blocking context.
    pub fn create(
        settings: &EngineSettings,
        scaffold: &ScaffoldConfig,
    ) -> Result<Arc<dyn TranscriptionEngine>, TranscriptionError> {
        let provider = if scaffold.enabled {
            EngineProvider::Scaffold
        } else {
            settings.provider
        };

        match provider {
            EngineProvider::Local => {
                tracing::info!(model = %settings.model, device = ?settings.device, "Loading local Whisper model");
                let engine = CandleWhisperEngine::new(&settings.model, settings.device)?;
                Ok(Arc::new(engine))
            }
            EngineProvider::Scaffold => {
                tracing::info!(
                    delay_ms = scaffold.mock_response_delay_ms,
                    "Using scaffold transcription engine"
                );
                let engine = ScaffoldEngine::new()
                    .with_delay(scaffold.response_delay());
                Ok(Arc::new(engine))
            }
        }
    }
}
