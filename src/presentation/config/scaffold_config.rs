use std::time::Duration;

/// Scaffold mode swaps the Whisper model for the deterministic scaffold
/// engine, so the service runs without downloading weights.
#[derive(Debug, Clone, Default)]
pub struct ScaffoldConfig {
    pub enabled: bool,
    /// Artificial latency added to every scaffold transcription.
    pub mock_response_delay_ms: u64,
}

impl ScaffoldConfig {
    /// Reads `SCAFFOLD_MODE` and `MOCK_RESPONSE_DELAY`.
    pub fn from_env() -> Self {
        Self {
            enabled: std::env::var("SCAFFOLD_MODE")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(false),
            mock_response_delay_ms: std::env::var("MOCK_RESPONSE_DELAY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
        }
    }

    pub fn response_delay(&self) -> Duration {
        Duration::from_millis(self.mock_response_delay_ms)
    }
}
