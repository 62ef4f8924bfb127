use std::sync::Arc;

use crate::application::ports::{AudioNormalizer, JobRepository};
use crate::application::services::{
    EnginePool, JobScheduler, SchedulerConfig, TranscriptionService,
};
use crate::presentation::config::{ScaffoldConfig, Settings};

#[derive(Clone)]
pub struct AppState {
    pub transcription_service: Arc<TranscriptionService>,
    pub scheduler: Arc<JobScheduler>,
    pub engine_pool: Arc<EnginePool>,
    pub job_repository: Arc<dyn JobRepository>,
    pub settings: Settings,
    pub scaffold_config: ScaffoldConfig,
    /// First line of `ffmpeg -version`, when the binary was found at startup.
    pub ffmpeg_version: Option<String>,
}

impl AppState {
    /// Wires the scheduler and service over an engine pool that may still be
    /// waiting for its engine.
    pub fn new(
        settings: Settings,
        scaffold_config: ScaffoldConfig,
        normalizer: Arc<dyn AudioNormalizer>,
        job_repository: Arc<dyn JobRepository>,
        engine_pool: Arc<EnginePool>,
    ) -> Self {
        let scheduler = Arc::new(JobScheduler::new(
            SchedulerConfig {
                queue_capacity: settings.scheduler.queue_capacity,
                job_timeout: settings.scheduler.job_timeout(),
                retry_after: settings.scheduler.retry_after(),
            },
            Arc::clone(&engine_pool),
            Arc::clone(&job_repository),
        ));

        let transcription_service = Arc::new(TranscriptionService::new(
            normalizer,
            Arc::clone(&scheduler),
            Arc::clone(&job_repository),
        ));

        Self {
            transcription_service,
            scheduler,
            engine_pool,
            job_repository,
            settings,
            scaffold_config,
            ffmpeg_version: None,
        }
    }

    /// Model and device of the loaded engine, or the configured ones while loading.
    pub fn model_info(&self) -> (String, String) {
        self.engine_pool.engine_info().unwrap_or_else(|| {
            let model = if self.scaffold_config.enabled {
                "scaffold".to_string()
            } else {
                self.settings.engine.model.clone()
            };
            let device = format!("{:?}", self.settings.engine.device).to_lowercase();
            (model, device)
        })
    }

    pub fn with_ffmpeg_version(mut self, version: Option<String>) -> Self {
        self.ffmpeg_version = version;
        self
    }
}
