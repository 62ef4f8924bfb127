use std::sync::{Arc, OnceLock};

use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};

use crate::application::ports::{TranscriptionEngine, TranscriptionError};
use crate::domain::{AudioBuffer, Transcript, TranscriptSegment, TranscriptionOptions};

/// Bounded worker pool that owns the loaded engine.
///
/// Calls run on the blocking thread pool. The semaphore permit travels into the
/// blocking closure, so an abandoned call keeps its permit until the engine
/// returns and no more than `concurrency` calls are ever in flight.
pub struct EnginePool {
    engine: OnceLock<Arc<dyn TranscriptionEngine>>,
    permits: Arc<Semaphore>,
    concurrency: usize,
}

impl EnginePool {
    pub fn new(concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            engine: OnceLock::new(),
            permits: Arc::new(Semaphore::new(concurrency)),
            concurrency,
        }
    }

    pub fn with_engine(concurrency: usize, engine: Arc<dyn TranscriptionEngine>) -> Self {
        let pool = Self::new(concurrency);
        let _ = pool.engine.set(engine);
        pool
    }

    /// Hands the loaded engine to the pool. Only the first install wins.
    pub fn install(&self, engine: Arc<dyn TranscriptionEngine>) -> Result<(), EnginePoolError> {
        let model = engine.model_name().to_string();
        self.engine
            .set(engine)
            .map_err(|_| EnginePoolError::AlreadyInstalled)?;
        tracing::info!(model = %model, concurrency = self.concurrency, "Engine installed");
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.engine.get().is_some()
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Number of engine calls currently executing, including abandoned ones.
    pub fn in_flight(&self) -> usize {
        self.concurrency - self.permits.available_permits()
    }

    /// Model name and device of the installed engine.
    pub fn engine_info(&self) -> Option<(String, String)> {
        self.engine
            .get()
            .map(|e| (e.model_name().to_string(), e.device().to_string()))
    }

    /// Waits for a free worker. The permit is held until the engine call it is
    /// spent on returns, even if the caller stops waiting for that call.
    pub async fn acquire(&self) -> Result<EnginePermit, EnginePoolError> {
        let engine = self
            .engine
            .get()
            .cloned()
            .ok_or(EnginePoolError::NotReady)?;

        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| EnginePoolError::Closed)?;

        Ok(EnginePermit { engine, permit })
    }

    /// Runs one engine call on the blocking pool, forwarding segments as they decode.
    pub async fn run(
        &self,
        permit: EnginePermit,
        audio: AudioBuffer,
        options: TranscriptionOptions,
        segments: mpsc::UnboundedSender<TranscriptSegment>,
    ) -> Result<Transcript, EnginePoolError> {
        let EnginePermit { engine, permit } = permit;

        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            engine.transcribe(&audio, &options, &mut |segment: &TranscriptSegment| {
                let _ = segments.send(segment.clone());
            })
        });

        match handle.await {
            Ok(result) => result.map_err(EnginePoolError::Engine),
            Err(e) if e.is_panic() => {
                tracing::error!("Engine panicked during inference");
                Err(EnginePoolError::Engine(TranscriptionError::InferenceFailed(
                    "engine panicked".to_string(),
                )))
            }
            Err(e) => Err(EnginePoolError::Engine(TranscriptionError::InferenceFailed(
                e.to_string(),
            ))),
        }
    }

    pub async fn execute(
        &self,
        audio: AudioBuffer,
        options: TranscriptionOptions,
        segments: mpsc::UnboundedSender<TranscriptSegment>,
    ) -> Result<Transcript, EnginePoolError> {
        let permit = self.acquire().await?;
        self.run(permit, audio, options, segments).await
    }
}

/// A reserved worker together with the engine it will call.
pub struct EnginePermit {
    engine: Arc<dyn TranscriptionEngine>,
    permit: OwnedSemaphorePermit,
}

#[derive(Debug, thiserror::Error)]
pub enum EnginePoolError {
    #[error("inference engine is still loading")]
    NotReady,
    #[error("inference engine already installed")]
    AlreadyInstalled,
    #[error("engine pool closed")]
    Closed,
    #[error(transparent)]
    Engine(TranscriptionError),
}
