use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use murmur::application::ports::{AudioNormalizer, JobRepository};
use murmur::application::services::{EnginePool, JobScheduler, RetentionSweeper};
use murmur::domain::JobStatus;
use murmur::infrastructure::audio::{
    FfmpegAudioNormalizer, TranscriptionEngineFactory, check_ffmpeg_binary,
};
use murmur::infrastructure::observability::{TracingConfig, init_tracing};
use murmur::infrastructure::persistence::InMemoryJobRepository;
use murmur::presentation::{AppState, Environment, ScaffoldConfig, Settings, create_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let environment = Environment::from_env().map_err(anyhow::Error::msg)?;
    let settings = Settings::load(environment).context("Failed to load configuration")?;

    init_tracing(&TracingConfig::from_settings(environment, &settings.logging));

    let scaffold_config = ScaffoldConfig::from_env();
    if scaffold_config.enabled {
        tracing::warn!("Scaffold mode enabled: transcripts are synthetic");
    }

    let ffmpeg_version = match check_ffmpeg_binary(&settings.normalizer.ffmpeg_path) {
        Ok(version) => {
            tracing::info!(version = %version, "ffmpeg found");
            Some(version)
        }
        Err(e) => {
            tracing::warn!(error = %e, "ffmpeg unavailable; uploads will fail to normalize");
            None
        }
    };

    let mut normalizer =
        FfmpegAudioNormalizer::new(&settings.normalizer.ffmpeg_path, settings.normalizer.timeout());
    if let Some(dir) = &settings.normalizer.temp_dir {
        normalizer = normalizer.with_temp_dir(dir);
    }
    let normalizer: Arc<dyn AudioNormalizer> = Arc::new(normalizer);

    let job_repository: Arc<dyn JobRepository> = Arc::new(InMemoryJobRepository::new());
    let engine_pool = Arc::new(EnginePool::new(settings.engine.concurrency));

    let state = AppState::new(
        settings.clone(),
        scaffold_config.clone(),
        normalizer,
        Arc::clone(&job_repository),
        Arc::clone(&engine_pool),
    )
    .with_ffmpeg_version(ffmpeg_version);

    let shutdown = CancellationToken::new();

    let retention = settings.scheduler.retention();
    let sweep_interval = (retention / 4).clamp(Duration::from_secs(1), Duration::from_secs(60));
    tokio::spawn(
        RetentionSweeper::new(Arc::clone(&job_repository), retention, sweep_interval)
            .run(shutdown.clone()),
    );

    // The server answers /health and /ready while the model loads.
    let engine_settings = settings.engine.clone();
    let loading_pool = Arc::clone(&engine_pool);
    tokio::spawn(async move {
        let loaded = tokio::task::spawn_blocking(move || {
            TranscriptionEngineFactory::create(&engine_settings, &scaffold_config)
        })
        .await;

        match loaded {
            Ok(Ok(engine)) => {
                if let Err(e) = loading_pool.install(engine) {
                    tracing::error!(error = %e, "Failed to install transcription engine");
                }
            }
            Ok(Err(e)) => tracing::error!(error = %e, "Failed to load transcription engine"),
            Err(e) => tracing::error!(error = %e, "Engine loader task panicked"),
        }
    });

    let scheduler = Arc::clone(&state.scheduler);
    let router = create_router(state);

    let host: std::net::IpAddr = settings
        .server
        .host
        .parse()
        .with_context(|| format!("Invalid server.host: {}", settings.server.host))?;
    let addr = SocketAddr::from((host, settings.server.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!(
        address = %addr,
        environment = %environment,
        model = %settings.engine.model,
        concurrency = settings.engine.concurrency,
        queue_capacity = settings.scheduler.queue_capacity,
        "Listening"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    cancel_unfinished_jobs(&scheduler, job_repository.as_ref()).await;
    tracing::info!("Server stopped");
    Ok(())
}

/// Jobs still queued or running when the listener closes are cancelled so that
/// their records end in a terminal state.
async fn cancel_unfinished_jobs(scheduler: &JobScheduler, repository: &dyn JobRepository) {
    let mut cancelled = 0;
    for status in [JobStatus::Queued, JobStatus::Running] {
        match repository.list_by_status(status).await {
            Ok(jobs) => {
                cancelled += jobs.iter().filter(|job| scheduler.cancel(job.id)).count();
            }
            Err(e) => tracing::warn!(status = %status, error = %e, "Failed to list unfinished jobs"),
        }
    }
    if cancelled > 0 {
        tracing::info!(cancelled, "Cancelled unfinished jobs on shutdown");
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = shutdown.cancelled() => {},
    }

    tracing::info!("Shutdown signal received, draining connections");
    shutdown.cancel();
}
