use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use murmur::application::ports::JobRepository;
use murmur::application::services::RetentionSweeper;
use murmur::domain::{Job, JobStatus, TranscriptionOptions};
use murmur::infrastructure::persistence::InMemoryJobRepository;

async fn job_with_status(repository: &InMemoryJobRepository, status: JobStatus) -> Job {
    let job = Job::new("clip.wav".to_string(), 10, TranscriptionOptions::default());
    repository.create(&job).await.unwrap();
    if status != JobStatus::Queued {
        repository
            .update_status(job.id, status, None)
            .await
            .unwrap();
    }
    job
}

#[tokio::test]
async fn given_expired_terminal_job_when_sweeping_then_evicted() {
    let repository = Arc::new(InMemoryJobRepository::new());
    let finished = job_with_status(&repository, JobStatus::Failed).await;
    let pending = job_with_status(&repository, JobStatus::Queued).await;
    let sweeper = RetentionSweeper::new(
        Arc::clone(&repository) as Arc<dyn JobRepository>,
        Duration::ZERO,
        Duration::from_secs(60),
    );
    tokio::time::sleep(Duration::from_millis(5)).await;

    let evicted = sweeper.sweep().await.unwrap();

    assert_eq!(evicted, 1);
    assert!(repository.get_by_id(finished.id).await.unwrap().is_none());
    assert!(repository.get_by_id(pending.id).await.unwrap().is_some());
}

#[tokio::test]
async fn given_recent_terminal_job_when_sweeping_then_kept() {
    let repository = Arc::new(InMemoryJobRepository::new());
    let job = job_with_status(&repository, JobStatus::Cancelled).await;
    let sweeper = RetentionSweeper::new(
        Arc::clone(&repository) as Arc<dyn JobRepository>,
        Duration::from_secs(3600),
        Duration::from_secs(60),
    );

    let evicted = sweeper.sweep().await.unwrap();

    assert_eq!(evicted, 0);
    assert!(repository.get_by_id(job.id).await.unwrap().is_some());
}

#[tokio::test]
async fn given_running_sweeper_when_shutdown_then_stops_after_evicting() {
    let repository = Arc::new(InMemoryJobRepository::new());
    job_with_status(&repository, JobStatus::Failed).await;
    let shutdown = CancellationToken::new();
    let sweeper = RetentionSweeper::new(
        Arc::clone(&repository) as Arc<dyn JobRepository>,
        Duration::ZERO,
        Duration::from_millis(20),
    );
    tokio::time::sleep(Duration::from_millis(5)).await;

    let handle = tokio::spawn(sweeper.run(shutdown.clone()));
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.cancel();

    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(repository.is_empty().await);
}
