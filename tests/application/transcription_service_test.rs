use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use murmur::application::ports::{
    AudioNormalizer, JobRepository, NormalizationError, TranscriptionEngine,
};
use murmur::application::services::{
    EnginePool, JobScheduler, SchedulerError, TranscriptionRequest, TranscriptionService,
    TranscriptionServiceError,
};
use murmur::domain::{JobId, JobStatus, TranscriptionOptions};
use murmur::infrastructure::audio::{FfmpegAudioNormalizer, ScaffoldEngine};
use murmur::infrastructure::persistence::InMemoryJobRepository;

use crate::helpers::{
    CountingNormalizer, GatedEngine, SAMPLE_RATE, StallingNormalizer, WavNormalizer, build_wav,
    ffmpeg_available, files_in, scheduler_config, silence, tone,
};

fn service_with(
    normalizer: Arc<dyn AudioNormalizer>,
    engine: Option<Arc<dyn TranscriptionEngine>>,
    queue_capacity: usize,
) -> (TranscriptionService, Arc<InMemoryJobRepository>) {
    let repository = Arc::new(InMemoryJobRepository::new());
    let pool = Arc::new(match engine {
        Some(engine) => EnginePool::with_engine(1, engine),
        None => EnginePool::new(1),
    });
    let scheduler = Arc::new(JobScheduler::new(
        scheduler_config(queue_capacity, Duration::from_secs(10)),
        pool,
        Arc::clone(&repository) as Arc<dyn JobRepository>,
    ));
    let service = TranscriptionService::new(
        normalizer,
        scheduler,
        Arc::clone(&repository) as Arc<dyn JobRepository>,
    );
    (service, repository)
}

fn wav_request(samples: &[i16]) -> TranscriptionRequest {
    TranscriptionRequest {
        file_name: "clip.wav".to_string(),
        data: Bytes::from(build_wav(SAMPLE_RATE, samples)),
        options: TranscriptionOptions::default(),
    }
}

async fn wait_for_status(repository: &InMemoryJobRepository, job_id: JobId, status: JobStatus) {
    for _ in 0..200 {
        if let Some(job) = repository.get_by_id(job_id).await.unwrap() {
            if job.status == status {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} never reached {}", job_id, status);
}

#[tokio::test]
async fn given_wav_upload_when_submitted_then_job_done_with_transcript() {
    let (service, repository) = service_with(
        Arc::new(WavNormalizer),
        Some(Arc::new(ScaffoldEngine::new())),
        2,
    );

    let ticket = service.submit(wav_request(&tone(2.0))).await.unwrap();
    let job_id = ticket.job_id;
    assert_eq!(ticket.duration, 2.0);
    let transcript = ticket.wait().await.unwrap();

    assert_eq!(transcript.segments.len(), 1);
    let job = repository.get_by_id(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(job.file_name, "clip.wav");
}

#[tokio::test]
async fn given_silent_wav_when_submitted_then_empty_transcript() {
    let (service, _repository) = service_with(
        Arc::new(WavNormalizer),
        Some(Arc::new(ScaffoldEngine::new())),
        2,
    );

    let ticket = service.submit(wav_request(&silence(3.0))).await.unwrap();
    let transcript = ticket.wait().await.unwrap();

    assert!(transcript.segments.is_empty());
    assert!(transcript.text.is_empty());
}

#[tokio::test]
async fn given_identical_submissions_when_transcribed_then_same_result_distinct_jobs() {
    let (service, _repository) = service_with(
        Arc::new(WavNormalizer),
        Some(Arc::new(ScaffoldEngine::new().with_window_secs(1.0))),
        2,
    );

    let first = service.submit(wav_request(&tone(3.0))).await.unwrap();
    let first_id = first.job_id;
    let first = first.wait().await.unwrap();
    let second = service.submit(wav_request(&tone(3.0))).await.unwrap();
    let second_id = second.job_id;
    let second = second.wait().await.unwrap();

    assert_eq!(first, second);
    assert_ne!(first_id, second_id);
}

#[tokio::test]
async fn given_text_bytes_when_submitted_then_normalization_error_and_job_failed() {
    let (service, repository) = service_with(
        Arc::new(WavNormalizer),
        Some(Arc::new(ScaffoldEngine::new())),
        2,
    );

    let result = service
        .submit(TranscriptionRequest {
            file_name: "notes.wav".to_string(),
            data: Bytes::from_static(b"just some text"),
            options: TranscriptionOptions::default(),
        })
        .await;

    let error = match result {
        Err(e) => e,
        Ok(_) => panic!("expected a normalization error"),
    };
    let job_id = error.job_id().unwrap();
    assert!(matches!(
        error,
        TranscriptionServiceError::Normalization {
            source: NormalizationError::UnsupportedFormat(_),
            ..
        }
    ));
    let job = repository.get_by_id(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
}

#[tokio::test]
async fn given_engine_not_loaded_when_submitted_then_rejected_without_job() {
    let (service, repository) = service_with(Arc::new(WavNormalizer), None, 2);

    let result = service.submit(wav_request(&tone(1.0))).await;

    assert!(matches!(result, Err(TranscriptionServiceError::EngineNotReady)));
    assert!(repository.is_empty().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn given_busy_engine_and_no_queue_when_submitted_then_overloaded_and_failed() {
    let engine = GatedEngine::new();
    let (service, repository) = service_with(Arc::new(WavNormalizer), Some(engine.clone()), 0);

    let first = service.submit(wav_request(&tone(1.0))).await.unwrap();
    engine.wait_started(1).await;

    let result = service.submit(wav_request(&tone(1.0))).await;
    let error = match result {
        Err(e) => e,
        Ok(_) => panic!("expected overload"),
    };
    let rejected_id = error.job_id().unwrap();
    assert!(matches!(
        error,
        TranscriptionServiceError::Scheduler {
            source: SchedulerError::Overloaded { .. },
            ..
        }
    ));
    let rejected = repository.get_by_id(rejected_id).await.unwrap().unwrap();
    assert_eq!(rejected.status, JobStatus::Failed);

    engine.release();
    assert!(first.wait().await.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn given_running_job_when_ticket_dropped_then_job_cancelled() {
    let engine = GatedEngine::new();
    let (service, repository) = service_with(Arc::new(WavNormalizer), Some(engine.clone()), 0);

    let ticket = service.submit(wav_request(&tone(1.0))).await.unwrap();
    let job_id = ticket.job_id;
    engine.wait_started(1).await;

    drop(ticket);

    wait_for_status(&repository, job_id, JobStatus::Cancelled).await;
    engine.release();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn given_running_job_when_cancelled_through_service_then_wait_reports_cancelled() {
    let engine = GatedEngine::new();
    let (service, _repository) = service_with(Arc::new(WavNormalizer), Some(engine.clone()), 0);

    let ticket = service.submit(wav_request(&tone(1.0))).await.unwrap();
    engine.wait_started(1).await;

    assert!(service.cancel(ticket.job_id));
    let outcome = ticket.wait().await;

    assert!(matches!(outcome, Err(SchedulerError::Cancelled)));
    engine.release();
}

#[tokio::test]
async fn given_ffmpeg_normalizer_when_job_finishes_or_fails_then_temp_dir_is_empty() {
    if !ffmpeg_available() {
        return;
    }

    let temp_dir = tempfile::tempdir().unwrap();
    let normalizer = FfmpegAudioNormalizer::new("ffmpeg", Duration::from_secs(30))
        .with_temp_dir(temp_dir.path());
    let (service, _repository) = service_with(
        Arc::new(normalizer),
        Some(Arc::new(ScaffoldEngine::new())),
        2,
    );

    let ticket = service.submit(wav_request(&tone(1.0))).await.unwrap();
    ticket.wait().await.unwrap();
    assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);

    let failed = service
        .submit(TranscriptionRequest {
            file_name: "notes.wav".to_string(),
            data: Bytes::from_static(b"definitely not audio"),
            options: TranscriptionOptions::default(),
        })
        .await;
    assert!(failed.is_err());
    assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
}

async fn wait_for_single_job(repository: &InMemoryJobRepository, status: JobStatus) -> JobId {
    for _ in 0..200 {
        let jobs = repository.list_by_status(status).await.unwrap();
        if let [job] = jobs.as_slice() {
            return job.id;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("no single job reached {}", status);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn given_saturated_scheduler_when_submissions_arrive_then_rejected_before_decoding() {
    let engine = GatedEngine::new();
    let normalizer = CountingNormalizer::new();
    let (service, repository) = service_with(normalizer.clone(), Some(engine.clone()), 0);

    let first = service.submit(wav_request(&tone(1.0))).await.unwrap();
    engine.wait_started(1).await;

    for _ in 0..5 {
        let result = service.submit(wav_request(&tone(1.0))).await;
        assert!(matches!(
            result,
            Err(TranscriptionServiceError::Scheduler {
                source: SchedulerError::Overloaded { .. },
                ..
            })
        ));
    }

    assert_eq!(normalizer.calls(), 1);
    assert_eq!(repository.list_by_status(JobStatus::Failed).await.unwrap().len(), 5);

    engine.release();
    assert!(first.wait().await.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn given_submission_dropped_while_normalizing_then_staged_file_removed_and_job_cancelled() {
    let temp_dir = tempfile::tempdir().unwrap();
    let normalizer = StallingNormalizer {
        dir: temp_dir.path().to_path_buf(),
    };
    let (service, repository) = service_with(
        Arc::new(normalizer),
        Some(Arc::new(ScaffoldEngine::new())),
        2,
    );

    let submit = service.submit(wav_request(&tone(1.0)));
    let outcome = tokio::time::timeout(Duration::from_millis(200), submit).await;
    assert!(outcome.is_err());

    assert_eq!(files_in(temp_dir.path()), 0);
    let job_id = wait_for_single_job(&repository, JobStatus::Cancelled).await;
    assert_eq!(service.scheduler().stats().normalizing, 0);
    assert!(!service.cancel(job_id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn given_job_cancelled_while_normalizing_then_staged_file_removed_and_job_cancelled() {
    let temp_dir = tempfile::tempdir().unwrap();
    let normalizer = StallingNormalizer {
        dir: temp_dir.path().to_path_buf(),
    };
    let (service, repository) = service_with(
        Arc::new(normalizer),
        Some(Arc::new(ScaffoldEngine::new())),
        2,
    );
    let service = Arc::new(service);

    let submit = tokio::spawn({
        let service = Arc::clone(&service);
        async move { service.submit(wav_request(&tone(1.0))).await }
    });
    let job_id = wait_for_single_job(&repository, JobStatus::Queued).await;
    for _ in 0..200 {
        if files_in(temp_dir.path()) == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(service.cancel(job_id));
    let result = submit.await.unwrap();

    assert!(matches!(
        result,
        Err(TranscriptionServiceError::Scheduler {
            source: SchedulerError::Cancelled,
            ..
        })
    ));
    assert_eq!(files_in(temp_dir.path()), 0);
    wait_for_status(&repository, job_id, JobStatus::Cancelled).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn given_ffmpeg_normalizer_when_submission_dropped_early_then_temp_dir_is_empty() {
    if !ffmpeg_available() {
        return;
    }

    let temp_dir = tempfile::tempdir().unwrap();
    let normalizer = FfmpegAudioNormalizer::new("ffmpeg", Duration::from_secs(30))
        .with_temp_dir(temp_dir.path());
    let (service, repository) = service_with(
        Arc::new(normalizer),
        Some(Arc::new(ScaffoldEngine::new())),
        2,
    );

    let submit = service.submit(wav_request(&tone(30.0)));
    let _ = tokio::time::timeout(Duration::from_millis(5), submit).await;

    // Staging runs on the blocking pool, so an in-flight write finishes before its file is dropped.
    for _ in 0..200 {
        if files_in(temp_dir.path()) == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(files_in(temp_dir.path()), 0);
    let jobs = repository.list_by_status(JobStatus::Running).await.unwrap();
    assert!(jobs.is_empty());
}
