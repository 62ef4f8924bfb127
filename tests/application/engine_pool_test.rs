use std::sync::Arc;

use tokio::sync::mpsc;

use murmur::application::ports::TranscriptionError;
use murmur::application::services::{EnginePool, EnginePoolError};
use murmur::domain::TranscriptionOptions;
use murmur::infrastructure::audio::ScaffoldEngine;

use crate::helpers::{FailingEngine, GatedEngine, PanickingEngine, tone_buffer};

#[tokio::test]
async fn given_empty_pool_when_executing_then_not_ready() {
    let pool = EnginePool::new(1);
    let (tx, _rx) = mpsc::unbounded_channel();

    let result = pool
        .execute(tone_buffer(1.0), TranscriptionOptions::default(), tx)
        .await;

    assert!(!pool.is_ready());
    assert!(matches!(result, Err(EnginePoolError::NotReady)));
}

#[tokio::test]
async fn given_installed_engine_when_installing_again_then_rejected() {
    let pool = EnginePool::new(1);

    pool.install(Arc::new(ScaffoldEngine::new())).unwrap();
    let second = pool.install(Arc::new(ScaffoldEngine::new()));

    assert!(pool.is_ready());
    assert!(matches!(second, Err(EnginePoolError::AlreadyInstalled)));
    assert_eq!(
        pool.engine_info(),
        Some(("scaffold".to_string(), "cpu".to_string()))
    );
}

#[tokio::test]
async fn given_zero_concurrency_when_creating_pool_then_clamped_to_one() {
    let pool = EnginePool::new(0);

    assert_eq!(pool.concurrency(), 1);
}

#[tokio::test]
async fn given_tone_when_executing_then_streams_each_segment() {
    let pool = EnginePool::with_engine(1, Arc::new(ScaffoldEngine::new().with_window_secs(1.0)));
    let (tx, mut rx) = mpsc::unbounded_channel();

    let transcript = pool
        .execute(tone_buffer(3.0), TranscriptionOptions::default(), tx)
        .await
        .unwrap();

    let mut streamed = Vec::new();
    while let Ok(segment) = rx.try_recv() {
        streamed.push(segment);
    }
    assert_eq!(transcript.segments.len(), 3);
    assert_eq!(streamed, transcript.segments);
}

#[tokio::test]
async fn given_panicking_engine_when_executing_then_inference_failed() {
    let pool = EnginePool::with_engine(1, Arc::new(PanickingEngine));
    let (tx, _rx) = mpsc::unbounded_channel();

    let result = pool
        .execute(tone_buffer(1.0), TranscriptionOptions::default(), tx)
        .await;

    assert!(matches!(
        result,
        Err(EnginePoolError::Engine(TranscriptionError::InferenceFailed(_)))
    ));
    assert_eq!(pool.in_flight(), 0);
}

#[tokio::test]
async fn given_failing_engine_when_executing_then_error_propagates() {
    let pool = EnginePool::with_engine(1, Arc::new(FailingEngine));
    let (tx, _rx) = mpsc::unbounded_channel();

    let result = pool
        .execute(tone_buffer(1.0), TranscriptionOptions::default(), tx)
        .await;

    assert!(matches!(result, Err(EnginePoolError::Engine(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn given_more_calls_than_permits_when_executing_then_in_flight_never_exceeds_concurrency() {
    let engine = GatedEngine::new();
    let pool = Arc::new(EnginePool::with_engine(2, engine.clone()));

    let mut handles = Vec::new();
    for _ in 0..5 {
        let pool = Arc::clone(&pool);
        handles.push(tokio::spawn(async move {
            let (tx, _rx) = mpsc::unbounded_channel();
            pool.execute(tone_buffer(0.5), TranscriptionOptions::default(), tx)
                .await
        }));
    }

    engine.wait_started(2).await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(engine.started(), 2);
    assert_eq!(pool.in_flight(), 2);

    engine.release();
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }
    assert_eq!(engine.max_active(), 2);
    assert_eq!(pool.in_flight(), 0);
}
