//! Edit session lifecycle integration tests.
//!
//! These tests drive complete sessions through the public API:
//! - Upload → merge → trim with the mock backend
//! - The embedded backend before and after initialization
//! - Cancellation and cleanup on reset

use std::sync::Arc;
use std::time::Duration;

use clipforge_core::{
    testing::{fixtures, MockBackend, MockEngine},
    EditSession, EmbeddedBackend, ErrorKind, ProcessingBackend, SessionError, Stage, UploadConfig,
};

#[tokio::test]
async fn test_merge_then_trim() {
    let backend = Arc::new(MockBackend::new());
    let session = EditSession::new(Arc::clone(&backend));

    session
        .upload(vec![fixtures::clip("a.mp4", 100), fixtures::clip("b.mp4", 50)])
        .unwrap();
    let merged = session.settled().await;
    assert_eq!(merged.stage, Stage::Merged);
    assert!(merged.working_handle.unwrap().preview_path().is_ok());

    session.report_duration(15.0).unwrap();
    session.set_trim_range(2.0, 8.0).unwrap();
    session.trim().unwrap();
    let trimmed = session.settled().await;

    assert_eq!(trimmed.stage, Stage::Trimmed);
    let output = trimmed.output_handle.unwrap();
    assert_eq!(output.duration_secs(), Some(6.0));
    assert_eq!(backend.merge_count().await, 1);
    assert_eq!(backend.trim_count().await, 1);

    let ranges = backend.recorded_ranges().await;
    assert_eq!((ranges[0].start(), ranges[0].end()), (2.0, 8.0));
}

#[tokio::test]
async fn test_ten_plus_five_second_clips() {
    let backend = Arc::new(MockBackend::new());
    let session = EditSession::new(Arc::clone(&backend));

    session
        .upload(vec![fixtures::clip("ten.mp4", 1000), fixtures::clip("five.mp4", 500)])
        .unwrap();
    assert_eq!(session.settled().await.stage, Stage::Merged);
    session.report_duration(15.0).unwrap();

    let err = session.set_trim_range(12.0, 20.0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRange);
    assert!(session.snapshot().trim_range.is_none());

    session.set_trim_range(2.0, 8.0).unwrap();
    assert!(session.snapshot().last_error.is_none());
    session.trim().unwrap();

    let snapshot = session.settled().await;
    assert_eq!(snapshot.stage, Stage::Trimmed);
    let clip = snapshot.output_handle.unwrap();
    assert!((clip.duration_secs().unwrap() - 6.0).abs() < 0.05);
}

#[tokio::test]
async fn test_embedded_backend_not_ready_until_initialized() {
    let backend = Arc::new(EmbeddedBackend::with_engine(MockEngine::new()));
    let session = EditSession::new(Arc::clone(&backend));

    session
        .upload(vec![fixtures::clip("a.mp4", 8), fixtures::clip("b.mp4", 8)])
        .unwrap();
    let snapshot = session.settled().await;
    assert_eq!(snapshot.stage, Stage::Idle);
    assert_eq!(snapshot.last_error, Some(SessionError::BackendNotReady));
    assert_eq!(backend.engine().concat_count(), 0);

    backend.initialize().await.unwrap();
    session.retry_upload().unwrap();
    let snapshot = session.settled().await;
    assert_eq!(snapshot.stage, Stage::Merged);
    assert_eq!(backend.engine().concat_count(), 1);
}

#[tokio::test]
async fn test_embedded_trim_after_reported_duration() {
    let engine = MockEngine::new();
    engine.set_duration("merged.mp4", 15.0);
    let backend = Arc::new(EmbeddedBackend::with_engine(engine));
    backend.initialize().await.unwrap();
    let session = EditSession::new(Arc::clone(&backend));

    session
        .upload(vec![fixtures::clip("a.mp4", 8), fixtures::clip("b.mp4", 8)])
        .unwrap();
    session.settled().await;
    session.report_duration(15.0).unwrap();
    session.set_trim_range(1.0, 4.0).unwrap();
    session.trim().unwrap();

    let snapshot = session.settled().await;
    assert_eq!(snapshot.stage, Stage::Trimmed);
    assert_eq!(backend.engine().cut_count(), 1);
    assert_eq!(snapshot.output_handle.unwrap().duration_secs(), Some(3.0));
}

#[tokio::test]
async fn test_embedded_rejects_range_beyond_probed_duration() {
    let engine = MockEngine::new();
    engine.set_duration("merged.mp4", 10.0);
    let backend = Arc::new(EmbeddedBackend::with_engine(engine));
    backend.initialize().await.unwrap();
    let session = EditSession::new(Arc::clone(&backend));

    session.upload(vec![fixtures::clip("a.mp4", 8)]).unwrap();
    session.settled().await;
    // The player reports a longer duration than the container really has
    session.report_duration(20.0).unwrap();
    session.set_trim_range(5.0, 18.0).unwrap();
    session.trim().unwrap();

    let snapshot = session.settled().await;
    assert_eq!(snapshot.stage, Stage::Merged);
    assert!(snapshot.output_handle.is_none());
    assert_eq!(
        snapshot.last_error.map(|e| e.kind()),
        Some(ErrorKind::InvalidRange)
    );
    assert_eq!(backend.engine().cut_count(), 0);
}

#[tokio::test]
async fn test_upload_limits_are_enforced() {
    let backend = Arc::new(MockBackend::new());
    let limits = UploadConfig {
        max_files: 2,
        max_file_bytes: 64,
    };
    let session = EditSession::with_limits(Arc::clone(&backend), limits);

    let err = session
        .upload(vec![
            fixtures::clip("a.mp4", 8),
            fixtures::clip("b.mp4", 8),
            fixtures::clip("c.mp4", 8),
        ])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedMedia);

    let err = session.upload(vec![fixtures::clip("big.mp4", 65)]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedMedia);
    assert_eq!(backend.merge_count().await, 0);
    assert_eq!(session.stage(), Stage::Idle);
}

#[tokio::test]
async fn test_reset_during_slow_merge() {
    let backend = Arc::new(MockBackend::new());
    backend.set_delay(Duration::from_millis(200)).await;
    let session = EditSession::new(Arc::clone(&backend));

    session.upload(vec![fixtures::clip("a.mp4", 8)]).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(session.stage(), Stage::Merging);

    session.reset();
    assert_eq!(session.stage(), Stage::Idle);

    tokio::time::sleep(Duration::from_millis(300)).await;
    let snapshot = session.snapshot();
    assert_eq!(snapshot.stage, Stage::Idle);
    assert!(snapshot.working_handle.is_none());
    assert_eq!(backend.cancelled_count().await, 1);

    // The session is usable again
    backend.set_delay(Duration::ZERO).await;
    session.upload(vec![fixtures::clip("b.mp4", 8)]).unwrap();
    assert_eq!(session.settled().await.stage, Stage::Merged);
}

#[tokio::test]
async fn test_dyn_backend_session() {
    let backend: Arc<dyn ProcessingBackend> = Arc::new(MockBackend::new());
    let session: EditSession = EditSession::new(backend);

    session.upload(vec![fixtures::clip("a.mp4", 8)]).unwrap();
    let snapshot = session.settled().await;
    assert_eq!(snapshot.stage, Stage::Merged);
    assert_eq!(session.backend().name(), "mock");
}
