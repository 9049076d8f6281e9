//! Mock processing backend for testing.

use async_trait::async_trait;
use bytes::BytesMut;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};

use crate::backend::ProcessingBackend;
use crate::error::{Result, SessionError};
use crate::media::MediaHandle;
use crate::validation::TrimRange;

/// Mock implementation of the ProcessingBackend trait.
///
/// Provides controllable behavior for testing:
/// - Records merge inputs and trim ranges for assertions
/// - Fails the next call with a configured error
/// - Holds calls open until resumed, to observe in-flight state
/// - Counts calls dropped before completing
///
/// Merging concatenates payloads. Trimming keeps the payload and annotates the
/// output with the range length.
#[derive(Debug)]
pub struct MockBackend {
    merges: Arc<RwLock<Vec<Vec<MediaHandle>>>>,
    trims: Arc<RwLock<Vec<TrimRange>>>,
    /// If set, the next call will fail with this error.
    next_error: Arc<RwLock<Option<SessionError>>>,
    /// Simulated processing time in milliseconds.
    delay_ms: Arc<RwLock<u64>>,
    /// `true` while calls may proceed.
    gate: watch::Sender<bool>,
    cancelled: Arc<AtomicUsize>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Create a new mock backend.
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            merges: Arc::new(RwLock::new(Vec::new())),
            trims: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
            delay_ms: Arc::new(RwLock::new(0)),
            gate,
            cancelled: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of merge calls received.
    pub async fn merge_count(&self) -> usize {
        self.merges.read().await.len()
    }

    /// Number of trim calls received.
    pub async fn trim_count(&self) -> usize {
        self.trims.read().await.len()
    }

    /// Inputs of the most recent merge call.
    pub async fn merged_inputs(&self) -> Vec<MediaHandle> {
        self.merges.read().await.last().cloned().unwrap_or_default()
    }

    /// Ranges of every trim call, in order.
    pub async fn recorded_ranges(&self) -> Vec<TrimRange> {
        self.trims.read().await.clone()
    }

    /// Number of calls dropped before they completed.
    pub async fn cancelled_count(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Configure the next call to fail with the given error.
    pub async fn set_next_error(&self, error: SessionError) {
        *self.next_error.write().await = Some(error);
    }

    /// Set the simulated processing time.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay_ms.write().await = delay.as_millis() as u64;
    }

    /// Hold new and pending calls until [`resume`](Self::resume).
    pub async fn pause(&self) {
        self.gate.send_replace(false);
    }

    pub async fn resume(&self) {
        self.gate.send_replace(true);
    }

    /// Waits for the gate and the configured delay, then takes any pending error.
    async fn simulate_work(&self) -> Result<()> {
        let mut guard = CancelGuard::new(Arc::clone(&self.cancelled));

        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        let delay_ms = *self.delay_ms.read().await;
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        guard.disarm();

        match self.next_error.write().await.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Counts a call as cancelled if dropped while armed.
struct CancelGuard {
    counter: Arc<AtomicUsize>,
    armed: bool,
}

impl CancelGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        Self {
            counter,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if self.armed {
            self.counter.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl ProcessingBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn merge(&self, handles: &[MediaHandle]) -> Result<MediaHandle> {
        self.merges.write().await.push(handles.to_vec());
        self.simulate_work().await?;

        let first = handles.first().ok_or(SessionError::EmptyInput)?;
        let mut joined = BytesMut::new();
        for handle in handles {
            joined.extend_from_slice(&handle.require_bytes()?);
        }
        Ok(MediaHandle::new(
            format!("merged.{}", first.extension()),
            first.mime_type(),
            joined.freeze(),
        ))
    }

    async fn trim(&self, handle: &MediaHandle, range: TrimRange) -> Result<MediaHandle> {
        self.trims.write().await.push(range);
        self.simulate_work().await?;

        if handle.duration_secs().is_some() {
            range.fits(handle.duration_secs())?;
        }
        Ok(MediaHandle::new(
            format!("trimmed.{}", handle.extension()),
            handle.mime_type(),
            handle.require_bytes()?,
        )
        .with_duration(range.len_secs()))
    }
}
