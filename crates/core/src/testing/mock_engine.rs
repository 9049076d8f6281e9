//! Mock embedded engine for testing.

use async_trait::async_trait;
use bytes::BytesMut;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

use crate::backend::Engine;
use crate::error::{Result, SessionError};
use crate::media::MediaHandle;
use crate::validation::TrimRange;

/// Duration reported for media without a configured or annotated one.
const DEFAULT_DURATION_SECS: f64 = 10.0;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock implementation of the Engine trait.
///
/// Loading can be held open to test concurrent initialization. Probes answer
/// from configured durations keyed by file name.
#[derive(Debug)]
pub struct MockEngine {
    /// `true` while loads may complete.
    gate: watch::Sender<bool>,
    next_load_error: Mutex<Option<SessionError>>,
    durations: Mutex<HashMap<String, f64>>,
    undecodable: Mutex<HashSet<String>>,
    loads: AtomicUsize,
    concats: AtomicUsize,
    cuts: AtomicUsize,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            gate,
            next_load_error: Mutex::new(None),
            durations: Mutex::new(HashMap::new()),
            undecodable: Mutex::new(HashSet::new()),
            loads: AtomicUsize::new(0),
            concats: AtomicUsize::new(0),
            cuts: AtomicUsize::new(0),
        }
    }

    /// Keep loads pending until [`open_load`](Self::open_load).
    pub fn hold_load(&self) {
        self.gate.send_replace(false);
    }

    pub fn open_load(&self) {
        self.gate.send_replace(true);
    }

    /// Fail the next load with the given error.
    pub fn fail_next_load(&self, error: SessionError) {
        *lock(&self.next_load_error) = Some(error);
    }

    /// Probe `file_name` as `secs` long.
    pub fn set_duration(&self, file_name: &str, secs: f64) {
        lock(&self.durations).insert(file_name.to_string(), secs);
    }

    /// Probe `file_name` as undecodable.
    pub fn mark_undecodable(&self, file_name: &str) {
        lock(&self.undecodable).insert(file_name.to_string());
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn concat_count(&self) -> usize {
        self.concats.load(Ordering::SeqCst)
    }

    pub fn cut_count(&self) -> usize {
        self.cuts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Engine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn load(&self) -> Result<()> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        match lock(&self.next_load_error).take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn probe(&self, media: &MediaHandle) -> Result<f64> {
        if lock(&self.undecodable).contains(media.file_name()) {
            return Err(SessionError::unsupported(format!(
                "{}: Invalid data found when processing input",
                media.file_name()
            )));
        }
        let configured = lock(&self.durations).get(media.file_name()).copied();
        Ok(configured
            .or(media.duration_secs())
            .unwrap_or(DEFAULT_DURATION_SECS))
    }

    async fn concat(&self, inputs: &[MediaHandle]) -> Result<MediaHandle> {
        self.concats.fetch_add(1, Ordering::SeqCst);
        let first = inputs.first().ok_or(SessionError::EmptyInput)?;
        let mut joined = BytesMut::new();
        for input in inputs {
            joined.extend_from_slice(&input.require_bytes()?);
        }
        Ok(MediaHandle::new(
            format!("merged.{}", first.extension()),
            first.mime_type(),
            joined.freeze(),
        ))
    }

    async fn cut(&self, input: &MediaHandle, range: TrimRange) -> Result<MediaHandle> {
        self.cuts.fetch_add(1, Ordering::SeqCst);
        Ok(MediaHandle::new(
            format!("trimmed.{}", input.extension()),
            input.mime_type(),
            input.require_bytes()?,
        )
        .with_duration(range.len_secs()))
    }
}
