//! Embedded engine backend.
//!
//! The engine must be loaded once before use. [`EmbeddedBackend::initialize`]
//! shares a single in-flight load between concurrent callers; every caller
//! observes the same outcome. A failed load leaves the backend unloaded so a
//! later call can try again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, info, warn};

use super::config::EmbeddedConfig;
use super::ffmpeg::FfmpegEngine;
use super::traits::ProcessingBackend;
use crate::error::{Result, SessionError};
use crate::media::MediaHandle;
use crate::validation::TrimRange;

/// Slack allowed between a requested end and the probed duration.
///
/// Container durations and player-reported durations commonly differ by a
/// few milliseconds.
pub const DURATION_TOLERANCE_SECS: f64 = 0.05;

/// The in-process toolchain behind [`EmbeddedBackend`].
///
/// Implementations own whatever runtime state `load` produces. `probe`,
/// `concat` and `cut` may assume `load` has succeeded.
#[async_trait]
pub trait Engine: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// One-time runtime setup.
    async fn load(&self) -> Result<()>;

    /// Returns the duration in seconds, or `UnsupportedMedia` if undecodable.
    async fn probe(&self, media: &MediaHandle) -> Result<f64>;

    /// Concatenates two or more inputs in order.
    async fn concat(&self, inputs: &[MediaHandle]) -> Result<MediaHandle>;

    /// Keeps only `range` of the input.
    async fn cut(&self, input: &MediaHandle, range: TrimRange) -> Result<MediaHandle>;
}

type LoadFuture = Shared<BoxFuture<'static, Result<()>>>;

enum LoadState {
    Unloaded,
    Loading { generation: u64, load: LoadFuture },
    Ready,
}

/// Backend running an [`Engine`] in-process.
pub struct EmbeddedBackend<E: Engine = FfmpegEngine> {
    engine: Arc<E>,
    state: Mutex<LoadState>,
    next_generation: AtomicU64,
}

impl EmbeddedBackend<FfmpegEngine> {
    /// Creates a backend over the FFmpeg engine.
    pub fn new(config: EmbeddedConfig) -> Self {
        Self::with_engine(FfmpegEngine::new(config))
    }
}

impl<E: Engine> EmbeddedBackend<E> {
    pub fn with_engine(engine: E) -> Self {
        Self {
            engine: Arc::new(engine),
            state: Mutex::new(LoadState::Unloaded),
            next_generation: AtomicU64::new(1),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    fn lock_state(&self) -> MutexGuard<'_, LoadState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(SessionError::BackendNotReady)
        }
    }
}

#[async_trait]
impl<E: Engine> ProcessingBackend for EmbeddedBackend<E> {
    fn name(&self) -> &str {
        "embedded"
    }

    async fn initialize(&self) -> Result<()> {
        let (generation, load) = {
            let mut state = self.lock_state();
            let in_flight = match &*state {
                LoadState::Ready => return Ok(()),
                LoadState::Loading { generation, load } => Some((*generation, load.clone())),
                LoadState::Unloaded => None,
            };
            match in_flight {
                Some(joined) => {
                    debug!(engine = self.engine.name(), "Joining in-flight engine load");
                    joined
                }
                None => {
                    let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
                    let engine = Arc::clone(&self.engine);
                    let load = async move { engine.load().await }.boxed().shared();
                    *state = LoadState::Loading {
                        generation,
                        load: load.clone(),
                    };
                    info!(engine = self.engine.name(), generation, "Loading embedded engine");
                    (generation, load)
                }
            }
        };

        let outcome = load.await;

        let mut state = self.lock_state();
        // Only the attempt that is still current may settle the state
        if matches!(&*state, LoadState::Loading { generation: g, .. } if *g == generation) {
            match &outcome {
                Ok(()) => {
                    info!(engine = self.engine.name(), "Embedded engine ready");
                    *state = LoadState::Ready;
                }
                Err(e) => {
                    warn!(engine = self.engine.name(), "Embedded engine failed to load: {}", e);
                    *state = LoadState::Unloaded;
                }
            }
        }
        outcome
    }

    fn is_ready(&self) -> bool {
        matches!(&*self.lock_state(), LoadState::Ready)
    }

    async fn merge(&self, handles: &[MediaHandle]) -> Result<MediaHandle> {
        self.ensure_ready()?;
        let first = handles.first().ok_or(SessionError::EmptyInput)?;

        for handle in handles {
            self.engine.probe(handle).await?;
        }

        if handles.len() == 1 {
            debug!(media_id = %first.id(), "Single input merge, passing payload through");
            return Ok(MediaHandle::new(
                format!("merged.{}", first.extension()),
                first.mime_type(),
                first.require_bytes()?,
            ));
        }

        info!(inputs = handles.len(), engine = self.engine.name(), "Concatenating media");
        self.engine.concat(handles).await
    }

    async fn trim(&self, handle: &MediaHandle, range: TrimRange) -> Result<MediaHandle> {
        self.ensure_ready()?;

        let duration = self.engine.probe(handle).await?;
        if range.end() > duration + DURATION_TOLERANCE_SECS {
            return Err(SessionError::invalid_range(
                range.start(),
                range.end(),
                Some(duration),
                format!("end exceeds probed duration of {:.3}s", duration),
            ));
        }

        info!(
            start = range.start(),
            end = range.end(),
            engine = self.engine.name(),
            "Trimming media"
        );
        self.engine.cut(handle, range).await
    }
}
