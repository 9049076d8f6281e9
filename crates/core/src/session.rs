//! The edit session coordinator.
//!
//! [`EditSession`] sequences upload → merge → trim as a small job pipeline over
//! one [`ProcessingBackend`]. It admits at most one backend job at a time,
//! validates trim ranges against the working media's duration, and owns every
//! media handle it produces: superseded handles are released as soon as they
//! are replaced, and everything is released on [`EditSession::reset`] or drop.
//!
//! Jobs run on spawned Tokio tasks. `upload`, `retry_upload` and `trim` return a
//! [`JobToken`] immediately; completion shows up as a stage change in
//! [`EditSession::snapshot`], through [`EditSession::subscribe`], or by
//! awaiting [`EditSession::settled`]. Operations that start jobs must be called
//! from within a Tokio runtime.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::ProcessingBackend;
use crate::config::UploadConfig;
use crate::error::{Result, SessionError};
use crate::media::{MediaHandle, MediaSummary, UploadBatch, UploadFile};
use crate::validation::{check_duration, TrimRange};

/// Position in the upload → merge → trim pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    Merging,
    Merged,
    Trimming,
    Trimmed,
}

/// Kind of backend job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Merge,
    Trim,
}

/// Identifies one outstanding backend job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobToken {
    pub id: u64,
    pub kind: JobKind,
    pub started_at: DateTime<Utc>,
}

/// Read-only view of the session state.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub stage: Stage,
    pub working_handle: Option<MediaHandle>,
    pub output_handle: Option<MediaHandle>,
    pub trim_range: Option<TrimRange>,
    pub active_job: Option<JobToken>,
    pub last_error: Option<SessionError>,
}

impl SessionSnapshot {
    pub fn is_busy(&self) -> bool {
        self.active_job.is_some()
    }

    /// The artifact a download should offer: the trimmed output if there is
    /// one, otherwise the merged working media.
    pub fn downloadable(&self) -> Option<&MediaHandle> {
        self.output_handle.as_ref().or(self.working_handle.as_ref())
    }

    /// Serializable summary without payloads.
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            stage: self.stage,
            working: self.working_handle.as_ref().map(MediaSummary::from),
            output: self.output_handle.as_ref().map(MediaSummary::from),
            trim_range: self.trim_range,
            active_job: self.active_job.clone(),
            last_error: self.last_error.clone(),
        }
    }
}

/// Metadata-only form of [`SessionSnapshot`].
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub stage: Stage,
    pub working: Option<MediaSummary>,
    pub output: Option<MediaSummary>,
    pub trim_range: Option<TrimRange>,
    pub active_job: Option<JobToken>,
    pub last_error: Option<SessionError>,
}

struct ActiveJob {
    token: JobToken,
    task: Option<JoinHandle<()>>,
    /// Stage to return to if the job fails.
    resume: Stage,
}

struct SessionState {
    stage: Stage,
    working: Option<MediaHandle>,
    output: Option<MediaHandle>,
    /// Most recent upload batch, kept until a merge of it succeeds.
    uploads: Option<UploadBatch>,
    trim_range: Option<TrimRange>,
    active_job: Option<ActiveJob>,
    last_error: Option<SessionError>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            stage: Stage::Idle,
            working: None,
            output: None,
            uploads: None,
            trim_range: None,
            active_job: None,
            last_error: None,
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            stage: self.stage,
            working_handle: self.working.clone(),
            output_handle: self.output.clone(),
            trim_range: self.trim_range,
            active_job: self.active_job.as_ref().map(|j| j.token.clone()),
            last_error: self.last_error.clone(),
        }
    }

    /// Aborts any job and releases every handle, returning to `Idle`.
    fn clear(&mut self) {
        if let Some(job) = self.active_job.take() {
            if let Some(task) = job.task {
                task.abort();
            }
            info!(job_id = job.token.id, kind = ?job.token.kind, "Cancelled in-flight job");
        }
        if let Some(handle) = self.working.take() {
            handle.release();
        }
        if let Some(handle) = self.output.take() {
            handle.release();
        }
        if let Some(batch) = self.uploads.take() {
            batch.release();
        }
        self.trim_range = None;
        self.last_error = None;
        self.stage = Stage::Idle;
    }
}

/// State shared between the session and its job tasks.
struct Shared {
    state: Mutex<SessionState>,
    snapshots: watch::Sender<SessionSnapshot>,
    next_job_id: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &SessionState) {
        self.snapshots.send_replace(state.snapshot());
    }

    /// Records a failure in `last_error` and hands it back to the caller.
    fn fail(&self, state: &mut SessionState, error: SessionError) -> SessionError {
        warn!(kind = ?error.kind(), stage = ?state.stage, "Session operation failed: {}", error);
        state.last_error = Some(error.clone());
        self.publish(state);
        error
    }

    /// Takes the active job if `token` is still current.
    fn take_job(&self, state: &mut SessionState, token: &JobToken) -> Option<ActiveJob> {
        let current = state
            .active_job
            .as_ref()
            .is_some_and(|job| job.token.id == token.id);
        if current {
            state.active_job.take()
        } else {
            None
        }
    }

    fn finish_merge(&self, token: &JobToken, result: Result<MediaHandle>) {
        let mut state = self.lock();
        let Some(job) = self.take_job(&mut state, token) else {
            if let Ok(handle) = result {
                handle.release();
            }
            warn!(job_id = token.id, "Discarded result of superseded merge");
            return;
        };

        match result {
            Ok(handle) => {
                let new_id = handle.id();
                if let Some(old) = state.working.replace(handle) {
                    old.release();
                }
                if let Some(old) = state.output.take() {
                    old.release();
                }
                if let Some(batch) = state.uploads.take() {
                    for input in batch.handles().iter().filter(|h| h.id() != new_id) {
                        input.release();
                    }
                }
                state.trim_range = None;
                state.last_error = None;
                state.stage = Stage::Merged;
                info!(job_id = token.id, media_id = %new_id, "Merge finished");
                self.publish(&state);
            }
            Err(e) => {
                state.stage = job.resume;
                self.fail(&mut state, e);
            }
        }
    }

    fn finish_trim(&self, token: &JobToken, result: Result<MediaHandle>) {
        let mut state = self.lock();
        let Some(job) = self.take_job(&mut state, token) else {
            if let Ok(handle) = result {
                handle.release();
            }
            warn!(job_id = token.id, "Discarded result of superseded trim");
            return;
        };

        match result {
            Ok(handle) => {
                let new_id = handle.id();
                if let Some(old) = state.output.replace(handle) {
                    old.release();
                }
                state.last_error = None;
                state.stage = Stage::Trimmed;
                info!(job_id = token.id, media_id = %new_id, "Trim finished");
                self.publish(&state);
            }
            Err(e) => {
                state.stage = job.resume;
                self.fail(&mut state, e);
            }
        }
    }
}

/// Coordinator for one media-edit session.
///
/// Written once over any [`ProcessingBackend`]; `EditSession` without a type
/// argument holds a backend chosen at runtime.
pub struct EditSession<B: ProcessingBackend + ?Sized = dyn ProcessingBackend> {
    backend: Arc<B>,
    limits: UploadConfig,
    shared: Arc<Shared>,
}

impl<B: ProcessingBackend + ?Sized + 'static> EditSession<B> {
    /// Creates an empty session with default upload limits.
    pub fn new(backend: Arc<B>) -> Self {
        Self::with_limits(backend, UploadConfig::default())
    }

    /// Creates an empty session with the given upload limits.
    pub fn with_limits(backend: Arc<B>, limits: UploadConfig) -> Self {
        let state = SessionState::new();
        let (snapshots, _) = watch::channel(state.snapshot());
        Self {
            backend,
            limits,
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                snapshots,
                next_job_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.lock().snapshot()
    }

    pub fn stage(&self) -> Stage {
        self.shared.lock().stage
    }

    /// Receives a new snapshot after every state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.shared.snapshots.subscribe()
    }

    /// Waits until no job is in flight and returns the resulting snapshot.
    pub async fn settled(&self) -> SessionSnapshot {
        let mut rx = self.subscribe();
        let settled = rx
            .wait_for(|s| s.active_job.is_none())
            .await
            .map(|s| s.clone());
        // The sender lives as long as `self`, so the wait cannot fail
        settled.unwrap_or_else(|_| self.snapshot())
    }

    fn next_token(&self, kind: JobKind) -> JobToken {
        JobToken {
            id: self.shared.next_job_id.fetch_add(1, Ordering::SeqCst),
            kind,
            started_at: Utc::now(),
        }
    }

    /// Validates `files` and starts merging them.
    ///
    /// Accepted from any stage when no job is in flight. The previous media
    /// stays in place until the merge succeeds.
    pub fn upload(&self, files: Vec<UploadFile>) -> Result<JobToken> {
        let mut state = self.shared.lock();
        if state.active_job.is_some() {
            return Err(self.shared.fail(&mut state, SessionError::OperationInProgress));
        }

        let batch = match UploadBatch::from_files(files, &self.limits) {
            Ok(batch) => batch,
            Err(e) => return Err(self.shared.fail(&mut state, e)),
        };
        info!(files = batch.len(), backend = self.backend.name(), "Upload accepted");

        if let Some(previous) = state.uploads.replace(batch.clone()) {
            previous.release();
        }
        Ok(self.start_merge(&mut state, batch))
    }

    /// Re-issues the merge of the last uploaded files after a failure.
    pub fn retry_upload(&self) -> Result<JobToken> {
        let mut state = self.shared.lock();
        if state.active_job.is_some() {
            return Err(self.shared.fail(&mut state, SessionError::OperationInProgress));
        }
        let Some(batch) = state.uploads.clone() else {
            return Err(self.shared.fail(&mut state, SessionError::EmptyInput));
        };
        info!(files = batch.len(), "Retrying merge of retained upload");
        Ok(self.start_merge(&mut state, batch))
    }

    fn start_merge(&self, state: &mut SessionState, batch: UploadBatch) -> JobToken {
        let token = self.next_token(JobKind::Merge);
        let resume = state.stage;
        state.stage = Stage::Merging;
        state.last_error = None;

        let backend = Arc::clone(&self.backend);
        let shared = Arc::clone(&self.shared);
        let job_token = token.clone();
        let inputs = batch.into_handles();
        let task = tokio::spawn(async move {
            let result = backend.merge(&inputs).await;
            shared.finish_merge(&job_token, result);
        });

        state.active_job = Some(ActiveJob {
            token: token.clone(),
            task: Some(task),
            resume,
        });
        debug!(job_id = token.id, from = ?resume, "Stage -> Merging");
        self.shared.publish(state);
        token
    }

    /// Selects the `[start, end)` span of the working media to keep.
    ///
    /// The range must satisfy `0 <= start < end <= duration`, so the working
    /// media's duration must have been reported first. On failure the
    /// previously stored range is kept.
    pub fn set_trim_range(&self, start: f64, end: f64) -> Result<TrimRange> {
        let mut state = self.shared.lock();
        if state.active_job.is_some() {
            return Err(self.shared.fail(&mut state, SessionError::OperationInProgress));
        }
        let Some(duration) = state.working.as_ref().map(|h| h.duration_secs()) else {
            return Err(self.shared.fail(&mut state, SessionError::EmptyInput));
        };

        match TrimRange::checked(start, end, duration) {
            Ok(range) => {
                state.trim_range = Some(range);
                state.last_error = None;
                debug!(start, end, "Trim range set");
                self.shared.publish(&state);
                Ok(range)
            }
            Err(e) => Err(self.shared.fail(&mut state, e)),
        }
    }

    /// Starts trimming the working media to the selected range.
    pub fn trim(&self) -> Result<JobToken> {
        let mut state = self.shared.lock();
        if state.active_job.is_some() {
            return Err(self.shared.fail(&mut state, SessionError::OperationInProgress));
        }
        let Some(working) = state.working.clone() else {
            return Err(self.shared.fail(&mut state, SessionError::EmptyInput));
        };
        let Some(range) = state.trim_range else {
            let error = SessionError::invalid_range(
                0.0,
                0.0,
                working.duration_secs(),
                "no trim range selected",
            );
            return Err(self.shared.fail(&mut state, error));
        };

        let token = self.next_token(JobKind::Trim);
        let resume = state.stage;
        state.stage = Stage::Trimming;
        state.last_error = None;

        let backend = Arc::clone(&self.backend);
        let shared = Arc::clone(&self.shared);
        let job_token = token.clone();
        let task = tokio::spawn(async move {
            let result = backend.trim(&working, range).await;
            shared.finish_trim(&job_token, result);
        });

        state.active_job = Some(ActiveJob {
            token: token.clone(),
            task: Some(task),
            resume,
        });
        info!(
            job_id = token.id,
            start = range.start(),
            end = range.end(),
            backend = self.backend.name(),
            "Trim started"
        );
        self.shared.publish(&state);
        Ok(token)
    }

    /// Records the working media's duration once playback metadata is known.
    ///
    /// The duration is always recorded. If a stored range no longer fits, it
    /// is cleared and the `InvalidRange` error is returned and kept in
    /// `last_error`.
    pub fn report_duration(&self, seconds: f64) -> Result<()> {
        let mut state = self.shared.lock();
        let seconds = match check_duration(seconds) {
            Ok(seconds) => seconds,
            Err(e) => return Err(self.shared.fail(&mut state, e)),
        };
        let Some(annotated) = state.working.as_ref().map(|h| h.with_duration(seconds)) else {
            return Err(self.shared.fail(&mut state, SessionError::EmptyInput));
        };
        state.working = Some(annotated);
        debug!(duration_secs = seconds, "Working media duration reported");

        if let Some(range) = state.trim_range {
            if let Err(e) = range.fits(Some(seconds)) {
                state.trim_range = None;
                return Err(self.shared.fail(&mut state, e));
            }
        }

        self.shared.publish(&state);
        Ok(())
    }

    /// Cancels any in-flight job and releases all media, returning to `Idle`.
    pub fn reset(&self) {
        let mut state = self.shared.lock();
        state.clear();
        info!("Session reset");
        self.shared.publish(&state);
    }
}

impl<B: ProcessingBackend + ?Sized> Drop for EditSession<B> {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.clear();
        self.shared.publish(&state);
    }
}
