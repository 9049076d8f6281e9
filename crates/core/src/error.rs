//! Error types surfaced by the edit session and its backends.

use serde::Serialize;
use thiserror::Error;

/// Structured failure reasons surfaced to the presentation layer.
///
/// Every variant is cheap to clone so the same failure can be stored in the
/// session's `last_error`, returned to the caller, and shared between callers
/// awaiting a common backend initialization.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionError {
    /// An upload or merge was attempted with no media.
    #[error("No media selected")]
    EmptyInput,

    /// A payload is not a decodable video.
    #[error("Unsupported media: {reason}")]
    UnsupportedMedia { reason: String },

    /// A trim range is outside the media or otherwise malformed.
    #[error("Invalid trim range {start}s..{end}s: {reason}")]
    InvalidRange {
        start: f64,
        end: f64,
        duration: Option<f64>,
        reason: String,
    },

    /// The backend could not be reached or loaded.
    #[error("Processing backend unavailable: {reason}")]
    BackendUnavailable { reason: String },

    /// The backend has not finished initializing.
    #[error("Processing backend is not initialized yet")]
    BackendNotReady,

    /// Another job is still in flight for this session.
    #[error("Another operation is already in progress")]
    OperationInProgress,

    /// Any other backend-reported failure.
    #[error("Processing failed: {reason}")]
    ProcessingFailed {
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<u16>,
    },
}

/// Fieldless discriminant of [`SessionError`], handy for matching and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    EmptyInput,
    UnsupportedMedia,
    InvalidRange,
    BackendUnavailable,
    BackendNotReady,
    OperationInProgress,
    ProcessingFailed,
}

impl SessionError {
    /// Creates an unsupported media error.
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::UnsupportedMedia {
            reason: reason.into(),
        }
    }

    /// Creates an invalid range error.
    pub fn invalid_range(
        start: f64,
        end: f64,
        duration: Option<f64>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidRange {
            start,
            end,
            duration,
            reason: reason.into(),
        }
    }

    /// Creates a backend unavailable error.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            reason: reason.into(),
        }
    }

    /// Creates a processing failed error without an HTTP status.
    pub fn processing_failed(reason: impl Into<String>) -> Self {
        Self::ProcessingFailed {
            reason: reason.into(),
            status: None,
        }
    }

    /// Creates a processing failed error for a non-success HTTP response.
    pub fn http_status(status: u16, reason: impl Into<String>) -> Self {
        Self::ProcessingFailed {
            reason: reason.into(),
            status: Some(status),
        }
    }

    /// Returns the fieldless kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyInput => ErrorKind::EmptyInput,
            Self::UnsupportedMedia { .. } => ErrorKind::UnsupportedMedia,
            Self::InvalidRange { .. } => ErrorKind::InvalidRange,
            Self::BackendUnavailable { .. } => ErrorKind::BackendUnavailable,
            Self::BackendNotReady => ErrorKind::BackendNotReady,
            Self::OperationInProgress => ErrorKind::OperationInProgress,
            Self::ProcessingFailed { .. } => ErrorKind::ProcessingFailed,
        }
    }

    /// Whether re-issuing the same operation later could succeed without new input.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::BackendUnavailable { .. }
                | Self::BackendNotReady
                | Self::OperationInProgress
                | Self::ProcessingFailed { .. }
        )
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SessionError>;
