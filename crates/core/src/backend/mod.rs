//! Processing backends that concatenate and trim media.
//!
//! The [`ProcessingBackend`] capability has two variants:
//!
//! - [`RemoteBackend`] posts payloads to an HTTP processing service
//! - [`EmbeddedBackend`] runs an [`Engine`] in-process, by default
//!   [`FfmpegEngine`], after a one-time asynchronous [`initialize`]
//!
//! [`initialize`]: ProcessingBackend::initialize
//!
//! # Example
//!
//! ```ignore
//! use clipforge_core::backend::{create_backend, ProcessingBackend};
//!
//! let backend = create_backend(&config.backend)?;
//! backend.initialize().await?;
//!
//! let merged = backend.merge(&handles).await?;
//! let clip = backend.trim(&merged, TrimRange::new(2.0, 8.0)?).await?;
//! ```

mod config;
mod embedded;
mod ffmpeg;
mod remote;
mod traits;

use std::sync::Arc;

pub use config::{EmbeddedConfig, RemoteConfig};
pub use embedded::{EmbeddedBackend, Engine, DURATION_TOLERANCE_SECS};
pub use ffmpeg::{FfmpegEngine, ProbeInfo, Toolchain};
pub use remote::RemoteBackend;
pub use traits::ProcessingBackend;

use crate::config::{BackendConfig, BackendKind};
use crate::error::{Result, SessionError};

/// Creates the backend selected by configuration.
pub fn create_backend(config: &BackendConfig) -> Result<Arc<dyn ProcessingBackend>> {
    match config.kind {
        BackendKind::Remote => {
            let remote = config.remote.clone().ok_or_else(|| {
                SessionError::unavailable("remote backend selected but not configured")
            })?;
            Ok(Arc::new(RemoteBackend::new(remote)?))
        }
        BackendKind::Embedded => {
            let embedded = config.embedded.clone().unwrap_or_default();
            Ok(Arc::new(EmbeddedBackend::new(embedded)))
        }
    }
}
