//! Testing utilities and mock implementations.
//!
//! [`MockBackend`] stands in for a whole [`ProcessingBackend`] and
//! [`MockEngine`] for the toolchain behind an embedded backend, so session and
//! backend behavior can be exercised without a processing service or FFmpeg.
//!
//! # Example
//!
//! ```rust,ignore
//! use clipforge_core::testing::{fixtures, MockBackend};
//!
//! let backend = Arc::new(MockBackend::new());
//! let session = EditSession::new(Arc::clone(&backend));
//!
//! backend.set_next_error(SessionError::processing_failed("boom")).await;
//! session.upload(vec![fixtures::clip("a.mp4", 64)])?;
//! assert_eq!(session.settled().await.stage, Stage::Idle);
//! ```
//!
//! [`ProcessingBackend`]: crate::backend::ProcessingBackend

mod mock_backend;
mod mock_engine;

pub use mock_backend::MockBackend;
pub use mock_engine::MockEngine;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::media::{MediaHandle, UploadFile};

    /// An upload of `size` filler bytes; the MIME type follows the extension.
    pub fn clip(file_name: &str, size: usize) -> UploadFile {
        UploadFile::from_bytes(file_name, vec![0x42u8; size])
    }

    /// A handle whose payload is its own file name.
    pub fn handle(file_name: &str) -> MediaHandle {
        MediaHandle::new(file_name, "video/mp4", file_name.as_bytes().to_vec())
    }
}
