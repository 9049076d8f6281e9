//! Trait definitions for the backend module.

use async_trait::async_trait;

use crate::error::Result;
use crate::media::MediaHandle;
use crate::validation::TrimRange;

/// A backend that concatenates and trims media.
///
/// Both operations are single-shot. Cancelling means dropping the returned
/// future: implementations must not leave a request or process running once
/// their future is gone.
#[async_trait]
pub trait ProcessingBackend: Send + Sync {
    /// Returns the name of this backend implementation.
    fn name(&self) -> &str;

    /// Prepares the backend for use. Idempotent.
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    /// Whether `merge` and `trim` can be called right now.
    fn is_ready(&self) -> bool {
        true
    }

    /// Concatenates `handles` in order into a new handle.
    async fn merge(&self, handles: &[MediaHandle]) -> Result<MediaHandle>;

    /// Produces a new handle holding only `[range.start, range.end)` of `handle`.
    ///
    /// The backend's view of the duration is authoritative; ranges beyond it
    /// fail with `InvalidRange`.
    async fn trim(&self, handle: &MediaHandle, range: TrimRange) -> Result<MediaHandle>;
}
