//! Media handles: owned payloads plus the metadata known about them.
//!
//! A [`MediaHandle`] wraps an immutable byte payload. Deriving new media
//! (merge, trim) always produces a new handle; annotating a duration returns a
//! copy. Clones share the payload, and [`MediaHandle::release`] frees it for
//! every clone at once.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::debug;
use uuid::Uuid;

use crate::config::UploadConfig;
use crate::error::{Result, SessionError};
use crate::validation;

/// Video container extensions and their mime types.
const VIDEO_TYPES: &[(&str, &str)] = &[
    ("mp4", "video/mp4"),
    ("m4v", "video/x-m4v"),
    ("mov", "video/quicktime"),
    ("mkv", "video/x-matroska"),
    ("webm", "video/webm"),
    ("avi", "video/x-msvideo"),
    ("wmv", "video/x-ms-wmv"),
    ("mpeg", "video/mpeg"),
    ("mpg", "video/mpeg"),
    ("ts", "video/mp2t"),
];

/// Mime type used when nothing better is known.
pub const DEFAULT_VIDEO_MIME: &str = "video/mp4";

/// Returns the video mime type for a file extension.
pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    let ext = ext.to_ascii_lowercase();
    VIDEO_TYPES
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, mime)| *mime)
}

/// Returns the preferred file extension for a video mime type.
pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    // Ignore parameters such as "; codecs=..."
    let essence = mime.split(';').next().unwrap_or(mime).trim();
    VIDEO_TYPES
        .iter()
        .find(|(_, m)| m.eq_ignore_ascii_case(essence))
        .map(|(ext, _)| *ext)
}

fn extension_of(file_name: &str) -> Option<&str> {
    Path::new(file_name).extension().and_then(|e| e.to_str())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Opaque identifier, unique per handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct MediaId(Uuid);

impl MediaId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MediaId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Default)]
struct PayloadSlot {
    bytes: Option<Bytes>,
    /// Spilled copy handed out to previews; deleted when dropped.
    preview: Option<NamedTempFile>,
    released: bool,
}

struct Payload {
    size_bytes: u64,
    slot: Mutex<PayloadSlot>,
}

/// An owned reference to a media payload plus its known metadata.
#[derive(Clone)]
pub struct MediaHandle {
    id: MediaId,
    file_name: String,
    mime_type: String,
    duration_secs: Option<f64>,
    payload: Arc<Payload>,
}

impl MediaHandle {
    /// Wraps a payload in a new handle. The duration is unknown until annotated.
    pub fn new(
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        let bytes = bytes.into();
        Self {
            id: MediaId::new(),
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            duration_secs: None,
            payload: Arc::new(Payload {
                size_bytes: bytes.len() as u64,
                slot: Mutex::new(PayloadSlot {
                    bytes: Some(bytes),
                    ..Default::default()
                }),
            }),
        }
    }

    pub fn id(&self) -> MediaId {
        self.id
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Duration in seconds, once reported.
    pub fn duration_secs(&self) -> Option<f64> {
        self.duration_secs
    }

    /// Payload size at construction, still reported after release.
    pub fn size_bytes(&self) -> u64 {
        self.payload.size_bytes
    }

    /// File extension, taken from the file name or else the mime type.
    pub fn extension(&self) -> &str {
        extension_of(&self.file_name)
            .or_else(|| extension_for_mime(&self.mime_type))
            .unwrap_or("mp4")
    }

    /// Returns the payload, or `None` once released.
    pub fn bytes(&self) -> Option<Bytes> {
        lock(&self.payload.slot).bytes.clone()
    }

    /// Returns the payload or a processing error if it has been released.
    pub fn require_bytes(&self) -> Result<Bytes> {
        self.bytes().ok_or_else(|| {
            SessionError::processing_failed(format!("media {} has been released", self.id))
        })
    }

    pub fn is_released(&self) -> bool {
        lock(&self.payload.slot).released
    }

    /// Returns a copy annotated with `seconds`; `self` is unchanged.
    pub fn with_duration(&self, seconds: f64) -> Self {
        Self {
            duration_secs: Some(seconds),
            ..self.clone()
        }
    }

    /// Hex SHA-256 of the payload, or `None` once released.
    pub fn digest(&self) -> Option<String> {
        self.bytes()
            .map(|bytes| format!("{:x}", Sha256::digest(&bytes)))
    }

    /// Path of a temporary file holding the payload, written on first use.
    ///
    /// The file lives until [`release`](Self::release). This performs blocking
    /// I/O the first time it is called for a payload.
    pub fn preview_path(&self) -> std::io::Result<PathBuf> {
        let mut slot = lock(&self.payload.slot);
        if let Some(preview) = &slot.preview {
            return Ok(preview.path().to_path_buf());
        }
        let bytes = slot.bytes.clone().ok_or_else(|| {
            std::io::Error::other(format!("media {} has been released", self.id))
        })?;

        let mut file = tempfile::Builder::new()
            .prefix("clipforge-preview-")
            .suffix(&format!(".{}", self.extension()))
            .tempfile()?;
        file.write_all(&bytes)?;
        file.flush()?;

        let path = file.path().to_path_buf();
        debug!(media_id = %self.id, path = %path.display(), "Spilled media for preview");
        slot.preview = Some(file);
        Ok(path)
    }

    /// Frees the payload and deletes any preview file.
    ///
    /// Returns `true` for the call that actually released it; later calls are
    /// no-ops returning `false`.
    pub fn release(&self) -> bool {
        let (bytes, preview) = {
            let mut slot = lock(&self.payload.slot);
            if slot.released {
                return false;
            }
            slot.released = true;
            (slot.bytes.take(), slot.preview.take())
        };
        drop(bytes);
        if let Some(preview) = preview {
            if let Err(e) = preview.close() {
                debug!(media_id = %self.id, "Failed to delete preview file: {}", e);
            }
        }
        debug!(media_id = %self.id, file_name = %self.file_name, "Released media");
        true
    }
}

impl fmt::Debug for MediaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaHandle")
            .field("id", &self.id)
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("duration_secs", &self.duration_secs)
            .field("size_bytes", &self.payload.size_bytes)
            .field("released", &self.is_released())
            .finish()
    }
}

/// Serializable view of a handle's metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaSummary {
    pub id: MediaId,
    pub file_name: String,
    pub mime_type: String,
    pub duration_secs: Option<f64>,
    pub size_bytes: u64,
}

impl From<&MediaHandle> for MediaSummary {
    fn from(handle: &MediaHandle) -> Self {
        Self {
            id: handle.id,
            file_name: handle.file_name.clone(),
            mime_type: handle.mime_type.clone(),
            duration_secs: handle.duration_secs,
            size_bytes: handle.payload.size_bytes,
        }
    }
}

/// A raw file picked by the user, before it becomes a handle.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Bytes,
}

impl UploadFile {
    pub fn new(
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Builds an upload file, inferring the mime type from the extension.
    pub fn from_bytes(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        let file_name = file_name.into();
        let mime_type = extension_of(&file_name)
            .and_then(mime_for_extension)
            .unwrap_or("application/octet-stream");
        Self::new(file_name, mime_type, bytes)
    }

    /// Reads a file from disk.
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Ok(Self::from_bytes(file_name, bytes))
    }
}

/// The ordered handles of one upload, validated and ready to merge.
#[derive(Debug, Clone)]
pub struct UploadBatch {
    handles: Vec<MediaHandle>,
}

impl UploadBatch {
    /// Validates `files` and wraps each one in a handle, preserving order.
    ///
    /// Fails with `EmptyInput` for an empty sequence and `UnsupportedMedia`
    /// for a file that is not a video or breaks the configured limits.
    pub fn from_files(files: Vec<UploadFile>, limits: &UploadConfig) -> Result<Self> {
        validation::check_upload(&files, limits)?;
        let handles = files
            .into_iter()
            .map(|f| MediaHandle::new(f.file_name, f.mime_type, f.bytes))
            .collect();
        Ok(Self { handles })
    }

    pub fn handles(&self) -> &[MediaHandle] {
        &self.handles
    }

    pub fn into_handles(self) -> Vec<MediaHandle> {
        self.handles
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Releases every handle in the batch.
    pub fn release(&self) {
        for handle in &self.handles {
            handle.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(name: &str) -> UploadFile {
        UploadFile::from_bytes(name, vec![1u8, 2, 3, 4])
    }

    #[test]
    fn test_mime_lookup() {
        assert_eq!(mime_for_extension("MP4"), Some("video/mp4"));
        assert_eq!(mime_for_extension("txt"), None);
        assert_eq!(extension_for_mime("video/webm; codecs=vp9"), Some("webm"));
        assert_eq!(extension_for_mime("video/quicktime"), Some("mov"));
    }

    #[test]
    fn test_with_duration_leaves_original() {
        let handle = MediaHandle::new("a.mp4", "video/mp4", vec![0u8; 8]);
        let annotated = handle.with_duration(12.5);
        assert_eq!(handle.duration_secs(), None);
        assert_eq!(annotated.duration_secs(), Some(12.5));
        assert_eq!(annotated.id(), handle.id());
    }

    #[test]
    fn test_new_handles_have_distinct_ids() {
        let a = MediaHandle::new("a.mp4", "video/mp4", vec![1u8]);
        let b = MediaHandle::new("a.mp4", "video/mp4", vec![1u8]);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn test_release_is_idempotent() {
        let handle = MediaHandle::new("a.mp4", "video/mp4", vec![7u8; 16]);
        let clone = handle.clone();

        assert!(handle.release());
        assert!(!handle.release());
        assert!(!clone.release());

        assert!(handle.is_released());
        assert!(clone.bytes().is_none());
        assert_eq!(handle.size_bytes(), 16);
        assert!(matches!(
            handle.require_bytes(),
            Err(SessionError::ProcessingFailed { .. })
        ));
    }

    #[test]
    fn test_preview_file_removed_on_release() {
        let handle = MediaHandle::new("clip.webm", "video/webm", b"webm-bytes".to_vec());
        let path = handle.preview_path().unwrap();
        assert!(path.exists());
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("webm"));
        assert_eq!(std::fs::read(&path).unwrap(), b"webm-bytes");
        // Second call reuses the same file
        assert_eq!(handle.preview_path().unwrap(), path);

        handle.release();
        assert!(!path.exists());
        assert!(handle.preview_path().is_err());
    }

    #[test]
    fn test_extension_falls_back_to_mime() {
        let handle = MediaHandle::new("merged", "video/x-matroska", vec![1u8]);
        assert_eq!(handle.extension(), "mkv");
    }

    #[test]
    fn test_upload_batch_preserves_order() {
        let batch = UploadBatch::from_files(
            vec![clip("first.mp4"), clip("second.mov")],
            &UploadConfig::default(),
        )
        .unwrap();
        let names: Vec<_> = batch.handles().iter().map(|h| h.file_name()).collect();
        assert_eq!(names, vec!["first.mp4", "second.mov"]);
        assert_eq!(batch.handles()[1].mime_type(), "video/quicktime");
    }

    #[test]
    fn test_upload_batch_empty() {
        let result = UploadBatch::from_files(Vec::new(), &UploadConfig::default());
        assert_eq!(result.unwrap_err(), SessionError::EmptyInput);
    }

    #[tokio::test]
    async fn test_upload_file_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("holiday.MKV");
        tokio::fs::write(&path, b"matroska").await.unwrap();

        let file = UploadFile::from_path(&path).await.unwrap();
        assert_eq!(file.file_name, "holiday.MKV");
        assert_eq!(file.mime_type, "video/x-matroska");
        assert_eq!(&file.bytes[..], b"matroska");
    }
}
