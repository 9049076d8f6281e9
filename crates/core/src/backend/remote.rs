//! Remote processing service backend.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::{multipart, Client};
use tracing::{debug, info, warn};

use super::config::RemoteConfig;
use super::traits::ProcessingBackend;
use crate::error::{Result, SessionError};
use crate::media::{MediaHandle, DEFAULT_VIDEO_MIME};
use crate::validation::TrimRange;

/// Longest slice of an error body carried into the error message.
const ERROR_BODY_EXCERPT: usize = 200;

/// Backend that posts payloads to an HTTP processing service.
///
/// Each call uploads the full payload and waits for the complete response
/// body. Dropping the returned future drops the request and its connection.
pub struct RemoteBackend {
    client: Client,
    config: RemoteConfig,
}

impl RemoteBackend {
    /// Create a new remote backend.
    pub fn new(config: RemoteConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(secs) = config.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| SessionError::unavailable(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    /// Build a multipart part carrying a handle's payload.
    fn media_part(handle: &MediaHandle) -> Result<multipart::Part> {
        let bytes = handle.require_bytes()?;
        let len = bytes.len() as u64;
        multipart::Part::stream_with_length(bytes, len)
            .file_name(handle.file_name().to_string())
            .mime_str(handle.mime_type())
            .map_err(|e| {
                SessionError::unsupported(format!(
                    "{} has an invalid mime type {:?}: {}",
                    handle.file_name(),
                    handle.mime_type(),
                    e
                ))
            })
    }

    /// POST a multipart form and return the binary body plus its content type.
    async fn post_multipart(
        &self,
        url: &str,
        form: multipart::Form,
    ) -> Result<(Bytes, Option<String>)> {
        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    SessionError::unavailable(format!("Cannot reach {}: {}", url, e))
                } else {
                    SessionError::processing_failed(format!("Request to {} failed: {}", url, e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(ERROR_BODY_EXCERPT).collect();
            warn!(url = %url, status = status.as_u16(), "Processing service rejected request");
            return Err(SessionError::http_status(
                status.as_u16(),
                format!("HTTP {}: {}", status, excerpt.trim()),
            ));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response.bytes().await.map_err(|e| {
            SessionError::processing_failed(format!("Failed to read response from {}: {}", url, e))
        })?;

        if body.is_empty() {
            return Err(SessionError::processing_failed(format!(
                "{} returned an empty body",
                url
            )));
        }

        Ok((body, content_type))
    }

    /// Wrap a response body in a handle named after the operation.
    fn output_handle(
        stem: &str,
        body: Bytes,
        content_type: Option<String>,
        fallback_mime: &str,
    ) -> MediaHandle {
        let mime = content_type
            .filter(|ct| ct.to_ascii_lowercase().starts_with("video/"))
            .unwrap_or_else(|| fallback_mime.to_string());
        let ext = crate::media::extension_for_mime(&mime).unwrap_or("mp4");
        MediaHandle::new(format!("{}.{}", stem, ext), mime, body)
    }
}

#[async_trait]
impl ProcessingBackend for RemoteBackend {
    fn name(&self) -> &str {
        "remote"
    }

    async fn merge(&self, handles: &[MediaHandle]) -> Result<MediaHandle> {
        let first = handles.first().ok_or(SessionError::EmptyInput)?;

        let mut form = multipart::Form::new();
        for handle in handles {
            form = form.part("videos", Self::media_part(handle)?);
        }

        let url = self.config.merge_url();
        info!(url = %url, inputs = handles.len(), "Sending merge request");
        let (body, content_type) = self.post_multipart(&url, form).await?;
        debug!(bytes = body.len(), content_type = ?content_type, "Merge response received");

        let fallback = if first.mime_type().starts_with("video/") {
            first.mime_type()
        } else {
            DEFAULT_VIDEO_MIME
        };
        Ok(Self::output_handle("merged", body, content_type, fallback))
    }

    async fn trim(&self, handle: &MediaHandle, range: TrimRange) -> Result<MediaHandle> {
        let form = multipart::Form::new()
            .part("video", Self::media_part(handle)?)
            .text("start", range.start().to_string())
            .text("end", range.end().to_string());

        let url = self.config.trim_url();
        info!(
            url = %url,
            start = range.start(),
            end = range.end(),
            "Sending trim request"
        );
        let (body, content_type) = self.post_multipart(&url, form).await?;
        debug!(bytes = body.len(), content_type = ?content_type, "Trim response received");

        let fallback = if handle.mime_type().starts_with("video/") {
            handle.mime_type()
        } else {
            DEFAULT_VIDEO_MIME
        };
        Ok(Self::output_handle("trimmed", body, content_type, fallback))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_handle_prefers_video_content_type() {
        let handle = RemoteBackend::output_handle(
            "merged",
            Bytes::from_static(b"data"),
            Some("video/webm".to_string()),
            "video/mp4",
        );
        assert_eq!(handle.mime_type(), "video/webm");
        assert_eq!(handle.file_name(), "merged.webm");
    }

    #[test]
    fn test_output_handle_falls_back_for_generic_type() {
        let handle = RemoteBackend::output_handle(
            "trimmed",
            Bytes::from_static(b"data"),
            Some("application/octet-stream".to_string()),
            "video/quicktime",
        );
        assert_eq!(handle.mime_type(), "video/quicktime");
        assert_eq!(handle.file_name(), "trimmed.mov");
        assert_eq!(handle.duration_secs(), None);
    }

    #[test]
    fn test_media_part_rejects_released_handle() {
        let handle = MediaHandle::new("a.mp4", "video/mp4", b"abc".to_vec());
        handle.release();
        let err = RemoteBackend::media_part(&handle).unwrap_err();
        assert!(matches!(err, SessionError::ProcessingFailed { .. }));
    }

    #[tokio::test]
    async fn test_merge_empty_input() {
        let backend = RemoteBackend::new(RemoteConfig::new("http://127.0.0.1:9")).unwrap();
        let err = backend.merge(&[]).await.unwrap_err();
        assert_eq!(err, SessionError::EmptyInput);
    }

    #[tokio::test]
    async fn test_unreachable_service_is_unavailable() {
        // Bind then drop a listener so the port is very likely closed
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let backend =
            RemoteBackend::new(RemoteConfig::new(format!("http://127.0.0.1:{}", port))).unwrap();
        let input = MediaHandle::new("a.mp4", "video/mp4", b"abc".to_vec());

        let err = backend.merge(&[input]).await.unwrap_err();
        assert!(
            matches!(err, SessionError::BackendUnavailable { .. }),
            "unexpected error: {err:?}"
        );
    }
}
