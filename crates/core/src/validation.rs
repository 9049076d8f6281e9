//! Input validation: upload file type and arity, and duration-aware trim ranges.

use serde::Serialize;

use crate::config::UploadConfig;
use crate::error::{Result, SessionError};
use crate::media::{extension_for_mime, mime_for_extension, UploadFile};

/// A `[start, end)` span in seconds relative to the working media.
///
/// Constructing one checks `0 <= start < end` with finite bounds. The upper
/// bound is checked separately with [`TrimRange::fits`] because the duration
/// usually arrives after the range is first chosen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrimRange {
    start: f64,
    end: f64,
}

impl TrimRange {
    pub fn new(start: f64, end: f64) -> Result<Self> {
        if !start.is_finite() || !end.is_finite() {
            return Err(SessionError::invalid_range(
                start,
                end,
                None,
                "bounds must be finite",
            ));
        }
        if start < 0.0 {
            return Err(SessionError::invalid_range(
                start,
                end,
                None,
                "start must not be negative",
            ));
        }
        if start >= end {
            return Err(SessionError::invalid_range(
                start,
                end,
                None,
                "end must be after start",
            ));
        }
        Ok(Self { start, end })
    }

    /// Builds a range and checks it against a known duration.
    pub fn checked(start: f64, end: f64, duration: Option<f64>) -> Result<Self> {
        let range = Self::new(start, end)?;
        range.fits(duration)?;
        Ok(range)
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    /// Length of the range in seconds.
    pub fn len_secs(&self) -> f64 {
        self.end - self.start
    }

    /// Checks `end <= duration`. An unknown duration never fits.
    pub fn fits(&self, duration: Option<f64>) -> Result<()> {
        match duration {
            None => Err(SessionError::invalid_range(
                self.start,
                self.end,
                None,
                "media duration is not known yet",
            )),
            Some(d) if self.end > d => Err(SessionError::invalid_range(
                self.start,
                self.end,
                Some(d),
                format!("end exceeds media duration of {}s", d),
            )),
            Some(_) => Ok(()),
        }
    }
}

/// Checks a duration reported by the presentation layer.
pub fn check_duration(seconds: f64) -> Result<f64> {
    if seconds.is_finite() && seconds > 0.0 {
        Ok(seconds)
    } else {
        Err(SessionError::invalid_range(
            0.0,
            seconds,
            None,
            "reported duration must be a positive number of seconds",
        ))
    }
}

/// Checks that a single file looks like a video within the configured limits.
pub fn check_file(file: &UploadFile, limits: &UploadConfig) -> Result<()> {
    if file.bytes.is_empty() {
        return Err(SessionError::unsupported(format!(
            "{} is empty",
            file.file_name
        )));
    }
    if file.bytes.len() as u64 > limits.max_file_bytes {
        return Err(SessionError::unsupported(format!(
            "{} is {} bytes, limit is {}",
            file.file_name,
            file.bytes.len(),
            limits.max_file_bytes
        )));
    }

    let mime_ok = file.mime_type.to_ascii_lowercase().starts_with("video/")
        || extension_for_mime(&file.mime_type).is_some();
    let ext_ok = std::path::Path::new(&file.file_name)
        .extension()
        .and_then(|e| e.to_str())
        .and_then(mime_for_extension)
        .is_some();

    if mime_ok || ext_ok {
        Ok(())
    } else {
        Err(SessionError::unsupported(format!(
            "{} ({}) is not a video",
            file.file_name, file.mime_type
        )))
    }
}

/// Checks arity and every file of an upload.
pub fn check_upload(files: &[UploadFile], limits: &UploadConfig) -> Result<()> {
    if files.is_empty() {
        return Err(SessionError::EmptyInput);
    }
    if files.len() > limits.max_files {
        return Err(SessionError::unsupported(format!(
            "{} files selected, at most {} can be merged",
            files.len(),
            limits.max_files
        )));
    }
    files.iter().try_for_each(|f| check_file(f, limits))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn video(name: &str) -> UploadFile {
        UploadFile::from_bytes(name, vec![0u8; 32])
    }

    #[test]
    fn test_range_accepts_valid_bounds() {
        let cases = [(0.0, 1.0, 1.0), (2.0, 8.0, 15.0), (0.0, 15.0, 15.0), (14.5, 15.0, 15.0)];
        for (start, end, duration) in cases {
            let range = TrimRange::checked(start, end, Some(duration)).unwrap();
            assert_eq!(range.start(), start);
            assert_eq!(range.end(), end);
        }
    }

    #[test]
    fn test_range_rejects_violations() {
        let cases = [
            (-1.0, 5.0, Some(10.0)),
            (5.0, 5.0, Some(10.0)),
            (6.0, 5.0, Some(10.0)),
            (12.0, 20.0, Some(15.0)),
            (0.0, 5.0, None),
            (f64::NAN, 5.0, Some(10.0)),
            (0.0, f64::INFINITY, Some(10.0)),
        ];
        for (start, end, duration) in cases {
            let err = TrimRange::checked(start, end, duration).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidRange, "{start}..{end}");
        }
    }

    #[test]
    fn test_range_reports_duration() {
        let err = TrimRange::checked(12.0, 20.0, Some(15.0)).unwrap_err();
        match err {
            SessionError::InvalidRange { duration, .. } => assert_eq!(duration, Some(15.0)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_len_secs() {
        assert_eq!(TrimRange::new(2.0, 8.0).unwrap().len_secs(), 6.0);
    }

    #[test]
    fn test_check_duration() {
        assert_eq!(check_duration(15.0).unwrap(), 15.0);
        assert!(check_duration(0.0).is_err());
        assert!(check_duration(-3.0).is_err());
        assert!(check_duration(f64::NAN).is_err());
    }

    #[test]
    fn test_check_upload_arity() {
        let limits = UploadConfig::default();
        assert_eq!(check_upload(&[], &limits), Err(SessionError::EmptyInput));

        let limits = UploadConfig {
            max_files: 2,
            ..Default::default()
        };
        let files = vec![video("a.mp4"), video("b.mp4"), video("c.mp4")];
        assert_eq!(
            check_upload(&files, &limits).unwrap_err().kind(),
            ErrorKind::UnsupportedMedia
        );
    }

    #[test]
    fn test_check_file_type() {
        let limits = UploadConfig::default();
        assert!(check_file(&video("clip.webm"), &limits).is_ok());
        // Unknown extension but an explicit video mime type
        assert!(check_file(&UploadFile::new("capture", "video/ogg", vec![1u8]), &limits).is_ok());
        assert!(check_file(&UploadFile::from_bytes("notes.txt", vec![1u8]), &limits).is_err());
        assert!(check_file(&UploadFile::new("a.mp4", "video/mp4", Vec::new()), &limits).is_err());
    }

    #[test]
    fn test_check_file_size_limit() {
        let limits = UploadConfig {
            max_file_bytes: 16,
            ..Default::default()
        };
        let err = check_file(&video("big.mp4"), &limits).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedMedia);
    }
}
