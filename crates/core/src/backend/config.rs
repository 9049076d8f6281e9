//! Configuration for the processing backends.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the remote processing service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Service base URL (e.g., "http://localhost:3001").
    pub base_url: String,

    /// Path of the concatenation endpoint.
    #[serde(default = "default_merge_path")]
    pub merge_path: String,

    /// Path of the trim endpoint.
    #[serde(default = "default_trim_path")]
    pub trim_path: String,

    /// Bound on connection setup in seconds. Requests themselves have no timeout.
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
}

fn default_merge_path() -> String {
    "/videos/merge".to_string()
}

fn default_trim_path() -> String {
    "/videos/trim".to_string()
}

impl RemoteConfig {
    /// Creates a config for `base_url` with the default endpoint paths.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            merge_path: default_merge_path(),
            trim_path: default_trim_path(),
            connect_timeout_secs: None,
        }
    }

    /// Sets the connection timeout.
    pub fn with_connect_timeout(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = Some(secs);
        self
    }

    /// Full URL of the merge endpoint.
    pub fn merge_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.merge_path)
    }

    /// Full URL of the trim endpoint.
    pub fn trim_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.trim_path)
    }
}

/// Configuration for the embedded FFmpeg engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddedConfig {
    /// Path to ffmpeg binary.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// Path to ffprobe binary.
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: PathBuf,

    /// Root directory for per-job scratch files.
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,

    /// Re-encode (libx264/aac) instead of stream copy.
    #[serde(default)]
    pub reencode: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[serde(default = "default_log_level")]
    pub ffmpeg_log_level: String,

    /// Additional global ffmpeg arguments.
    #[serde(default)]
    pub extra_ffmpeg_args: Vec<String>,
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe_path() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join("clipforge-engine")
}

fn default_log_level() -> String {
    "error".to_string()
}

impl Default for EmbeddedConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            scratch_dir: default_scratch_dir(),
            reencode: false,
            ffmpeg_log_level: default_log_level(),
            extra_ffmpeg_args: Vec::new(),
        }
    }
}

impl EmbeddedConfig {
    /// Creates a new config with custom ffmpeg/ffprobe paths.
    pub fn with_paths(ffmpeg_path: PathBuf, ffprobe_path: PathBuf) -> Self {
        Self {
            ffmpeg_path,
            ffprobe_path,
            ..Default::default()
        }
    }

    /// Sets the scratch directory.
    pub fn with_scratch_dir(mut self, scratch_dir: PathBuf) -> Self {
        self.scratch_dir = scratch_dir;
        self
    }

    /// Enables re-encoding.
    pub fn with_reencode(mut self, reencode: bool) -> Self {
        self.reencode = reencode;
        self
    }
}
