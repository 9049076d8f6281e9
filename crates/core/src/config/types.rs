use serde::{Deserialize, Serialize};

pub use crate::backend::{EmbeddedConfig, RemoteConfig};

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub backend: BackendConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Processing backend selection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Which backend performs merge and trim
    pub kind: BackendKind,
    /// Remote service settings (required when kind = "remote")
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
    /// Embedded engine settings (defaults apply when omitted)
    #[serde(default)]
    pub embedded: Option<EmbeddedConfig>,
}

/// Available processing backends
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Remote,
    Embedded,
}

/// Limits applied to uploaded files
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadConfig {
    /// Maximum number of files in one upload
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    /// Maximum size of a single file in bytes
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_files: default_max_files(),
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

fn default_max_files() -> usize {
    16
}

fn default_max_file_bytes() -> u64 {
    4 * 1024 * 1024 * 1024 // 4 GiB
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// Default filter directive when RUST_LOG is not set (e.g. "info,clipforge_core=debug")
    #[serde(default)]
    pub filter: Option<String>,
}
