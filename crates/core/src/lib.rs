//! Media-edit session coordination.
//!
//! An [`EditSession`] takes uploaded clips through merge, trim, preview and
//! download over a pluggable [`ProcessingBackend`]: a remote HTTP service or an
//! embedded engine that needs a one-time asynchronous load.

pub mod backend;
pub mod config;
pub mod error;
pub mod media;
pub mod session;
pub mod testing;
pub mod validation;

pub use backend::{
    create_backend, EmbeddedBackend, EmbeddedConfig, Engine, FfmpegEngine, ProcessingBackend,
    RemoteBackend, RemoteConfig,
};
pub use config::{
    load_config, load_config_from_str, validate_config, BackendConfig, BackendKind, Config,
    ConfigError, LogFormat, LoggingConfig, UploadConfig,
};
pub use error::{ErrorKind, Result, SessionError};
pub use media::{MediaHandle, MediaId, MediaSummary, UploadBatch, UploadFile};
pub use session::{EditSession, JobKind, JobToken, SessionSnapshot, SessionSummary, Stage};
pub use validation::TrimRange;
