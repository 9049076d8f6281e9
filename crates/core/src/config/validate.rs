use super::{
    types::{BackendKind, Config},
    ConfigError,
};

/// Validate configuration
/// Currently validates:
/// - Backend section matches the selected kind (remote requires `[backend.remote]`)
/// - Remote base URL is http(s) and endpoint paths are absolute
/// - Upload limits are non-zero
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.backend.kind == BackendKind::Remote {
        let remote = config.backend.remote.as_ref().ok_or_else(|| {
            ConfigError::ValidationError(
                "backend.kind is \"remote\" but [backend.remote] is missing".to_string(),
            )
        })?;

        let url = reqwest::Url::parse(&remote.base_url).map_err(|e| {
            ConfigError::ValidationError(format!(
                "backend.remote.base_url is not a valid URL: {}",
                e
            ))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::ValidationError(format!(
                "backend.remote.base_url must use http or https, got {}",
                url.scheme()
            )));
        }

        for (name, path) in [
            ("merge_path", &remote.merge_path),
            ("trim_path", &remote.trim_path),
        ] {
            if !path.starts_with('/') {
                return Err(ConfigError::ValidationError(format!(
                    "backend.remote.{} must start with '/'",
                    name
                )));
            }
        }
    }

    if config.upload.max_files == 0 {
        return Err(ConfigError::ValidationError(
            "upload.max_files cannot be 0".to_string(),
        ));
    }
    if config.upload.max_file_bytes == 0 {
        return Err(ConfigError::ValidationError(
            "upload.max_file_bytes cannot be 0".to_string(),
        ));
    }

    Ok(())
}
