use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Prefix for environment overrides, e.g. `CLIPFORGE_BACKEND__KIND=embedded`.
const ENV_PREFIX: &str = "CLIPFORGE_";

/// Load configuration from file with environment variable overrides
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendKind;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[backend]
kind = "remote"

[backend.remote]
base_url = "http://localhost:3001"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.backend.kind, BackendKind::Remote);
        assert_eq!(
            config.backend.remote.unwrap().base_url,
            "http://localhost:3001"
        );
    }

    #[test]
    fn test_load_config_from_str_missing_backend() {
        let toml = r#"
[upload]
max_files = 4
"#;
        let result = load_config_from_str(toml);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/clipforge.toml"));
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[backend]
kind = "embedded"

[backend.embedded]
ffmpeg_path = "/opt/ffmpeg/bin/ffmpeg"
reencode = true
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.backend.kind, BackendKind::Embedded);
        let embedded = config.backend.embedded.unwrap();
        assert_eq!(
            embedded.ffmpeg_path.to_str().unwrap(),
            "/opt/ffmpeg/bin/ffmpeg"
        );
        assert!(embedded.reencode);
    }
}
