//! Loading configuration from TOML

use crate::{ConfigError, ConfigResult, GistConfig};
use std::path::Path;
use tracing::{debug, info};

/// Loads and validates [`GistConfig`] values.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Parse configuration from TOML text and validate it.
    pub fn from_str(contents: &str) -> ConfigResult<GistConfig> {
        let config: GistConfig = toml::from_str(contents)?;
        config.validate()?;
        debug!(
            default_page_size = config.query.default_page_size,
            max_page_size = config.query.max_page_size,
            "Parsed gist configuration"
        );
        Ok(config)
    }

    /// Read configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<GistConfig> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_str(&contents)?;
        info!(path = %path.display(), "Loaded gist configuration");
        Ok(config)
    }

    /// Read configuration from `path` when it exists, defaults otherwise.
    pub fn from_file_or_default(path: impl AsRef<Path>) -> ConfigResult<GistConfig> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Ok(GistConfig::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ConfigLoader::from_str("").unwrap();
        assert_eq!(config, GistConfig::default());
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let result = ConfigLoader::from_str("query = [");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_validation_runs_on_load() {
        let toml = r#"
            [query]
            default_page_size = 500
            max_page_size = 100
        "#;
        let result = ConfigLoader::from_str(toml);
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_missing_file_falls_back_to_default() {
        let config = ConfigLoader::from_file_or_default("/definitely/not/here/gist.toml").unwrap();
        assert_eq!(config.query.default_page_size, 50);
    }
}
