//! Endpoint link configuration

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};

/// Configuration for synthesized endpoint links (`href`, `apiEndpoints`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointComponentConfig {
    /// Relative root all type endpoints hang off, e.g. `/api`
    #[serde(default = "default_api_root")]
    pub api_root: String,
    /// Scheme and host prepended when absolute URLs are requested
    #[serde(default)]
    pub absolute_base: Option<String>,
}

fn default_api_root() -> String {
    "/api".to_string()
}

impl Default for EndpointComponentConfig {
    fn default() -> Self {
        Self {
            api_root: default_api_root(),
            absolute_base: None,
        }
    }
}

impl EndpointComponentConfig {
    /// Root to prefix endpoint paths with.
    pub fn endpoint_root(&self, absolute: bool) -> String {
        let root = self.api_root.trim_end_matches('/');
        match (&self.absolute_base, absolute) {
            (Some(base), true) => format!("{}{}", base.trim_end_matches('/'), root),
            _ => root.to_string(),
        }
    }

    pub(crate) fn validate(&self) -> ConfigResult<()> {
        if !self.api_root.is_empty() && !self.api_root.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                field: "endpoints.api_root".to_string(),
                value: format!("`{}` must start with `/`", self.api_root),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_root() {
        let config = EndpointComponentConfig::default();
        assert_eq!(config.endpoint_root(false), "/api");
        assert_eq!(config.endpoint_root(true), "/api");
    }

    #[test]
    fn test_absolute_root() {
        let config = EndpointComponentConfig {
            api_root: "/api/".to_string(),
            absolute_base: Some("https://play.example.org/".to_string()),
        };
        assert_eq!(config.endpoint_root(true), "https://play.example.org/api");
        assert_eq!(config.endpoint_root(false), "/api");
    }

    #[test]
    fn test_root_must_be_absolute_path() {
        let config = EndpointComponentConfig {
            api_root: "api".to_string(),
            absolute_base: None,
        };
        assert!(config.validate().is_err());
    }
}
