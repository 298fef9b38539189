//! Connection configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Path used for in-memory databases
pub const MEMORY_PATH: &str = ":memory:";

/// SQLite connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqliteConfig {
    /// Database file, or `:memory:`
    pub path: PathBuf,
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    #[serde(default = "default_true")]
    pub foreign_keys: bool,
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u32,
    /// Make `LIKE` case sensitive so `like` and `ilike` differ
    #[serde(default = "default_true")]
    pub case_sensitive_like: bool,
}

fn default_true() -> bool {
    true
}

fn default_busy_timeout() -> u32 {
    5000
}

impl SqliteConfig {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            wal_mode: true,
            foreign_keys: true,
            busy_timeout_ms: default_busy_timeout(),
            case_sensitive_like: true,
        }
    }

    /// In-memory database for tests and scratch use
    pub fn memory() -> Self {
        Self {
            wal_mode: false,
            ..Self::new(MEMORY_PATH)
        }
    }

    pub fn is_memory(&self) -> bool {
        self.path.to_str() == Some(MEMORY_PATH)
    }

    pub fn with_busy_timeout(mut self, millis: u32) -> Self {
        self.busy_timeout_ms = millis;
        self
    }

    pub fn with_case_sensitive_like(mut self, enabled: bool) -> Self {
        self.case_sensitive_like = enabled;
        self
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self::memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_config() {
        let config = SqliteConfig::memory();
        assert!(config.is_memory());
        assert!(!config.wal_mode);
        assert!(config.case_sensitive_like);
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: SqliteConfig = serde_json::from_str(r#"{"path": "gist.db"}"#).unwrap();
        assert_eq!(config.path, PathBuf::from("gist.db"));
        assert_eq!(config.busy_timeout_ms, 5000);
        assert!(config.wal_mode);
        assert!(!config.is_memory());
    }
}
