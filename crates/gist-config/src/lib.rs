//! # Gist Configuration Library
//!
//! Type-safe configuration for the gist object-list query engine.
//!
//! ## Features
//!
//! - TOML loading with per-field defaults, so an empty file is a valid config
//! - Validation of page size bounds and endpoint roots
//! - Shared detail-level vocabulary ([`AutoDetail`]) used by the planner
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gist_config::ConfigLoader;
//!
//! let config = ConfigLoader::from_file("gist.toml")?;
//! assert!(config.query.default_page_size <= config.query.max_page_size);
//! # Ok::<(), gist_config::ConfigError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod components;
mod error;
mod loader;

pub use components::*;
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

use serde::{Deserialize, Serialize};

/// Root configuration of the query engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GistConfig {
    /// Query planning and paging defaults
    #[serde(default)]
    pub query: QueryComponentConfig,
    /// Endpoint link synthesis
    #[serde(default)]
    pub endpoints: EndpointComponentConfig,
}

impl GistConfig {
    /// Check cross-field invariants that serde defaults cannot express.
    pub fn validate(&self) -> ConfigResult<()> {
        self.query.validate()?;
        self.endpoints.validate()?;
        Ok(())
    }
}
