//! Query component configuration
//!
//! Paging bounds and planning defaults applied when a request leaves them open.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Coarse detail level deciding which properties `*` expands to and how
/// collections are rendered when a field does not say.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AutoDetail {
    /// Identifiers and names only
    Xs,
    /// Simple properties and references, no collections
    S,
    /// Collections rendered as their size
    M,
    /// Collections rendered as identifier lists
    L,
    /// Collections rendered as identifier objects
    Xl,
}

impl AutoDetail {
    /// Whether collection properties are part of the `*` preset
    pub fn includes_collections(self) -> bool {
        self >= AutoDetail::M
    }

    /// Whether only identifiable/nameable core properties are included
    pub fn is_minimal(self) -> bool {
        self == AutoDetail::Xs
    }
}

impl Default for AutoDetail {
    fn default() -> Self {
        AutoDetail::M
    }
}

impl fmt::Display for AutoDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AutoDetail::Xs => "XS",
            AutoDetail::S => "S",
            AutoDetail::M => "M",
            AutoDetail::L => "L",
            AutoDetail::Xl => "XL",
        };
        f.write_str(s)
    }
}

impl FromStr for AutoDetail {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "XS" => Ok(AutoDetail::Xs),
            "S" => Ok(AutoDetail::S),
            "M" => Ok(AutoDetail::M),
            "L" => Ok(AutoDetail::L),
            "XL" => Ok(AutoDetail::Xl),
            other => Err(ConfigError::InvalidValue {
                field: "auto".to_string(),
                value: format!("unknown detail level `{}`", other),
            }),
        }
    }
}

/// Query component configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryComponentConfig {
    /// Page size used when a request does not name one
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
    /// Upper bound a request's page size is clamped to
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
    /// Detail level used when a request does not name one
    #[serde(default)]
    pub default_auto: AutoDetail,
    /// Locale used for translation when a request does not name one
    #[serde(default = "default_locale")]
    pub default_locale: String,
    /// Whether the synthetic `apiEndpoints` field is added by default
    #[serde(default = "default_true")]
    pub references: bool,
    /// Maximum number of filters a single request may carry
    #[serde(default = "default_max_filters")]
    pub max_filters: usize,
}

fn default_page_size() -> u32 {
    50
}

fn default_max_page_size() -> u32 {
    1000
}

fn default_locale() -> String {
    "en".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_filters() -> usize {
    64
}

impl Default for QueryComponentConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            default_auto: AutoDetail::default(),
            default_locale: default_locale(),
            references: true,
            max_filters: default_max_filters(),
        }
    }
}

impl QueryComponentConfig {
    /// Clamp a requested page size into `1..=max_page_size`.
    pub fn clamp_page_size(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size)
    }

    pub(crate) fn validate(&self) -> ConfigResult<()> {
        if self.max_page_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "query.max_page_size".to_string(),
                value: "must be at least 1".to_string(),
            });
        }
        if self.default_page_size == 0 || self.default_page_size > self.max_page_size {
            return Err(ConfigError::InvalidValue {
                field: "query.default_page_size".to_string(),
                value: format!(
                    "{} is outside 1..={}",
                    self.default_page_size, self.max_page_size
                ),
            });
        }
        if self.default_locale.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "query.default_locale".to_string(),
                value: "must not be blank".to_string(),
            });
        }
        Ok(())
    }
}
