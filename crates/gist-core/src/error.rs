//! Error types for the gist pipeline
//!
//! Each variant maps to one failure class so callers can pick a response
//! status without inspecting message text.

use thiserror::Error;

/// Gist pipeline error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GistError {
    /// Malformed request syntax or unknown preset token
    #[error("{0}")]
    Specification(String),

    /// Persistence, readability or arity violation found by the validator
    #[error("{0}")]
    Validation(String),

    /// Ownership or field visibility denied to the caller
    #[error("{0}")]
    AccessDenied(String),

    /// The compiler hit a state the validator should have rejected
    #[error("Compilation invariant violated: {0}")]
    CompilationInvariant(String),

    /// The executor failed to run a compiled query
    #[error("Execution failed: {0}")]
    Execution(String),
}

impl GistError {
    /// True for errors caused by the request itself
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            GistError::Specification(_) | GistError::Validation(_) | GistError::AccessDenied(_)
        )
    }

    /// True when the caller lacks permission
    pub fn is_access_denied(&self) -> bool {
        matches!(self, GistError::AccessDenied(_))
    }

    pub(crate) fn invariant(message: impl Into<String>) -> Self {
        GistError::CompilationInvariant(message.into())
    }
}

/// Result type for gist operations
pub type GistResult<T> = Result<T, GistError>;
