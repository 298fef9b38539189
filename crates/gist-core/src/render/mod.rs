//! Target renderers for the query IR.
//!
//! Renderers convert the store-independent [`SelectQuery`] into query text
//! for one backing store, together with the parameter values that text
//! references.

mod sqlite;

pub use sqlite::SqliteRenderer;

use crate::error::GistResult;
use crate::ir::{ParamBindings, SelectQuery, ValueKind};
use serde_json::Value;
use std::collections::BTreeMap;

/// Output from rendering
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedQuery {
    /// The generated query string
    pub sql: String,
    /// Parameters to bind, keyed by placeholder name without prefix
    pub params: BTreeMap<String, Value>,
    /// Decoding hint per result column
    pub columns: Vec<ValueKind>,
}

/// Trait for rendering the IR to a target query language.
pub trait QueryRenderer: Send + Sync {
    /// Unique name for this renderer
    fn name(&self) -> &str;

    /// Render `query`, taking parameter values from `params`
    fn render(&self, query: &SelectQuery, params: &ParamBindings) -> GistResult<RenderedQuery>;
}
