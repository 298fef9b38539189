//! # Gist Core
//!
//! Declarative object-list queries over a runtime schema.
//!
//! A list request names an element type, the fields to return, filters,
//! orders and a page window. The request passes through a fixed pipeline:
//!
//! - **Planning** expands presets (`*`, `:identifiable`, ...) and shorthand,
//!   resolves each field's transformation and adds support fields
//! - **Validation** rejects unknown, unreadable or non-persisted properties
//!   and malformed filters before anything touches the store
//! - **Compilation** produces a store-independent query IR, the parameter
//!   values it references and an ordered list of row transformers
//! - **Rendering** turns the IR into SQL for one backing store
//! - **Paging** derives page position, totals and links
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gist_core::{GistParams, GistService, OutputFormat};
//!
//! let service = GistService::new(registry, access, executor, config);
//! let params = GistParams::from_query_string("fields=name,tags::ids&filter=name:like:Acme")?;
//! let response = service.list_params("Widget", None, &params)?;
//! ```

pub mod access;
pub mod compiler;
pub mod error;
pub mod ir;
pub mod output;
pub mod pager;
pub mod params;
pub mod pipeline;
pub mod planner;
pub mod query;
pub mod render;
pub mod schema;
pub mod service;
pub mod syntax;
pub mod transform;
pub mod validator;
pub mod values;

#[cfg(test)]
pub(crate) mod test_fixtures;

// Re-exports
pub use access::{AccessControl, AccessSummary, SuperuserAccess};
pub use compiler::{CompiledQuery, GistCompiler};
pub use error::{GistError, GistResult};
pub use output::{GistOutput, OutputFormat};
pub use pager::GistPager;
pub use params::GistParams;
pub use planner::GistPlanner;
pub use query::{
    AutoDetail, Comparison, Direction, Field, Filter, GistQuery, Order, Owner, Paging, Transform,
};
pub use render::{QueryRenderer, RenderedQuery, SqliteRenderer};
pub use schema::{
    AttributeMeta, PropertyMeta, PropertyRole, PropertyType, SchemaRegistry, StaticSchemaRegistry,
    TypeSchema,
};
pub use service::{GistExecutor, GistResponse, GistService};
pub use transform::{Row, RowTransformer, RowTransformers};
pub use validator::GistValidator;
