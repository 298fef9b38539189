//! SQLite execution backend for gist queries
//!
//! This crate runs queries rendered by [`gist_core::SqliteRenderer`] against
//! a SQLite database and creates the tables a schema registry describes.
//!
//! ## Features
//!
//! - **GistExecutor**: Named parameter binding and per-column decoding
//! - **Schema DDL**: One table per type plus shared link tables
//! - **Case-sensitive LIKE**: So `like` and `ilike` filters differ
//! - **Thread Safety**: Arc<Mutex<Connection>> pattern for concurrent access
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gist_sqlite::{SqliteConfig, SqliteExecutor, SqlitePool};
//! use gist_core::GistService;
//!
//! let pool = SqlitePool::new(SqliteConfig::new("./gist.db"))?;
//! pool.apply_schema(registry.as_ref())?;
//! let service = GistService::new(registry, access, SqliteExecutor::new(pool), config);
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod executor;
pub mod schema;

// Re-exports
pub use config::SqliteConfig;
pub use connection::SqlitePool;
pub use error::{SqliteError, SqliteResult};
pub use executor::SqliteExecutor;
pub use schema::apply_schema;
