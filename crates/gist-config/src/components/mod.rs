//! Configuration components
//!
//! One module per concern; each has its own defaults.

pub mod endpoints;
pub mod query;

pub use endpoints::*;
pub use query::*;
