//! Request syntax parsers.
//!
//! The field list is parsed with chumsky (it nests); filters and orders are
//! flat and use cached regexes.

mod common;
mod fields;
mod filters;

pub use fields::{parse_fields, split_sub_fields};
pub use filters::{parse_filter, parse_filters, parse_orders};
