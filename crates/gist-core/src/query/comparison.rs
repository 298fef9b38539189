//! Filter operators.
//!
//! The operator vocabulary is closed. Each operator carries its request
//! symbols (the first one is canonical) and a classification that drives
//! both validation and compilation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Filter comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    // identity
    Null,
    NotNull,
    Eq,
    Ieq,
    Ne,

    // order
    Lt,
    Le,
    Gt,
    Ge,

    // collection
    In,
    NotIn,
    Empty,
    NotEmpty,

    // string
    Like,
    NotLike,
    StartsLike,
    NotStartsLike,
    EndsLike,
    NotEndsLike,
    Ilike,
    NotIlike,
    StartsWith,
    NotStartsWith,
    EndsWith,
    NotEndsWith,

    // access
    CanRead,
    CanWrite,
    CanDataRead,
    CanDataWrite,
    CanAccess,
}

impl Comparison {
    /// All operators in declaration order
    pub const ALL: [Comparison; 30] = [
        Comparison::Null,
        Comparison::NotNull,
        Comparison::Eq,
        Comparison::Ieq,
        Comparison::Ne,
        Comparison::Lt,
        Comparison::Le,
        Comparison::Gt,
        Comparison::Ge,
        Comparison::In,
        Comparison::NotIn,
        Comparison::Empty,
        Comparison::NotEmpty,
        Comparison::Like,
        Comparison::NotLike,
        Comparison::StartsLike,
        Comparison::NotStartsLike,
        Comparison::EndsLike,
        Comparison::NotEndsLike,
        Comparison::Ilike,
        Comparison::NotIlike,
        Comparison::StartsWith,
        Comparison::NotStartsWith,
        Comparison::EndsWith,
        Comparison::NotEndsWith,
        Comparison::CanRead,
        Comparison::CanWrite,
        Comparison::CanDataRead,
        Comparison::CanDataWrite,
        Comparison::CanAccess,
    ];

    /// Request symbols; the first is the canonical spelling.
    pub fn symbols(self) -> &'static [&'static str] {
        match self {
            Comparison::Null => &["null"],
            Comparison::NotNull => &["!null"],
            Comparison::Eq => &["eq"],
            Comparison::Ieq => &["ieq"],
            Comparison::Ne => &["!eq", "ne", "neq"],
            Comparison::Lt => &["lt"],
            Comparison::Le => &["le", "lte"],
            Comparison::Gt => &["gt"],
            Comparison::Ge => &["ge", "gte"],
            Comparison::In => &["in"],
            Comparison::NotIn => &["!in"],
            Comparison::Empty => &["empty"],
            Comparison::NotEmpty => &["!empty"],
            Comparison::Like => &["like"],
            Comparison::NotLike => &["!like"],
            Comparison::StartsLike => &["$like"],
            Comparison::NotStartsLike => &["!$like"],
            Comparison::EndsLike => &["like$"],
            Comparison::NotEndsLike => &["!like$"],
            Comparison::Ilike => &["ilike"],
            Comparison::NotIlike => &["!ilike"],
            Comparison::StartsWith => &["$ilike", "startswith"],
            Comparison::NotStartsWith => &["!$ilike", "!startswith"],
            Comparison::EndsWith => &["ilike$", "endswith"],
            Comparison::NotEndsWith => &["!ilike$", "!endswith"],
            Comparison::CanRead => &["canread"],
            Comparison::CanWrite => &["canwrite"],
            Comparison::CanDataRead => &["candataread"],
            Comparison::CanDataWrite => &["candatawrite"],
            Comparison::CanAccess => &["canaccess"],
        }
    }

    /// Canonical request symbol
    pub fn symbol(self) -> &'static str {
        self.symbols()[0]
    }

    /// Look up an operator by any of its symbols, ignoring case.
    pub fn parse(symbol: &str) -> Option<Comparison> {
        let symbol = symbol.trim().to_ascii_lowercase();
        Comparison::ALL
            .into_iter()
            .find(|op| op.symbols().contains(&symbol.as_str()))
    }

    /// Takes no argument
    pub fn is_unary(self) -> bool {
        matches!(
            self,
            Comparison::Null | Comparison::NotNull | Comparison::Empty | Comparison::NotEmpty
        )
    }

    /// Accepts more than one argument
    pub fn is_multi_value(self) -> bool {
        matches!(
            self,
            Comparison::In | Comparison::NotIn | Comparison::CanAccess
        )
    }

    pub fn is_identity_compare(self) -> bool {
        matches!(
            self,
            Comparison::Null
                | Comparison::NotNull
                | Comparison::Eq
                | Comparison::Ieq
                | Comparison::Ne
        )
    }

    pub fn is_order_compare(self) -> bool {
        matches!(
            self,
            Comparison::Lt | Comparison::Le | Comparison::Gt | Comparison::Ge
        )
    }

    pub fn is_collection_compare(self) -> bool {
        matches!(
            self,
            Comparison::In | Comparison::NotIn | Comparison::Empty | Comparison::NotEmpty
        )
    }

    pub fn is_emptiness_compare(self) -> bool {
        matches!(self, Comparison::Empty | Comparison::NotEmpty)
    }

    /// One of the `like` family; the argument becomes a pattern
    pub fn is_string_compare(self) -> bool {
        matches!(
            self,
            Comparison::Like
                | Comparison::NotLike
                | Comparison::StartsLike
                | Comparison::NotStartsLike
                | Comparison::EndsLike
                | Comparison::NotEndsLike
                | Comparison::Ilike
                | Comparison::NotIlike
                | Comparison::StartsWith
                | Comparison::NotStartsWith
                | Comparison::EndsWith
                | Comparison::NotEndsWith
        )
    }

    /// Compares against a user's sharing access instead of a property value
    pub fn is_access_compare(self) -> bool {
        matches!(
            self,
            Comparison::CanRead
                | Comparison::CanWrite
                | Comparison::CanDataRead
                | Comparison::CanDataWrite
                | Comparison::CanAccess
        )
    }

    pub fn is_case_insensitive(self) -> bool {
        matches!(
            self,
            Comparison::Ieq
                | Comparison::Ilike
                | Comparison::NotIlike
                | Comparison::StartsWith
                | Comparison::NotStartsWith
                | Comparison::EndsWith
                | Comparison::NotEndsWith
        )
    }

    pub fn is_negated(self) -> bool {
        matches!(
            self,
            Comparison::NotNull
                | Comparison::Ne
                | Comparison::NotIn
                | Comparison::NotEmpty
                | Comparison::NotLike
                | Comparison::NotStartsLike
                | Comparison::NotEndsLike
                | Comparison::NotIlike
                | Comparison::NotStartsWith
                | Comparison::NotEndsWith
        )
    }

    /// Fixed sharing pattern of the access operators; `can_access` takes
    /// its pattern from the second argument.
    pub fn access_pattern(self) -> Option<&'static str> {
        match self {
            Comparison::CanRead => Some("r%"),
            Comparison::CanWrite => Some("_w%"),
            Comparison::CanDataRead => Some("__r%"),
            Comparison::CanDataWrite => Some("___w%"),
            _ => None,
        }
    }

    /// Turn a `like` argument into a store pattern.
    ///
    /// Substring operators treat `*` and `?` as wildcards when present and
    /// match anywhere otherwise; prefix/suffix operators anchor the value.
    pub fn like_pattern(self, value: &str) -> String {
        match self {
            Comparison::Like | Comparison::NotLike | Comparison::Ilike | Comparison::NotIlike => {
                if value.contains('*') || value.contains('?') {
                    value.replace('*', "%").replace('?', "_")
                } else {
                    format!("%{}%", value)
                }
            }
            Comparison::StartsLike
            | Comparison::NotStartsLike
            | Comparison::StartsWith
            | Comparison::NotStartsWith => format!("{}%", value),
            Comparison::EndsLike
            | Comparison::NotEndsLike
            | Comparison::EndsWith
            | Comparison::NotEndsWith => format!("%{}", value),
            _ => value.to_string(),
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}
