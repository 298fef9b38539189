//! Store-independent query representation.
//!
//! The compiler builds a [`SelectQuery`] expression tree; renderers turn it
//! into a concrete query language. Nothing in here knows about SQL text.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Named parameter values of a compiled query.
///
/// Array values are only valid as the list of an [`Expr::InList`]; renderers
/// expand them into one placeholder per element.
pub type ParamBindings = BTreeMap<String, Value>;

/// Decoding hint for one projected column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
    Any,
    Text,
    Integer,
    Number,
    Boolean,
    /// JSON document stored as text
    Json,
    /// Always null; filled by row transformers
    Null,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub expr: Expr,
    pub kind: ValueKind,
}

impl Projection {
    pub fn new(expr: Expr, kind: ValueKind) -> Self {
        Self { expr, kind }
    }

    /// Placeholder column for values computed after fetching
    pub fn null() -> Self {
        Self::new(Expr::Null, ValueKind::Null)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    pub table: String,
    pub alias: String,
}

impl TableRef {
    pub fn new(table: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            alias: alias.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderTerm {
    pub expr: Expr,
    pub direction: SortDirection,
}

impl OrderTerm {
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(expr: Expr) -> Self {
        Self {
            expr,
            direction: SortDirection::Desc,
        }
    }
}

/// One SELECT over a single table; relations are reached via subqueries
/// or [`Expr::Dereference`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectQuery {
    pub projections: Vec<Projection>,
    pub from: TableRef,
    pub filter: Option<Expr>,
    pub order_by: Vec<OrderTerm>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl SelectQuery {
    pub fn new(from: TableRef) -> Self {
        Self {
            projections: Vec::new(),
            from,
            filter: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn project(mut self, expr: Expr, kind: ValueKind) -> Self {
        self.projections.push(Projection::new(expr, kind));
        self
    }

    /// AND a condition onto the filter
    pub fn and_where(mut self, condition: Expr) -> Self {
        self.filter = Some(match self.filter.take() {
            None => condition,
            Some(Expr::And(mut parts)) => {
                parts.push(condition);
                Expr::And(parts)
            }
            Some(existing) => Expr::And(vec![existing, condition]),
        });
        self
    }

    pub fn order(mut self, term: OrderTerm) -> Self {
        self.order_by.push(term);
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Value kinds of the projected columns
    pub fn column_kinds(&self) -> Vec<ValueKind> {
        self.projections.iter().map(|p| p.kind).collect()
    }

    /// Whether any projection is a subquery (scalar, exists or aggregate)
    pub fn has_subquery_projection(&self) -> bool {
        self.projections.iter().any(|p| p.expr.contains_subquery())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Function {
    Lower,
    Length,
    Coalesce,
    /// Length of a JSON array document
    JsonArrayLength,
    /// Extract a value from a JSON document at a path
    JsonExtract,
    /// Build a JSON object from alternating key/value arguments
    JsonObject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Aggregate {
    CountAll,
    /// JSON array of the argument over all rows, ordered
    JsonArray {
        arg: Box<Expr>,
        order_by: Vec<OrderTerm>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    /// String concatenation
    Concat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Null,
    /// Constant inlined into the query text
    Literal(Value),
    /// Named parameter bound at execution
    Param(String),
    Column {
        table: String,
        column: String,
    },
    /// Column of a row reached through a non-null foreign key: a path read
    /// that renderers express as a join, never as a subquery
    Dereference {
        table: String,
        column: String,
        target_table: String,
        target_key: String,
        target_column: String,
    },
    Function {
        func: Function,
        args: Vec<Expr>,
    },
    /// Conversion of a value to the storage class of `kind`
    Cast {
        expr: Box<Expr>,
        kind: ValueKind,
    },
    Aggregate(Aggregate),
    /// Scalar subquery
    Subquery(Box<SelectQuery>),
    Exists {
        query: Box<SelectQuery>,
        negated: bool,
    },
    Not(Box<Expr>),
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    InSubquery {
        expr: Box<Expr>,
        query: Box<SelectQuery>,
        negated: bool,
    },
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        negated: bool,
    },
    And(Vec<Expr>),
    Or(Vec<Expr>),
}

impl Expr {
    pub fn column(table: impl Into<String>, column: impl Into<String>) -> Self {
        Expr::Column {
            table: table.into(),
            column: column.into(),
        }
    }

    pub fn param(name: impl Into<String>) -> Self {
        Expr::Param(name.into())
    }

    pub fn text(value: impl Into<String>) -> Self {
        Expr::Literal(Value::String(value.into()))
    }

    pub fn int(value: i64) -> Self {
        Expr::Literal(Value::from(value))
    }

    pub fn call(func: Function, args: Vec<Expr>) -> Self {
        Expr::Function { func, args }
    }

    pub fn lower(self) -> Self {
        Expr::call(Function::Lower, vec![self])
    }

    pub fn cast(self, kind: ValueKind) -> Self {
        Expr::Cast {
            expr: Box::new(self),
            kind,
        }
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn equals(self, other: Expr) -> Self {
        Expr::binary(BinaryOp::Eq, self, other)
    }

    pub fn is_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    pub fn is_not_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }

    pub fn like(self, pattern: Expr, negated: bool) -> Self {
        Expr::Like {
            expr: Box::new(self),
            pattern: Box::new(pattern),
            negated,
        }
    }

    pub fn in_list(self, list: Vec<Expr>, negated: bool) -> Self {
        Expr::InList {
            expr: Box::new(self),
            list,
            negated,
        }
    }

    pub fn in_subquery(self, query: SelectQuery, negated: bool) -> Self {
        Expr::InSubquery {
            expr: Box::new(self),
            query: Box::new(query),
            negated,
        }
    }

    pub fn exists(query: SelectQuery) -> Self {
        Expr::Exists {
            query: Box::new(query),
            negated: false,
        }
    }

    pub fn not_exists(query: SelectQuery) -> Self {
        Expr::Exists {
            query: Box::new(query),
            negated: true,
        }
    }

    pub fn subquery(query: SelectQuery) -> Self {
        Expr::Subquery(Box::new(query))
    }

    pub fn negate(self) -> Self {
        Expr::Not(Box::new(self))
    }

    pub fn count_all() -> Self {
        Expr::Aggregate(Aggregate::CountAll)
    }

    /// Combine with AND, flattening a single element
    pub fn all(mut parts: Vec<Expr>) -> Self {
        if parts.len() == 1 {
            parts.remove(0)
        } else {
            Expr::And(parts)
        }
    }

    /// Combine with OR, flattening a single element
    pub fn any(mut parts: Vec<Expr>) -> Self {
        if parts.len() == 1 {
            parts.remove(0)
        } else {
            Expr::Or(parts)
        }
    }

    /// Whether this expression embeds a nested SELECT
    pub fn contains_subquery(&self) -> bool {
        match self {
            Expr::Subquery(_) | Expr::Exists { .. } | Expr::InSubquery { .. } => true,
            Expr::Null
            | Expr::Literal(_)
            | Expr::Param(_)
            | Expr::Column { .. }
            | Expr::Dereference { .. } => false,
            Expr::Function { args, .. } => args.iter().any(Expr::contains_subquery),
            Expr::Cast { expr, .. } => expr.contains_subquery(),
            Expr::Aggregate(Aggregate::CountAll) => false,
            Expr::Aggregate(Aggregate::JsonArray { arg, .. }) => arg.contains_subquery(),
            Expr::Not(inner) => inner.contains_subquery(),
            Expr::IsNull { expr, .. } => expr.contains_subquery(),
            Expr::Binary { left, right, .. } => {
                left.contains_subquery() || right.contains_subquery()
            }
            Expr::InList { expr, list, .. } => {
                expr.contains_subquery() || list.iter().any(Expr::contains_subquery)
            }
            Expr::Like { expr, pattern, .. } => {
                expr.contains_subquery() || pattern.contains_subquery()
            }
            Expr::And(parts) | Expr::Or(parts) => parts.iter().any(Expr::contains_subquery),
        }
    }
}
