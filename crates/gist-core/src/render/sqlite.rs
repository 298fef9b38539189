//! SQLite query renderer.
//!
//! Renders the IR to SQLite SQL with:
//! - `LEFT JOIN`s for dereferenced required references, one per scope
//! - Correlated subqueries on a single line
//! - Named `:param` placeholders, IN-list arrays expanded to `:name_<i>`
//!
//! JSON documents (sharing, translations, attribute values, embedded
//! collections) are stored as text and read with the JSON1 functions.

use crate::error::{GistError, GistResult};
use crate::ir::{
    Aggregate, BinaryOp, Expr, Function, OrderTerm, ParamBindings, SelectQuery, SortDirection,
    ValueKind,
};
use crate::render::{QueryRenderer, RenderedQuery};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use tracing::trace;

static PLAIN_IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Identifiers that must be quoted even though they look plain
const KEYWORDS: &[&str] = &[
    "all", "and", "as", "by", "check", "default", "from", "group", "in", "index", "is", "key",
    "limit", "not", "null", "offset", "or", "order", "references", "select", "table", "values",
    "where",
];

/// Quote an identifier when SQLite would not accept it bare
fn ident(name: &str) -> Cow<'_, str> {
    if PLAIN_IDENTIFIER.is_match(name) && !KEYWORDS.contains(&name.to_ascii_lowercase().as_str())
    {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("\"{}\"", name.replace('"', "\"\"")))
    }
}

fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

fn literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => "0".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote(s),
        other => quote(&other.to_string()),
    }
}

fn operator(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Eq => "=",
        BinaryOp::NotEq => "<>",
        BinaryOp::Lt => "<",
        BinaryOp::LtEq => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::GtEq => ">=",
        BinaryOp::Concat => "||",
    }
}

fn function_name(func: Function) -> &'static str {
    match func {
        Function::Lower => "lower",
        Function::Length => "length",
        Function::Coalesce => "coalesce",
        Function::JsonArrayLength => "json_array_length",
        Function::JsonExtract => "json_extract",
        Function::JsonObject => "json_object",
    }
}

fn storage_class(kind: ValueKind) -> &'static str {
    match kind {
        ValueKind::Integer | ValueKind::Boolean => "INTEGER",
        ValueKind::Number => "REAL",
        ValueKind::Text | ValueKind::Json | ValueKind::Any | ValueKind::Null => "TEXT",
    }
}

/// SQLite renderer.
///
/// Expects every table to be addressable by the names the schema registry
/// declares; see `gist-sqlite` for the matching DDL.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteRenderer;

impl SqliteRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl QueryRenderer for SqliteRenderer {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn render(&self, query: &SelectQuery, params: &ParamBindings) -> GistResult<RenderedQuery> {
        let mut rendering = Rendering {
            bindings: params,
            params: BTreeMap::new(),
            joins: 0,
        };
        let sql = rendering.select(query, true)?;
        trace!(sql = %sql, params = rendering.params.len(), "rendered sqlite query");
        Ok(RenderedQuery {
            sql,
            params: rendering.params,
            columns: query.column_kinds(),
        })
    }
}

/// Joins introduced while rendering one SELECT
#[derive(Default)]
struct Scope {
    joins: Vec<String>,
    aliases: HashMap<(String, String, String), String>,
}

/// State of one render call
struct Rendering<'p> {
    bindings: &'p ParamBindings,
    params: BTreeMap<String, Value>,
    joins: usize,
}

impl<'p> Rendering<'p> {
    /// Top-level queries put each clause on its own line; subqueries stay
    /// on one.
    fn select(&mut self, query: &SelectQuery, top: bool) -> GistResult<String> {
        let mut scope = Scope::default();
        let mut columns = Vec::with_capacity(query.projections.len());
        for projection in &query.projections {
            columns.push(self.expr(&projection.expr, &mut scope)?);
        }
        let filter = match &query.filter {
            Some(Expr::And(parts)) if top && !parts.is_empty() => {
                let mut rendered = Vec::with_capacity(parts.len());
                for part in parts {
                    rendered.push(self.operand(part, &mut scope)?);
                }
                Some(rendered.join("\n  AND "))
            }
            Some(filter) => Some(self.expr(filter, &mut scope)?),
            None => None,
        };
        let orders = self.orders(&query.order_by, &mut scope)?;

        let sep = if top { "\n" } else { " " };
        let mut sql = format!(
            "SELECT {}{}FROM {} {}",
            if columns.is_empty() { "1".to_string() } else { columns.join(", ") },
            sep,
            ident(&query.from.table),
            ident(&query.from.alias)
        );
        for join in &scope.joins {
            sql.push_str(sep);
            sql.push_str(join);
        }
        if let Some(filter) = filter {
            sql.push_str(&format!("{}WHERE {}", sep, filter));
        }
        if !orders.is_empty() {
            sql.push_str(&format!("{}ORDER BY {}", sep, orders));
        }
        match (query.limit, query.offset) {
            (Some(limit), Some(offset)) => {
                sql.push_str(&format!("{}LIMIT {} OFFSET {}", sep, limit, offset))
            }
            (Some(limit), None) => sql.push_str(&format!("{}LIMIT {}", sep, limit)),
            (None, Some(offset)) => sql.push_str(&format!("{}LIMIT -1 OFFSET {}", sep, offset)),
            (None, None) => {}
        }
        Ok(sql)
    }

    fn orders(&mut self, terms: &[OrderTerm], scope: &mut Scope) -> GistResult<String> {
        let mut rendered = Vec::with_capacity(terms.len());
        for term in terms {
            let direction = match term.direction {
                SortDirection::Asc => "ASC",
                SortDirection::Desc => "DESC",
            };
            rendered.push(format!("{} {}", self.expr(&term.expr, scope)?, direction));
        }
        Ok(rendered.join(", "))
    }

    /// Expression wrapped in parentheses when it is a junction
    fn operand(&mut self, expr: &Expr, scope: &mut Scope) -> GistResult<String> {
        let rendered = self.expr(expr, scope)?;
        Ok(match expr {
            Expr::And(parts) | Expr::Or(parts) if parts.len() > 1 => format!("({})", rendered),
            _ => rendered,
        })
    }

    fn param(&mut self, name: &str) -> GistResult<String> {
        let value = self.bindings.get(name).ok_or_else(|| {
            GistError::invariant(format!("parameter `{}` is not bound", name))
        })?;
        if value.is_array() {
            return Err(GistError::invariant(format!(
                "array parameter `{}` used outside an IN list",
                name
            )));
        }
        self.params.insert(name.to_string(), value.clone());
        Ok(format!(":{}", name))
    }

    fn dereference(
        &mut self,
        scope: &mut Scope,
        table: &str,
        column: &str,
        target_table: &str,
        target_key: &str,
    ) -> String {
        let key = (table.to_string(), column.to_string(), target_table.to_string());
        if let Some(alias) = scope.aliases.get(&key) {
            return alias.clone();
        }
        self.joins += 1;
        let alias = format!("d_{}", self.joins);
        scope.joins.push(format!(
            "LEFT JOIN {} {} ON {}.{} = {}.{}",
            ident(target_table),
            alias,
            alias,
            ident(target_key),
            ident(table),
            ident(column)
        ));
        scope.aliases.insert(key, alias.clone());
        alias
    }

    fn in_list(
        &mut self,
        expr: &Expr,
        list: &[Expr],
        negated: bool,
        scope: &mut Scope,
    ) -> GistResult<String> {
        let bindings = self.bindings;
        let mut items = Vec::new();
        for item in list {
            match item {
                Expr::Param(name) => match bindings.get(name) {
                    Some(Value::Array(values)) => {
                        for (i, value) in values.iter().enumerate() {
                            let expanded = format!("{}_{}", name, i);
                            items.push(format!(":{}", expanded));
                            self.params.insert(expanded, value.clone());
                        }
                    }
                    _ => items.push(self.param(name)?),
                },
                other => items.push(self.expr(other, scope)?),
            }
        }
        if items.is_empty() {
            return Ok(if negated { "1 = 1" } else { "0 = 1" }.to_string());
        }
        Ok(format!(
            "{} {}IN ({})",
            self.operand(expr, scope)?,
            if negated { "NOT " } else { "" },
            items.join(", ")
        ))
    }

    fn expr(&mut self, expr: &Expr, scope: &mut Scope) -> GistResult<String> {
        Ok(match expr {
            Expr::Null => "NULL".to_string(),
            Expr::Literal(value) => literal(value),
            Expr::Param(name) => self.param(name)?,
            Expr::Column { table, column } => format!("{}.{}", ident(table), ident(column)),
            Expr::Dereference {
                table,
                column,
                target_table,
                target_key,
                target_column,
            } => {
                let alias = self.dereference(scope, table, column, target_table, target_key);
                format!("{}.{}", alias, ident(target_column))
            }
            Expr::Function { func, args } => {
                let mut rendered = Vec::with_capacity(args.len());
                for arg in args {
                    rendered.push(self.expr(arg, scope)?);
                }
                format!("{}({})", function_name(*func), rendered.join(", "))
            }
            Expr::Cast { expr, kind } => {
                format!("CAST({} AS {})", self.expr(expr, scope)?, storage_class(*kind))
            }
            Expr::Aggregate(Aggregate::CountAll) => "COUNT(*)".to_string(),
            Expr::Aggregate(Aggregate::JsonArray { arg, order_by }) => {
                let arg = self.expr(arg, scope)?;
                if order_by.is_empty() {
                    format!("json_group_array({})", arg)
                } else {
                    let orders = self.orders(order_by, scope)?;
                    format!("json_group_array({} ORDER BY {})", arg, orders)
                }
            }
            Expr::Subquery(query) => format!("({})", self.select(query, false)?),
            Expr::Exists { query, negated } => format!(
                "{}EXISTS ({})",
                if *negated { "NOT " } else { "" },
                self.select(query, false)?
            ),
            Expr::Not(inner) => format!("NOT ({})", self.expr(inner, scope)?),
            Expr::IsNull { expr, negated } => format!(
                "{} IS {}NULL",
                self.operand(expr, scope)?,
                if *negated { "NOT " } else { "" }
            ),
            Expr::Binary { op, left, right } => format!(
                "{} {} {}",
                self.operand(left, scope)?,
                operator(*op),
                self.operand(right, scope)?
            ),
            Expr::InList {
                expr,
                list,
                negated,
            } => self.in_list(expr, list, *negated, scope)?,
            Expr::InSubquery {
                expr,
                query,
                negated,
            } => format!(
                "{} {}IN ({})",
                self.operand(expr, scope)?,
                if *negated { "NOT " } else { "" },
                self.select(query, false)?
            ),
            Expr::Like {
                expr,
                pattern,
                negated,
            } => format!(
                "{} {}LIKE {}",
                self.operand(expr, scope)?,
                if *negated { "NOT " } else { "" },
                self.operand(pattern, scope)?
            ),
            Expr::And(parts) => self.junction(parts, " AND ", "1 = 1", scope)?,
            Expr::Or(parts) => self.junction(parts, " OR ", "0 = 1", scope)?,
        })
    }

    fn junction(
        &mut self,
        parts: &[Expr],
        separator: &str,
        empty: &str,
        scope: &mut Scope,
    ) -> GistResult<String> {
        if parts.is_empty() {
            return Ok(empty.to_string());
        }
        let mut rendered = Vec::with_capacity(parts.len());
        for part in parts {
            rendered.push(self.operand(part, scope)?);
        }
        Ok(rendered.join(separator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{TableRef, ValueKind};
    use serde_json::json;

    fn owner(column: &str) -> Expr {
        Expr::Dereference {
            table: "e".to_string(),
            column: "owner_id".to_string(),
            target_table: "users".to_string(),
            target_key: "id".to_string(),
            target_column: column.to_string(),
        }
    }

    fn render(query: &SelectQuery, params: ParamBindings) -> RenderedQuery {
        SqliteRenderer::new().render(query, &params).unwrap()
    }

    // =========================================================================
    // Clause layout
    // =========================================================================

    #[test]
    fn test_render_filtered_page() {
        let query = SelectQuery::new(TableRef::new("widget", "e"))
            .project(Expr::column("e", "id"), ValueKind::Text)
            .project(Expr::column("e", "name"), ValueKind::Text)
            .and_where(Expr::column("e", "age").equals(Expr::param("f_0")))
            .and_where(Expr::column("e", "name").like(Expr::param("f_1"), false))
            .order(OrderTerm::desc(Expr::column("e", "age")))
            .order(OrderTerm::asc(Expr::column("e", "id")))
            .with_limit(2)
            .with_offset(0);
        let params = ParamBindings::from([
            ("f_0".to_string(), json!(3)),
            ("f_1".to_string(), json!("Acme%")),
        ]);

        let rendered = render(&query, params);

        insta::assert_snapshot!(rendered.sql, @r"
        SELECT e.id, e.name
        FROM widget e
        WHERE e.age = :f_0
          AND e.name LIKE :f_1
        ORDER BY e.age DESC, e.id ASC
        LIMIT 2 OFFSET 0
        ");
        assert_eq!(rendered.columns, vec![ValueKind::Text, ValueKind::Text]);
        assert_eq!(rendered.params.len(), 2);
    }

    #[test]
    fn test_dereference_joins_once_per_scope() {
        let tags = SelectQuery::new(TableRef::new("widget_tags", "j_1"))
            .project(Expr::count_all(), ValueKind::Integer)
            .and_where(Expr::column("j_1", "widget_id").equals(Expr::column("e", "id")));
        let query = SelectQuery::new(TableRef::new("widget", "e"))
            .project(owner("surname"), ValueKind::Text)
            .project(owner("name"), ValueKind::Text)
            .project(Expr::subquery(tags), ValueKind::Integer);

        let rendered = render(&query, ParamBindings::new());

        insta::assert_snapshot!(rendered.sql, @r"
        SELECT d_1.surname, d_1.name, (SELECT COUNT(*) FROM widget_tags j_1 WHERE j_1.widget_id = e.id)
        FROM widget e
        LEFT JOIN users d_1 ON d_1.id = e.owner_id
        ");
        assert!(rendered.params.is_empty());
    }

    #[test]
    fn test_count_without_paging() {
        let query = SelectQuery::new(TableRef::new("widget", "e"))
            .project(Expr::count_all(), ValueKind::Integer)
            .and_where(owner("surname").is_not_null());

        let rendered = render(&query, ParamBindings::new());

        assert_eq!(
            rendered.sql,
            "SELECT COUNT(*)\nFROM widget e\nLEFT JOIN users d_1 ON d_1.id = e.owner_id\nWHERE d_1.surname IS NOT NULL"
        );
    }

    // =========================================================================
    // Parameters and literals
    // =========================================================================

    #[test]
    fn test_in_list_expands_array_and_keeps_only_used_params() {
        let query = SelectQuery::new(TableRef::new("widget", "e"))
            .project(Expr::column("e", "id"), ValueKind::Text)
            .and_where(Expr::any(vec![
                Expr::column("e", "code").in_list(vec![Expr::param("f_0")], false),
                Expr::column("e", "name").equals(Expr::text("O'Hara")),
            ]))
            .and_where(Expr::column("e", "group").is_not_null());
        let params = ParamBindings::from([
            ("f_0".to_string(), json!(["a", "b"])),
            ("unused".to_string(), json!(1)),
        ]);

        let rendered = render(&query, params);

        insta::assert_snapshot!(rendered.sql, @r#"
        SELECT e.id
        FROM widget e
        WHERE (e.code IN (:f_0_0, :f_0_1) OR e.name = 'O''Hara')
          AND e."group" IS NOT NULL
        "#);
        assert_eq!(
            rendered.params,
            BTreeMap::from([
                ("f_0_0".to_string(), json!("a")),
                ("f_0_1".to_string(), json!("b")),
            ])
        );
    }

    #[test]
    fn test_empty_in_list() {
        let query = SelectQuery::new(TableRef::new("widget", "e"))
            .project(Expr::column("e", "id"), ValueKind::Text)
            .and_where(Expr::column("e", "code").in_list(vec![Expr::param("f_0")], false));
        let params = ParamBindings::from([("f_0".to_string(), json!([]))]);
        assert!(render(&query, params.clone()).sql.ends_with("WHERE 0 = 1"));

        let negated = SelectQuery::new(TableRef::new("widget", "e"))
            .project(Expr::column("e", "id"), ValueKind::Text)
            .and_where(Expr::column("e", "code").in_list(vec![Expr::param("f_0")], true));
        assert!(render(&negated, params).sql.ends_with("WHERE 1 = 1"));
    }

    #[test]
    fn test_unbound_param_is_invariant_error() {
        let query = SelectQuery::new(TableRef::new("widget", "e"))
            .project(Expr::param("missing"), ValueKind::Any);
        let err = SqliteRenderer::new()
            .render(&query, &ParamBindings::new())
            .unwrap_err();
        assert!(matches!(err, GistError::CompilationInvariant(_)));
    }

    #[test]
    fn test_array_param_outside_in_list_is_rejected() {
        let query = SelectQuery::new(TableRef::new("widget", "e"))
            .project(Expr::column("e", "id"), ValueKind::Text)
            .and_where(Expr::column("e", "code").equals(Expr::param("f_0")));
        let params = ParamBindings::from([("f_0".to_string(), json!(["a"]))]);
        assert!(SqliteRenderer::new().render(&query, &params).is_err());
    }

    // =========================================================================
    // Functions and aggregates
    // =========================================================================

    #[test]
    fn test_json_group_array_with_order() {
        let members = SelectQuery::new(TableRef::new("widget_tags", "j_1"))
            .project(Expr::column("j_1", "tag_id"), ValueKind::Text)
            .and_where(Expr::column("j_1", "widget_id").equals(Expr::column("e", "id")));
        let ids = SelectQuery::new(TableRef::new("tag", "t_2"))
            .project(
                Expr::Aggregate(Aggregate::JsonArray {
                    arg: Box::new(Expr::column("t_2", "id")),
                    order_by: vec![OrderTerm::asc(Expr::column("t_2", "id"))],
                }),
                ValueKind::Json,
            )
            .and_where(Expr::column("t_2", "id").in_subquery(members, false));
        let query = SelectQuery::new(TableRef::new("widget", "e"))
            .project(Expr::subquery(ids), ValueKind::Json);

        let rendered = render(&query, ParamBindings::new());

        assert_eq!(
            rendered.sql,
            "SELECT (SELECT json_group_array(t_2.id ORDER BY t_2.id ASC) FROM tag t_2 \
             WHERE t_2.id IN (SELECT j_1.tag_id FROM widget_tags j_1 WHERE j_1.widget_id = e.id))\n\
             FROM widget e"
        );
    }

    #[test]
    fn test_functions_and_literals() {
        let query = SelectQuery::new(TableRef::new("widget", "e"))
            .project(
                Expr::call(
                    Function::Coalesce,
                    vec![
                        Expr::call(Function::JsonArrayLength, vec![Expr::column("e", "labels")]),
                        Expr::int(0),
                    ],
                ),
                ValueKind::Integer,
            )
            .project(
                Expr::call(
                    Function::JsonExtract,
                    vec![Expr::column("e", "sharing"), Expr::text("$.public")],
                ),
                ValueKind::Any,
            )
            .project(Expr::Literal(json!(true)), ValueKind::Boolean)
            .project(Expr::Null, ValueKind::Null);

        let rendered = render(&query, ParamBindings::new());

        assert_eq!(
            rendered.sql,
            "SELECT coalesce(json_array_length(e.labels), 0), json_extract(e.sharing, '$.public'), 1, NULL\nFROM widget e"
        );
    }

    #[test]
    fn test_identifier_quoting() {
        assert_eq!(ident("name"), "name");
        assert_eq!(ident("order"), "\"order\"");
        assert_eq!(ident("first name"), "\"first name\"");
        assert_eq!(ident("we\"ird"), "\"we\"\"ird\"");
    }
}
