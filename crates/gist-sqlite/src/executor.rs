//! Execution of rendered gist queries
//!
//! Parameters are bound by name. Result columns are decoded with the kind
//! the compiler recorded for each projection, so booleans stored as
//! integers and JSON documents stored as text come back as JSON values.

use crate::connection::SqlitePool;
use crate::error::{SqliteError, SqliteResult};
use gist_core::ir::ValueKind;
use gist_core::{GistExecutor, GistResult, RenderedQuery, Row};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::Statement;
use serde_json::{Number, Value};
use tracing::{debug, trace};

/// [`GistExecutor`] over a [`SqlitePool`].
#[derive(Clone)]
pub struct SqliteExecutor {
    pool: SqlitePool,
}

impl SqliteExecutor {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn fetch_rows(
        &self,
        query: &RenderedQuery,
        sink: &mut dyn FnMut(Row) -> GistResult<()>,
    ) -> GistResult<usize> {
        let conn = self.pool.lock();
        let mut stmt = conn.prepare(&query.sql).map_err(SqliteError::from)?;
        bind_params(&mut stmt, query)?;
        let width = stmt.column_count();

        let mut fetched = 0;
        let mut rows = stmt.raw_query();
        while let Some(row) = rows.next().map_err(SqliteError::from)? {
            let mut values = Vec::with_capacity(width);
            for index in 0..width {
                let kind = query.columns.get(index).copied().unwrap_or(ValueKind::Any);
                let cell = row.get_ref(index).map_err(SqliteError::from)?;
                values.push(decode(cell, kind)?);
            }
            sink(values)?;
            fetched += 1;
        }
        Ok(fetched)
    }
}

impl GistExecutor for SqliteExecutor {
    fn fetch(
        &self,
        query: &RenderedQuery,
        sink: &mut dyn FnMut(Row) -> GistResult<()>,
    ) -> GistResult<()> {
        trace!(sql = %query.sql, "executing gist query");
        let fetched = self.fetch_rows(query, sink)?;
        debug!(rows = fetched, "gist query complete");
        Ok(())
    }

    fn count(&self, query: &RenderedQuery) -> GistResult<u64> {
        trace!(sql = %query.sql, "executing gist count");
        let conn = self.pool.lock();
        let mut stmt = conn.prepare(&query.sql).map_err(SqliteError::from)?;
        bind_params(&mut stmt, query)?;
        let mut rows = stmt.raw_query();
        let total: i64 = match rows.next().map_err(SqliteError::from)? {
            Some(row) => row.get(0).map_err(SqliteError::from)?,
            None => 0,
        };
        u64::try_from(total)
            .map_err(|_| SqliteError::Decode(format!("negative count {}", total)).into())
    }
}

fn bind_params(stmt: &mut Statement<'_>, query: &RenderedQuery) -> SqliteResult<()> {
    for (name, value) in &query.params {
        let placeholder = format!(":{}", name);
        let index = stmt.parameter_index(&placeholder)?.ok_or_else(|| {
            SqliteError::Query(format!("parameter `{}` is not used by the query", name))
        })?;
        stmt.raw_bind_parameter(index, to_sql(value))?;
    }
    Ok(())
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

fn decode(cell: ValueRef<'_>, kind: ValueKind) -> SqliteResult<Value> {
    if matches!(cell, ValueRef::Null) || kind == ValueKind::Null {
        return Ok(Value::Null);
    }
    let value = match kind {
        ValueKind::Boolean => match cell {
            ValueRef::Integer(i) => Value::Bool(i != 0),
            ValueRef::Real(f) => Value::Bool(f != 0.0),
            ValueRef::Text(t) => Value::Bool(matches!(text(t)?.as_str(), "true" | "1")),
            other => return Err(mismatch(other, kind)),
        },
        ValueKind::Json => match cell {
            ValueRef::Text(t) => {
                let raw = text(t)?;
                serde_json::from_str(&raw).unwrap_or(Value::String(raw))
            }
            other => plain(other)?,
        },
        ValueKind::Integer => match cell {
            ValueRef::Integer(i) => Value::from(i),
            ValueRef::Real(f) if f.fract() == 0.0 => Value::from(f as i64),
            other => plain(other)?,
        },
        ValueKind::Text | ValueKind::Number | ValueKind::Any | ValueKind::Null => plain(cell)?,
    };
    Ok(value)
}

/// Value by storage class
fn plain(cell: ValueRef<'_>) -> SqliteResult<Value> {
    Ok(match cell {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(t) => Value::String(text(t)?),
        ValueRef::Blob(b) => return Err(SqliteError::Decode(format!("blob of {} bytes", b.len()))),
    })
}

fn text(bytes: &[u8]) -> SqliteResult<String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| SqliteError::Decode(e.to_string()))
}

fn mismatch(cell: ValueRef<'_>, kind: ValueKind) -> SqliteError {
    SqliteError::Decode(format!("{:?} column holds {:?}", kind, cell.data_type()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn executor() -> SqliteExecutor {
        let pool = SqlitePool::memory().unwrap();
        pool.with_connection(|conn| {
            conn.execute_batch(
                "CREATE TABLE item (id TEXT PRIMARY KEY, flag INTEGER, doc TEXT, score REAL);
                 INSERT INTO item VALUES ('a', 1, '{\"k\":[1,2]}', 1.5);
                 INSERT INTO item VALUES ('b', 0, 'not json', NULL);
                 INSERT INTO item VALUES ('c', NULL, NULL, 3.0);",
            )?;
            Ok(())
        })
        .unwrap();
        SqliteExecutor::new(pool)
    }

    fn query(sql: &str, params: BTreeMap<String, Value>, columns: Vec<ValueKind>) -> RenderedQuery {
        RenderedQuery {
            sql: sql.to_string(),
            params,
            columns,
        }
    }

    fn fetch_all(executor: &SqliteExecutor, query: &RenderedQuery) -> Vec<Row> {
        let mut rows = Vec::new();
        executor
            .fetch(query, &mut |row: Row| {
                rows.push(row);
                Ok(())
            })
            .unwrap();
        rows
    }

    // ============================================================================
    // Decoding
    // ============================================================================

    #[test]
    fn test_decodes_by_column_kind() {
        let executor = executor();
        let rows = fetch_all(
            &executor,
            &query(
                "SELECT id, flag, doc, score, NULL FROM item ORDER BY id",
                BTreeMap::new(),
                vec![
                    ValueKind::Text,
                    ValueKind::Boolean,
                    ValueKind::Json,
                    ValueKind::Number,
                    ValueKind::Null,
                ],
            ),
        );

        assert_eq!(
            rows,
            vec![
                vec![json!("a"), json!(true), json!({"k": [1, 2]}), json!(1.5), Value::Null],
                vec![json!("b"), json!(false), json!("not json"), Value::Null, Value::Null],
                vec![json!("c"), Value::Null, Value::Null, json!(3.0), Value::Null],
            ]
        );
    }

    #[test]
    fn test_blob_is_a_decode_error() {
        let err = decode(ValueRef::Blob(&[1, 2]), ValueKind::Any).unwrap_err();
        assert!(matches!(err, SqliteError::Decode(_)));
    }

    // ============================================================================
    // Parameters
    // ============================================================================

    #[test]
    fn test_binds_named_params() {
        let executor = executor();
        let params = BTreeMap::from([
            ("f_0".to_string(), json!(true)),
            ("f_1".to_string(), json!(1)),
        ]);
        let rows = fetch_all(
            &executor,
            &query(
                "SELECT id FROM item WHERE flag = :f_0 AND score > :f_1",
                params,
                vec![ValueKind::Text],
            ),
        );
        assert_eq!(rows, vec![vec![json!("a")]]);
    }

    #[test]
    fn test_unused_param_is_rejected() {
        let executor = executor();
        let params = BTreeMap::from([("f_9".to_string(), json!("x"))]);
        let result = executor.fetch(
            &query("SELECT id FROM item", params, vec![ValueKind::Text]),
            &mut |_row: Row| Ok(()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_count() {
        let executor = executor();
        let params = BTreeMap::from([("f_0".to_string(), json!("a"))]);
        let total = executor
            .count(&query(
                "SELECT COUNT(*) FROM item WHERE id <> :f_0",
                params,
                vec![ValueKind::Integer],
            ))
            .unwrap();
        assert_eq!(total, 2);
    }

    #[test]
    fn test_sink_error_stops_fetch() {
        let executor = executor();
        let mut seen = 0;
        let result = executor.fetch(
            &query("SELECT id FROM item", BTreeMap::new(), vec![ValueKind::Text]),
            &mut |_row: Row| {
                seen += 1;
                Err(gist_core::GistError::Execution("stop".into()))
            },
        );
        assert!(result.is_err());
        assert_eq!(seen, 1);
    }

    #[test]
    fn test_sql_error_is_execution_error() {
        let executor = executor();
        let err = executor
            .count(&query("SELECT COUNT(*) FROM missing", BTreeMap::new(), vec![]))
            .unwrap_err();
        assert!(matches!(err, gist_core::GistError::Execution(_)));
    }
}
