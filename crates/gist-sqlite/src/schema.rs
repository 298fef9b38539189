//! Table layout derived from a schema registry
//!
//! Every type gets one table with a column per persisted scalar, reference,
//! JSON document and embedded collection. Join-table collections get one
//! link table each, shared by both sides of a relation.

use crate::error::{SqliteError, SqliteResult};
use gist_core::schema::CollectionStorage;
use gist_core::{PropertyMeta, PropertyType, SchemaRegistry, TypeSchema};
use rusqlite::Connection;
use std::collections::BTreeSet;
use tracing::{debug, info};

fn column_type(property: &PropertyMeta) -> &'static str {
    match property.property_type {
        PropertyType::Integer | PropertyType::Boolean => "INTEGER",
        PropertyType::Number => "REAL",
        PropertyType::Identifier
        | PropertyType::Text
        | PropertyType::Date
        | PropertyType::Json
        | PropertyType::Reference
        | PropertyType::Collection => "TEXT",
    }
}

/// Column definition of a stored property, `None` for link tables and
/// computed properties
fn column_definition(
    registry: &dyn SchemaRegistry,
    schema: &TypeSchema,
    property: &PropertyMeta,
) -> Option<String> {
    if !property.persisted || property.join_table().is_some() {
        return None;
    }
    let mut definition = format!("{} {}", property.column, column_type(property));
    if property.property_type == PropertyType::Identifier && property.column == schema.id_column()
    {
        definition.push_str(" PRIMARY KEY NOT NULL");
    } else if property.required {
        definition.push_str(" NOT NULL");
    }
    if property.is_reference() {
        let target = property
            .item_type
            .as_deref()
            .and_then(|name| registry.type_schema(name));
        if let Some(target) = target {
            definition.push_str(&format!(
                " REFERENCES {}({})",
                target.table,
                target.id_column()
            ));
        }
    }
    Some(definition)
}

/// `CREATE TABLE` statements for every type and link table of `registry`
pub fn table_statements(registry: &dyn SchemaRegistry) -> SqliteResult<Vec<String>> {
    let mut statements = Vec::new();
    let mut links = BTreeSet::new();
    for type_name in registry.type_names() {
        let schema = registry
            .type_schema(type_name)
            .ok_or_else(|| SqliteError::Schema(format!("unknown type `{}`", type_name)))?;
        let columns: Vec<String> = schema
            .properties
            .iter()
            .filter_map(|property| column_definition(registry, schema, property))
            .collect();
        if columns.is_empty() {
            return Err(SqliteError::Schema(format!(
                "type `{}` has no stored properties",
                type_name
            )));
        }
        statements.push(format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            schema.table,
            columns.join(",\n    ")
        ));

        for property in &schema.properties {
            if let Some(CollectionStorage::JoinTable {
                table,
                owner_column,
                item_column,
            }) = &property.storage
            {
                let mut pair = [owner_column.as_str(), item_column.as_str()];
                pair.sort_unstable();
                if links.insert(table.clone()) {
                    statements.push(format!(
                        "CREATE TABLE IF NOT EXISTS {} (\n    {} TEXT NOT NULL,\n    {} TEXT NOT NULL,\n    PRIMARY KEY ({}, {})\n)",
                        table, pair[0], pair[1], pair[0], pair[1]
                    ));
                }
            }
        }
    }
    Ok(statements)
}

/// Create every table of `registry` that does not exist yet
pub fn apply_schema(conn: &Connection, registry: &dyn SchemaRegistry) -> SqliteResult<()> {
    let statements = table_statements(registry)?;
    debug!(tables = statements.len(), "Applying gist schema");
    for statement in &statements {
        conn.execute_batch(statement)
            .map_err(|e| SqliteError::Schema(format!("Failed to apply `{}`: {}", statement, e)))?;
    }
    info!(tables = statements.len(), "Gist schema applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gist_core::StaticSchemaRegistry;

    fn registry() -> StaticSchemaRegistry {
        StaticSchemaRegistry::new()
            .with_type(
                TypeSchema::new("User", "users")
                    .with_property(PropertyMeta::identifier("id"))
                    .with_property(PropertyMeta::text("name"))
                    .with_property(PropertyMeta::collection(
                        "groups",
                        "UserGroup",
                        "usergroup_members",
                        "user_id",
                        "group_id",
                    )),
            )
            .with_type(
                TypeSchema::new("UserGroup", "usergroup")
                    .with_property(PropertyMeta::identifier("id"))
                    .with_property(PropertyMeta::reference("manager", "User").required())
                    .with_property(PropertyMeta::collection(
                        "users",
                        "User",
                        "usergroup_members",
                        "group_id",
                        "user_id",
                    ))
                    .with_property(PropertyMeta::embedded_collection("labels", "User"))
                    .with_property(PropertyMeta::href())
                    .with_property(PropertyMeta::sharing()),
            )
    }

    #[test]
    fn test_link_table_is_shared() {
        let statements = table_statements(&registry()).unwrap();
        let links = statements
            .iter()
            .filter(|s| s.contains("usergroup_members"))
            .count();
        assert_eq!(links, 1);
        assert_eq!(statements.len(), 3);
    }

    #[test]
    fn test_columns() {
        let statements = table_statements(&registry()).unwrap();
        let group = statements
            .iter()
            .find(|s| s.contains("EXISTS usergroup ("))
            .unwrap();
        assert!(group.contains("id TEXT PRIMARY KEY NOT NULL"));
        assert!(group.contains("manager_id TEXT NOT NULL REFERENCES users(id)"));
        assert!(group.contains("labels TEXT"));
        assert!(group.contains("sharing TEXT"));
        assert!(!group.contains("href"));
    }

    #[test]
    fn test_apply_schema() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn, &registry()).unwrap();
        apply_schema(&conn, &registry()).unwrap();

        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap();
        let tables: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(Result::ok)
            .collect();
        assert_eq!(tables, vec!["usergroup", "usergroup_members", "users"]);
    }
}
