//! Planner, validator, compiler and SQLite renderer working together
//!
//! These tests drive the public API the way a service does and check the
//! SQL that reaches the store.

use gist_config::{GistConfig, QueryComponentConfig};
use gist_core::ir::{Expr, ValueKind};
use gist_core::syntax::parse_fields;
use gist_core::{
    AccessControl, CompiledQuery, GistCompiler, GistError, GistParams, GistPlanner, GistQuery,
    GistValidator, PropertyMeta, QueryRenderer, SqliteRenderer, StaticSchemaRegistry,
    SuperuserAccess, TypeSchema,
};
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;

fn registry() -> StaticSchemaRegistry {
    StaticSchemaRegistry::new()
        .with_type(
            TypeSchema::new("Widget", "widget")
                .with_endpoint("/widgets")
                .shareable()
                .with_property(PropertyMeta::identifier("id"))
                .with_property(PropertyMeta::text("name").translatable("NAME").nameable())
                .with_property(PropertyMeta::text("code").identifiable())
                .with_property(PropertyMeta::integer("age"))
                .with_property(PropertyMeta::reference("owner", "User").required())
                .with_property(
                    PropertyMeta::reference("lastUpdatedBy", "User").with_column("last_updated_by"),
                )
                .with_property(PropertyMeta::collection(
                    "tags",
                    "Tag",
                    "widget_tags",
                    "widget_id",
                    "tag_id",
                ))
                .with_property(PropertyMeta::text("summary").not_persisted())
                .with_property(PropertyMeta::href())
                .with_property(PropertyMeta::sharing())
                .with_property(PropertyMeta::translations())
                .with_property(PropertyMeta::display("displayName", "name")),
        )
        .with_type(
            TypeSchema::new("User", "users")
                .with_endpoint("/users")
                .with_property(PropertyMeta::identifier("id"))
                .with_property(PropertyMeta::text("name"))
                .with_property(PropertyMeta::text("surname")),
        )
        .with_type(
            TypeSchema::new("Tag", "tag")
                .with_endpoint("/tags")
                .with_property(PropertyMeta::identifier("id"))
                .with_property(PropertyMeta::text("name")),
        )
}

fn query(element_type: &str, query_string: &str) -> GistQuery {
    GistParams::from_query_string(query_string)
        .unwrap()
        .to_query(element_type, None, &GistConfig::default())
        .unwrap()
}

fn plan(registry: &StaticSchemaRegistry, access: &dyn AccessControl, query: &GistQuery) -> GistQuery {
    let config = QueryComponentConfig::default();
    GistPlanner::new(registry, access, &config).plan(query)
}

fn compile(query: &GistQuery) -> Result<CompiledQuery, GistError> {
    let registry = registry();
    let access: Arc<dyn AccessControl> = Arc::new(SuperuserAccess::default());
    let planned = plan(&registry, access.as_ref(), query);
    GistValidator::new(&registry, access.as_ref()).validate(&planned)?;
    GistCompiler::new(&registry, access).compile(&planned)
}

// ============================================================================
// Rendered SQL
// ============================================================================

#[test]
fn test_page_of_names_and_tag_ids() {
    let compiled = compile(&query(
        "Widget",
        "fields=name,tags::ids&filter=name:like:Acme*&pageSize=2",
    ))
    .unwrap();
    let renderer = SqliteRenderer::new();

    let fetch = renderer.render(&compiled.fetch, &compiled.params).unwrap();
    insta::assert_snapshot!(fetch.sql, @r"
    SELECT e.name, (SELECT json_group_array(t_2.id ORDER BY t_2.id ASC) FROM tag t_2 WHERE t_2.id IN (SELECT j_1.tag_id FROM widget_tags j_1 WHERE j_1.widget_id = e.id)), e.translations, e.id, NULL
    FROM widget e
    WHERE e.name LIKE :f_0
    ORDER BY e.id ASC
    LIMIT 2 OFFSET 0
    ");
    assert_eq!(fetch.params.get("f_0"), Some(&json!("Acme%")));
    assert_eq!(
        fetch.columns,
        vec![
            ValueKind::Text,
            ValueKind::Json,
            ValueKind::Json,
            ValueKind::Text,
            ValueKind::Null
        ]
    );

    let count = renderer.render(&compiled.count, &compiled.params).unwrap();
    assert_eq!(count.sql, "SELECT COUNT(*)\nFROM widget e\nWHERE e.name LIKE :f_0");
}

#[test]
fn test_filter_groups_are_parenthesized() {
    let compiled = compile(&query(
        "Widget",
        "fields=id&filter=1:name:eq:a&filter=age:gt:3&filter=1:code:eq:b",
    ))
    .unwrap();

    let fetch = SqliteRenderer::new()
        .render(&compiled.fetch, &compiled.params)
        .unwrap();

    insta::assert_snapshot!(fetch.sql, @r"
    SELECT e.id
    FROM widget e
    WHERE (e.name = :f_0 OR e.code = :f_2)
      AND e.age > :f_1
    ORDER BY e.id ASC
    LIMIT 50 OFFSET 0
    ");
    assert_eq!(fetch.params.get("f_1"), Some(&json!(3)));
}

// ============================================================================
// References
// ============================================================================

#[test]
fn test_required_reference_joins_optional_reference_subqueries() {
    let compiled = compile(&query(
        "Widget",
        "fields=owner.surname,lastUpdatedBy.surname",
    ))
    .unwrap();

    assert!(matches!(
        compiled.fetch.projections[0].expr,
        Expr::Dereference { .. }
    ));
    assert!(!compiled.fetch.projections[0].expr.contains_subquery());
    assert!(compiled.fetch.projections[1].expr.contains_subquery());

    let fetch = SqliteRenderer::new()
        .render(&compiled.fetch, &compiled.params)
        .unwrap();
    insta::assert_snapshot!(fetch.sql, @r"
    SELECT d_1.surname, (SELECT t_1.surname FROM users t_1 WHERE t_1.id = e.last_updated_by)
    FROM widget e
    LEFT JOIN users d_1 ON d_1.id = e.owner_id
    ORDER BY e.id ASC
    LIMIT 50 OFFSET 0
    ");
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn test_non_persisted_field_rejected() {
    let err = compile(&query("Widget", "fields=summary")).unwrap_err();
    assert!(matches!(err, GistError::Validation(_)));
}

#[test]
fn test_order_by_collection_rejected() {
    let err = compile(&query("Widget", "fields=id&order=tags")).unwrap_err();
    assert!(err.is_client_error());
}

// ============================================================================
// Determinism
// ============================================================================

#[test]
fn test_compilation_is_deterministic() {
    let request = query(
        "Widget",
        "fields=*,owner.surname,tags::member(t1),href&filter=tags.name:eq:red&filter=code:!in:[a,b]&order=name",
    );
    let renderer = SqliteRenderer::new();

    let first = compile(&request).unwrap();
    let second = compile(&request).unwrap();

    assert_eq!(first.fetch, second.fetch);
    assert_eq!(first.params, second.params);
    assert_eq!(
        renderer.render(&first.fetch, &first.params).unwrap(),
        renderer.render(&second.fetch, &second.params).unwrap()
    );
}

const FIELD_TOKENS: &[&str] = &[
    "*",
    ":identifiable",
    ":nameable",
    "name",
    "code",
    "-code",
    "age",
    "owner",
    "owner.surname",
    "lastUpdatedBy.id",
    "tags",
    "tags::size",
    "tags.id",
    "tags~pluck(name)",
    "displayName",
    "href",
];

proptest! {
    #[test]
    fn prop_planning_is_idempotent(
        picks in proptest::collection::vec(0..FIELD_TOKENS.len(), 1..6),
        translate in any::<bool>(),
        references in any::<bool>(),
    ) {
        let registry = registry();
        let access = SuperuserAccess::default();
        let mut fields = vec!["id"];
        fields.extend(picks.iter().map(|i| FIELD_TOKENS[*i]));
        let request = GistQuery::new("Widget")
            .with_fields(parse_fields(&fields.join(",")).unwrap())
            .with_translate(translate)
            .with_references(references);

        let once = plan(&registry, &access, &request);
        let twice = plan(&registry, &access, &once);

        prop_assert_eq!(once, twice);
    }
}
