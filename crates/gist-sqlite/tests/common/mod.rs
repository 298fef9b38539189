//! Shared fixtures for gist-sqlite integration tests

#![allow(dead_code)]

use anyhow::Context;
use gist_config::GistConfig;
use gist_core::query::Transform;
use gist_core::{
    AccessControl, AttributeMeta, GistParams, GistResponse, GistResult, GistService,
    PropertyMeta, PropertyType, StaticSchemaRegistry, SuperuserAccess, TypeSchema,
};
use gist_sqlite::{SqliteExecutor, SqlitePool};
use serde_json::Value;
use std::sync::{Arc, Once};

static TRACING: Once = Once::new();

/// Route test logs through the fmt subscriber once per test binary
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .try_init();
    });
}

pub fn registry() -> StaticSchemaRegistry {
    StaticSchemaRegistry::new()
        .with_type(
            TypeSchema::new("Widget", "widget")
                .with_endpoint("/widgets")
                .shareable()
                .with_property(PropertyMeta::identifier("id"))
                .with_property(PropertyMeta::text("name").translatable("NAME").nameable())
                .with_property(PropertyMeta::text("code").identifiable())
                .with_property(PropertyMeta::integer("age"))
                .with_property(PropertyMeta::boolean("enabled"))
                .with_property(PropertyMeta::reference("owner", "User").required())
                .with_property(PropertyMeta::collection(
                    "tags",
                    "Tag",
                    "widget_tags",
                    "widget_id",
                    "tag_id",
                ))
                .with_property(PropertyMeta::href())
                .with_property(PropertyMeta::access())
                .with_property(PropertyMeta::sharing())
                .with_property(PropertyMeta::translations())
                .with_property(PropertyMeta::attribute_values())
                .with_property(PropertyMeta::display("displayName", "name")),
        )
        .with_type(
            TypeSchema::new("User", "users")
                .with_endpoint("/users")
                .with_property(PropertyMeta::identifier("id"))
                .with_property(PropertyMeta::text("name").nameable())
                .with_property(PropertyMeta::text("surname"))
                .with_property(
                    PropertyMeta::collection(
                        "groups",
                        "UserGroup",
                        "usergroup_members",
                        "user_id",
                        "group_id",
                    )
                    .inverse()
                    .with_default_transform(Transform::Ids),
                ),
        )
        .with_type(
            TypeSchema::new("UserGroup", "usergroup")
                .with_endpoint("/userGroups")
                .with_property(PropertyMeta::identifier("id"))
                .with_property(PropertyMeta::text("name").nameable())
                .with_property(PropertyMeta::collection(
                    "users",
                    "User",
                    "usergroup_members",
                    "group_id",
                    "user_id",
                )),
        )
        .with_type(
            TypeSchema::new("Tag", "tag")
                .with_endpoint("/tags")
                .with_property(PropertyMeta::identifier("id"))
                .with_property(PropertyMeta::text("name").nameable()),
        )
        .with_type(
            TypeSchema::new("OrgUnit", "orgunit")
                .with_endpoint("/organisationUnits")
                .with_hierarchy("path")
                .with_property(PropertyMeta::identifier("id"))
                .with_property(PropertyMeta::text("name").nameable())
                .with_property(PropertyMeta::text("path"))
                .with_property(PropertyMeta::reference("parent", "OrgUnit")),
        )
        .with_attribute(AttributeMeta::new("color", PropertyType::Text))
        .with_attribute(AttributeMeta::new("weight", PropertyType::Integer))
}

const SEED: &str = r#"
INSERT INTO users (id, name, surname) VALUES
    ('u1', 'Ann', 'Smith'),
    ('u2', 'Bob', 'Jones');

INSERT INTO usergroup (id, name) VALUES ('g1', 'Editors');
INSERT INTO usergroup_members (group_id, user_id) VALUES ('g1', 'u1');

INSERT INTO tag (id, name) VALUES ('t1', 'red'), ('t2', 'blue');

INSERT INTO widget (id, name, code, age, enabled, owner_id, sharing, translations, attribute_values) VALUES
    ('w1', 'Acme One', 'A1', 3, 1, 'u1',
        '{"owner": "u1", "public": "r-------"}',
        '[{"property": "NAME", "locale": "fr", "value": "Acme Un"}]',
        '{"color": {"value": "red"}, "weight": {"value": "12"}}'),
    ('w2', 'Acme Two', 'A2', 5, 0, 'u2',
        '{"owner": "u2", "public": "--------"}', NULL, NULL),
    ('w3', 'Acme Three', 'A3', 7, 1, 'u2',
        '{"owner": "u2", "public": "--------", "userGroups": {"g1": "r-------"}}', NULL, NULL),
    ('w4', 'Other', 'B1', 9, 1, 'u1',
        '{"owner": "u1", "public": "r-------"}', NULL, NULL),
    ('w5', 'acme lower', 'B2', 1, 0, 'u2',
        '{"owner": "u2", "public": "--------", "users": {"u1": "rw------"}}', NULL, NULL);

INSERT INTO widget_tags (widget_id, tag_id) VALUES
    ('w1', 't1'), ('w1', 't2'), ('w2', 't1'), ('w4', 't2');

INSERT INTO orgunit (id, name, path, parent_id) VALUES
    ('ou1', 'Root', '/ou1', NULL),
    ('ou2', 'District', '/ou1/ou2', 'ou1'),
    ('ou3', 'Clinic', '/ou1/ou2/ou3', 'ou2'),
    ('ou4', 'Island', '/ou4', NULL);
"#;

/// In-memory pool with the schema applied and the sample rows inserted
pub fn try_seeded_pool() -> anyhow::Result<SqlitePool> {
    init_tracing();
    let registry = registry();
    let pool = SqlitePool::memory().context("Failed to create memory pool")?;
    pool.apply_schema(&registry).context("Failed to apply schema")?;
    pool.with_connection(|conn| {
        conn.execute_batch(SEED)?;
        Ok(())
    })
    .context("Failed to seed")?;
    Ok(pool)
}

pub fn seeded_pool() -> SqlitePool {
    try_seeded_pool().unwrap()
}

pub fn service_as(access: Arc<dyn AccessControl>) -> GistService<SqliteExecutor> {
    GistService::new(
        Arc::new(registry()),
        access,
        SqliteExecutor::new(seeded_pool()),
        GistConfig::default(),
    )
}

pub fn service() -> GistService<SqliteExecutor> {
    service_as(Arc::new(SuperuserAccess::default()))
}

/// List `element_type` with a raw query string
pub fn list(
    service: &GistService<SqliteExecutor>,
    element_type: &str,
    query: &str,
) -> GistResult<GistResponse> {
    let params = GistParams::from_query_string(query)?;
    service.list_params(element_type, None, &params)
}

/// Values of the visible field `name` over all rows
pub fn column(response: &GistResponse, name: &str) -> Vec<Value> {
    let index = response
        .fields
        .iter()
        .position(|f| f.name() == name && !f.support)
        .unwrap_or_else(|| panic!("no field named {}", name));
    response.rows.iter().map(|row| row[index].clone()).collect()
}

/// Non-superuser caller with fixed group memberships
pub struct Member {
    pub user: String,
    pub groups: Vec<String>,
}

impl Member {
    pub fn new(user: &str, groups: &[&str]) -> Self {
        Self {
            user: user.to_string(),
            groups: groups.iter().map(|g| g.to_string()).collect(),
        }
    }
}

impl AccessControl for Member {
    fn is_superuser(&self) -> bool {
        false
    }

    fn current_user_id(&self) -> &str {
        &self.user
    }

    fn can_read_type(&self, _type_name: &str) -> bool {
        true
    }

    fn can_read_field(&self, _type_name: &str, _path: &str) -> bool {
        true
    }

    fn can_read_object(&self, _type_name: &str, _id: &str) -> bool {
        true
    }

    fn group_ids_of(&self, user_id: &str) -> Vec<String> {
        if user_id == self.user {
            self.groups.clone()
        } else {
            Vec::new()
        }
    }

    fn can_filter_by_users_access(&self, user_id: &str) -> bool {
        user_id == self.user
    }
}
