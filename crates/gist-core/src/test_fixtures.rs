//! Shared schema used by unit tests.

use crate::query::Transform;
use crate::schema::{AttributeMeta, PropertyMeta, PropertyType, StaticSchemaRegistry, TypeSchema};
use serde_json::Value;

pub(crate) fn registry() -> StaticSchemaRegistry {
    StaticSchemaRegistry::new()
        .with_type(
            TypeSchema::new("Widget", "widget")
                .with_endpoint("/widgets")
                .shareable()
                .constructible()
                .with_property(PropertyMeta::identifier("id"))
                .with_property(PropertyMeta::text("name").translatable("NAME").nameable())
                .with_property(PropertyMeta::text("code").identifiable())
                .with_property(PropertyMeta::integer("age"))
                .with_property(PropertyMeta::boolean("enabled"))
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
                .with_property(PropertyMeta::embedded_collection("labels", "Tag"))
                .with_property(PropertyMeta::text("summary").not_persisted())
                .with_property(PropertyMeta::href())
                .with_property(PropertyMeta::access())
                .with_property(PropertyMeta::sharing())
                .with_property(PropertyMeta::translations())
                .with_property(PropertyMeta::attribute_values())
                .with_property(PropertyMeta::display("displayName", "name"))
                .with_computed("summary", |sources| {
                    let name = sources.get("name").and_then(Value::as_str).unwrap_or("");
                    let code = sources.get("code").and_then(Value::as_str).unwrap_or("");
                    Value::String(format!("{} ({})", name, code))
                }),
        )
        .with_type(
            TypeSchema::new("User", "users")
                .with_endpoint("/users")
                .shareable()
                .with_property(PropertyMeta::identifier("id"))
                .with_property(PropertyMeta::text("name").translatable("NAME").nameable())
                .with_property(PropertyMeta::text("surname"))
                .with_property(PropertyMeta::text("firstName").with_column("first_name"))
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
                )
                .with_property(PropertyMeta::href())
                .with_property(PropertyMeta::sharing())
                .with_property(PropertyMeta::translations())
                .with_property(PropertyMeta::display("displayName", "name")),
        )
        .with_type(
            TypeSchema::new("UserGroup", "usergroup")
                .with_endpoint("/userGroups")
                .shareable()
                .with_property(PropertyMeta::identifier("id"))
                .with_property(PropertyMeta::text("name").nameable())
                .with_property(PropertyMeta::collection(
                    "users",
                    "User",
                    "usergroup_members",
                    "group_id",
                    "user_id",
                ))
                .with_property(PropertyMeta::sharing()),
        )
        .with_type(
            TypeSchema::new("Tag", "tag")
                .with_endpoint("/tags")
                .with_property(PropertyMeta::identifier("id"))
                .with_property(PropertyMeta::text("name").nameable())
                .with_property(PropertyMeta::reference("location", "Point")),
        )
        .with_type(
            TypeSchema::new("Point", "point")
                .with_property(PropertyMeta::identifier("id"))
                .with_property(PropertyMeta::number("lat"))
                .with_property(PropertyMeta::number("lng")),
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
        .with_attribute(AttributeMeta::new("weight", PropertyType::Integer))
        .with_attribute(AttributeMeta::new("flagged", PropertyType::Boolean))
}
