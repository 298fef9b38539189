//! Schema registry trait and the static registry implementation.

use crate::error::{GistError, GistResult};
use crate::schema::{AttributeMeta, PropertyMeta, TypeSchema};
use std::collections::BTreeMap;

/// A path resolved against a type: the leaf property and, for nested paths,
/// the reference or collection property it was reached through.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedPath<'a> {
    pub parent: Option<&'a PropertyMeta>,
    pub property: &'a PropertyMeta,
}

impl<'a> ResolvedPath<'a> {
    pub fn is_nested(&self) -> bool {
        self.parent.is_some()
    }
}

/// Source of type and property metadata.
///
/// Paths have at most one level of nesting (`owner.name`); deeper paths do
/// not resolve.
pub trait SchemaRegistry: Send + Sync {
    fn type_schema(&self, type_name: &str) -> Option<&TypeSchema>;

    /// Dynamic attribute by id
    fn attribute(&self, id: &str) -> Option<&AttributeMeta>;

    fn type_names(&self) -> Vec<&str>;

    /// Properties of a type in declaration order; empty for unknown types
    fn properties_of(&self, type_name: &str) -> &[PropertyMeta] {
        self.type_schema(type_name)
            .map(|schema| schema.properties.as_slice())
            .unwrap_or(&[])
    }

    fn resolve_path(&self, type_name: &str, path: &str) -> Option<ResolvedPath<'_>> {
        let schema = self.type_schema(type_name)?;
        match path.split_once('.') {
            None => schema.property(path).map(|property| ResolvedPath {
                parent: None,
                property,
            }),
            Some((head, rest)) => {
                if rest.contains('.') {
                    return None;
                }
                let parent = schema.property(head)?;
                let target = self.type_schema(parent.item_type.as_deref()?)?;
                target.property(rest).map(|property| ResolvedPath {
                    parent: Some(parent),
                    property,
                })
            }
        }
    }

    fn resolve(&self, type_name: &str, path: &str) -> Option<&PropertyMeta> {
        self.resolve_path(type_name, path).map(|r| r.property)
    }

    fn resolve_mandatory(&self, type_name: &str, path: &str) -> GistResult<&PropertyMeta> {
        self.resolve(type_name, path).ok_or_else(|| {
            GistError::Validation(format!(
                "Property `{}` does not exist in {}",
                path, type_name
            ))
        })
    }
}

/// Registry view fixed to one type
#[derive(Clone, Copy)]
pub struct ScopedRegistry<'a> {
    registry: &'a dyn SchemaRegistry,
    type_name: &'a str,
}

impl<'a> ScopedRegistry<'a> {
    pub fn new(registry: &'a dyn SchemaRegistry, type_name: &'a str) -> Self {
        Self {
            registry,
            type_name,
        }
    }

    pub fn type_name(&self) -> &'a str {
        self.type_name
    }

    pub fn schema(&self) -> Option<&'a TypeSchema> {
        self.registry.type_schema(self.type_name)
    }

    pub fn properties(&self) -> &'a [PropertyMeta] {
        self.registry.properties_of(self.type_name)
    }

    pub fn resolve(&self, path: &str) -> Option<&'a PropertyMeta> {
        self.registry.resolve(self.type_name, path)
    }

    pub fn resolve_path(&self, path: &str) -> Option<ResolvedPath<'a>> {
        self.registry.resolve_path(self.type_name, path)
    }

    pub fn resolve_mandatory(&self, path: &str) -> GistResult<&'a PropertyMeta> {
        self.registry.resolve_mandatory(self.type_name, path)
    }

    /// Scope of another type on the same registry
    pub fn switch_to(&self, type_name: &'a str) -> ScopedRegistry<'a> {
        ScopedRegistry::new(self.registry, type_name)
    }
}

/// Registry backed by metadata tables registered at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticSchemaRegistry {
    types: BTreeMap<String, TypeSchema>,
    attributes: BTreeMap<String, AttributeMeta>,
}

impl StaticSchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type; its properties get their owning type set.
    pub fn with_type(mut self, mut schema: TypeSchema) -> Self {
        for property in &mut schema.properties {
            property.owning_type = schema.name.clone();
        }
        self.types.insert(schema.name.clone(), schema);
        self
    }

    pub fn with_attribute(mut self, attribute: AttributeMeta) -> Self {
        self.attributes.insert(attribute.id.clone(), attribute);
        self
    }

    /// Registry view fixed to `type_name`
    pub fn switch_to<'a>(&'a self, type_name: &'a str) -> ScopedRegistry<'a> {
        ScopedRegistry::new(self, type_name)
    }
}

impl SchemaRegistry for StaticSchemaRegistry {
    fn type_schema(&self, type_name: &str) -> Option<&TypeSchema> {
        self.types.get(type_name)
    }

    fn attribute(&self, id: &str) -> Option<&AttributeMeta> {
        self.attributes.get(id)
    }

    fn type_names(&self) -> Vec<&str> {
        self.types.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{PropertyType, TypeSchema};

    fn registry() -> StaticSchemaRegistry {
        StaticSchemaRegistry::new()
            .with_type(
                TypeSchema::new("User", "users")
                    .with_property(PropertyMeta::identifier("id"))
                    .with_property(PropertyMeta::text("surname"))
                    .with_property(PropertyMeta::reference("group", "UserGroup")),
            )
            .with_type(
                TypeSchema::new("UserGroup", "user_groups")
                    .with_property(PropertyMeta::identifier("id"))
                    .with_property(PropertyMeta::text("name")),
            )
            .with_attribute(AttributeMeta::new("AbCdEfGhIjK", PropertyType::Integer))
    }

    #[test]
    fn test_resolve_root_property() {
        let registry = registry();
        let meta = registry.resolve("User", "surname").unwrap();
        assert_eq!(meta.owning_type, "User");
    }

    #[test]
    fn test_resolve_nested_property() {
        let registry = registry();
        let resolved = registry.resolve_path("User", "group.name").unwrap();
        assert_eq!(resolved.property.owning_type, "UserGroup");
        assert_eq!(resolved.parent.map(|p| p.name.as_str()), Some("group"));
        assert!(resolved.is_nested());
    }

    #[test]
    fn test_resolve_rejects_deep_paths() {
        assert!(registry().resolve("User", "group.name.length").is_none());
    }

    #[test]
    fn test_resolve_mandatory_names_property() {
        let registry = registry();
        let err = registry.resolve_mandatory("User", "nickname").unwrap_err();
        assert_eq!(err.to_string(), "Property `nickname` does not exist in User");
    }

    #[test]
    fn test_scoped_registry_switch() {
        let registry = registry();
        let scope = registry.switch_to("User");
        assert!(scope.resolve("surname").is_some());
        let groups = scope.switch_to("UserGroup");
        assert!(groups.resolve("name").is_some());
        assert!(groups.resolve("surname").is_none());
    }

    #[test]
    fn test_type_names_sorted() {
        assert_eq!(registry().type_names(), vec!["User", "UserGroup"]);
        assert_eq!(
            registry().attribute("AbCdEfGhIjK").map(|a| a.value_type),
            Some(PropertyType::Integer)
        );
    }
}
