//! Schema metadata.
//!
//! Types and properties are described by a statically registered table
//! built at startup. The planner, validator and compiler look properties up
//! by name through the [`SchemaRegistry`] trait.

mod registry;

pub use registry::{ResolvedPath, SchemaRegistry, ScopedRegistry, StaticSchemaRegistry};

use crate::query::Transform;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Declared value type of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyType {
    Identifier,
    Text,
    Integer,
    Number,
    Boolean,
    Date,
    Json,
    /// To-one reference to another type
    Reference,
    /// To-many collection of another type
    Collection,
}

impl PropertyType {
    /// Rank used to order preset expansions
    pub fn rank(self) -> u8 {
        match self {
            PropertyType::Identifier => 0,
            PropertyType::Text => 1,
            PropertyType::Integer | PropertyType::Number => 2,
            PropertyType::Boolean => 3,
            PropertyType::Date => 4,
            PropertyType::Json => 5,
            PropertyType::Reference => 6,
            PropertyType::Collection => 7,
        }
    }

    /// Compared as strings in the store
    pub fn is_textual(self) -> bool {
        matches!(self, PropertyType::Identifier | PropertyType::Text)
    }
}

/// How a collection's members are stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionStorage {
    /// Join table linking owner rows to item rows
    JoinTable {
        table: String,
        owner_column: String,
        item_column: String,
    },
    /// JSON array of item identifiers in a column of the owner row
    Embedded { column: String },
}

/// Whether the `*` preset includes a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GistInclusion {
    /// Decided by the detail level
    #[default]
    Auto,
    Always,
    Never,
}

/// Special meaning of a property beyond its stored value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PropertyRole {
    #[default]
    Plain,
    /// Synthesized endpoint link of the object
    Href,
    /// Access capability summary computed from the sharing payload
    Access,
    /// Raw sharing payload
    Sharing,
    /// Translation set of the object
    Translations,
    /// Attribute value bag of the object
    AttributeValues,
    /// Display alias of a translatable property, e.g. `displayName` of `name`
    Display { source: String },
}

/// Metadata of one property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyMeta {
    pub name: String,
    /// Store column; references default to `<name>_id`
    pub column: String,
    pub property_type: PropertyType,
    pub persisted: bool,
    pub readable: bool,
    /// Non-null; required references are read without a subquery
    pub required: bool,
    /// Target type of references and collections
    pub item_type: Option<String>,
    /// Type declaring the property, set on registration
    pub owning_type: String,
    pub translatable: bool,
    /// Property key used in translation entries
    pub translation_key: Option<String>,
    pub storage: Option<CollectionStorage>,
    /// Part of the `:identifiable` preset
    pub identifiable_core: bool,
    /// Part of the `:nameable` preset
    pub nameable_core: bool,
    /// Owned by this side of a relation; the `:owner` preset
    pub owner: bool,
    pub gist_inclusion: GistInclusion,
    pub default_transform: Option<Transform>,
    pub role: PropertyRole,
}

impl PropertyMeta {
    pub fn new(name: impl Into<String>, property_type: PropertyType) -> Self {
        let name = name.into();
        Self {
            column: name.clone(),
            name,
            property_type,
            persisted: true,
            readable: true,
            required: false,
            item_type: None,
            owning_type: String::new(),
            translatable: false,
            translation_key: None,
            storage: None,
            identifiable_core: false,
            nameable_core: false,
            owner: true,
            gist_inclusion: GistInclusion::Auto,
            default_transform: None,
            role: PropertyRole::Plain,
        }
    }

    pub fn identifier(name: impl Into<String>) -> Self {
        let mut meta = Self::new(name, PropertyType::Identifier);
        meta.required = true;
        meta.identifiable_core = true;
        meta.nameable_core = true;
        meta
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Text)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Integer)
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Number)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Boolean)
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Date)
    }

    pub fn json(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Json)
    }

    /// To-one reference stored in column `<name>_id`
    pub fn reference(name: impl Into<String>, target: impl Into<String>) -> Self {
        let mut meta = Self::new(name, PropertyType::Reference);
        meta.column = format!("{}_id", meta.name);
        meta.item_type = Some(target.into());
        meta
    }

    /// Collection stored in a join table
    pub fn collection(
        name: impl Into<String>,
        item_type: impl Into<String>,
        table: impl Into<String>,
        owner_column: impl Into<String>,
        item_column: impl Into<String>,
    ) -> Self {
        let mut meta = Self::new(name, PropertyType::Collection);
        meta.item_type = Some(item_type.into());
        meta.storage = Some(CollectionStorage::JoinTable {
            table: table.into(),
            owner_column: owner_column.into(),
            item_column: item_column.into(),
        });
        meta
    }

    /// Collection stored as a JSON array of item ids in the owner row
    pub fn embedded_collection(name: impl Into<String>, item_type: impl Into<String>) -> Self {
        let mut meta = Self::new(name, PropertyType::Collection);
        meta.item_type = Some(item_type.into());
        meta.storage = Some(CollectionStorage::Embedded {
            column: meta.column.clone(),
        });
        meta
    }

    /// Synthesized endpoint link of the object
    pub fn href() -> Self {
        let mut meta = Self::new("href", PropertyType::Text);
        meta.persisted = false;
        meta.role = PropertyRole::Href;
        meta
    }

    /// Access capability summary of the object for the caller
    pub fn access() -> Self {
        let mut meta = Self::new("access", PropertyType::Json);
        meta.persisted = false;
        meta.role = PropertyRole::Access;
        meta.gist_inclusion = GistInclusion::Never;
        meta
    }

    pub fn sharing() -> Self {
        let mut meta = Self::new("sharing", PropertyType::Json);
        meta.role = PropertyRole::Sharing;
        meta.gist_inclusion = GistInclusion::Never;
        meta
    }

    pub fn translations() -> Self {
        let mut meta = Self::new("translations", PropertyType::Json);
        meta.role = PropertyRole::Translations;
        meta.gist_inclusion = GistInclusion::Never;
        meta
    }

    pub fn attribute_values() -> Self {
        let mut meta = Self::new("attributeValues", PropertyType::Json);
        meta.column = "attribute_values".to_string();
        meta.role = PropertyRole::AttributeValues;
        meta.gist_inclusion = GistInclusion::Never;
        meta
    }

    /// Display alias of the translatable property `source`
    pub fn display(name: impl Into<String>, source: impl Into<String>) -> Self {
        let mut meta = Self::new(name, PropertyType::Text);
        meta.persisted = false;
        meta.role = PropertyRole::Display {
            source: source.into(),
        };
        meta.gist_inclusion = GistInclusion::Never;
        meta
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        if let Some(CollectionStorage::Embedded { column }) = &mut self.storage {
            *column = self.column.clone();
        }
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn not_persisted(mut self) -> Self {
        self.persisted = false;
        self
    }

    pub fn unreadable(mut self) -> Self {
        self.readable = false;
        self
    }

    /// Translatable under `key` in the translation set
    pub fn translatable(mut self, key: impl Into<String>) -> Self {
        self.translatable = true;
        self.translation_key = Some(key.into());
        self
    }

    pub fn identifiable(mut self) -> Self {
        self.identifiable_core = true;
        self.nameable_core = true;
        self
    }

    pub fn nameable(mut self) -> Self {
        self.nameable_core = true;
        self
    }

    /// Inverse side of a relation; excluded from `:owner`
    pub fn inverse(mut self) -> Self {
        self.owner = false;
        self
    }

    pub fn with_inclusion(mut self, inclusion: GistInclusion) -> Self {
        self.gist_inclusion = inclusion;
        self
    }

    pub fn with_default_transform(mut self, transform: Transform) -> Self {
        self.default_transform = Some(transform);
        self
    }

    pub fn is_collection(&self) -> bool {
        self.property_type == PropertyType::Collection
    }

    pub fn is_reference(&self) -> bool {
        self.property_type == PropertyType::Reference
    }

    /// Plain scalar value: neither a relation nor structured JSON
    pub fn is_simple(&self) -> bool {
        !matches!(
            self.property_type,
            PropertyType::Reference | PropertyType::Collection | PropertyType::Json
        )
    }

    pub fn is_persisted_collection(&self) -> bool {
        self.persisted && self.is_collection()
    }

    pub fn join_table(&self) -> Option<(&str, &str, &str)> {
        match &self.storage {
            Some(CollectionStorage::JoinTable {
                table,
                owner_column,
                item_column,
            }) => Some((table, owner_column, item_column)),
            _ => None,
        }
    }

    pub fn is_embedded_collection(&self) -> bool {
        matches!(self.storage, Some(CollectionStorage::Embedded { .. }))
    }
}

/// Dynamic attribute, keyed by an external id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeMeta {
    pub id: String,
    pub value_type: PropertyType,
}

impl AttributeMeta {
    pub fn new(id: impl Into<String>, value_type: PropertyType) -> Self {
        Self {
            id: id.into(),
            value_type,
        }
    }
}

/// Computed value of a `from` field, derived from named source values.
#[derive(Clone)]
pub struct ComputedProperty(Arc<dyn Fn(&Map<String, Value>) -> Value + Send + Sync>);

impl ComputedProperty {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> Value + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn compute(&self, sources: &Map<String, Value>) -> Value {
        (self.0)(sources)
    }
}

impl fmt::Debug for ComputedProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ComputedProperty(..)")
    }
}

/// Metadata of one type.
#[derive(Debug, Clone)]
pub struct TypeSchema {
    pub name: String,
    pub table: String,
    /// Endpoint relative to the API root, e.g. `/users`
    pub endpoint: Option<String>,
    /// Name of a list of this type in output, e.g. `users`
    pub collection_name: String,
    /// Rows carry sharing metadata and are access filtered
    pub shareable: bool,
    /// Can be instantiated blank to compute `from` fields
    pub constructible: bool,
    /// Property shown for references to this type
    pub display_property: Option<String>,
    /// Property holding the `/`-separated ancestor id path
    pub hierarchy_path: Option<String>,
    pub properties: Vec<PropertyMeta>,
    pub computed: HashMap<String, ComputedProperty>,
}

impl TypeSchema {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        let name = name.into();
        let mut collection_name = name.clone();
        if let Some(first) = name.get(..1) {
            collection_name = format!("{}{}s", first.to_lowercase(), &name[1..]);
        }
        Self {
            collection_name,
            name,
            table: table.into(),
            endpoint: None,
            shareable: false,
            constructible: false,
            display_property: None,
            hierarchy_path: None,
            properties: Vec::new(),
            computed: HashMap::new(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_collection_name(mut self, name: impl Into<String>) -> Self {
        self.collection_name = name.into();
        self
    }

    pub fn shareable(mut self) -> Self {
        self.shareable = true;
        self
    }

    pub fn constructible(mut self) -> Self {
        self.constructible = true;
        self
    }

    pub fn with_display_property(mut self, property: impl Into<String>) -> Self {
        self.display_property = Some(property.into());
        self
    }

    pub fn with_hierarchy(mut self, path_property: impl Into<String>) -> Self {
        self.hierarchy_path = Some(path_property.into());
        self
    }

    pub fn with_property(mut self, property: PropertyMeta) -> Self {
        self.properties.push(property);
        self
    }

    pub fn with_computed<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> Value + Send + Sync + 'static,
    {
        self.computed.insert(name.into(), ComputedProperty::new(f));
        self
    }

    pub fn property(&self, name: &str) -> Option<&PropertyMeta> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// First property with the given role
    pub fn property_with_role(&self, role: &PropertyRole) -> Option<&PropertyMeta> {
        self.properties.iter().find(|p| &p.role == role)
    }

    /// Store column of the primary key
    pub fn id_column(&self) -> &str {
        self.properties
            .iter()
            .find(|p| p.property_type == PropertyType::Identifier)
            .map_or("id", |p| p.column.as_str())
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.property(name).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_column_default() {
        let meta = PropertyMeta::reference("owner", "User");
        assert_eq!(meta.column, "owner_id");
        assert_eq!(meta.item_type.as_deref(), Some("User"));
        assert!(!meta.required);
        assert!(meta.required().required);
    }

    #[test]
    fn test_embedded_collection_column_follows_rename() {
        let meta = PropertyMeta::embedded_collection("labels", "Label").with_column("label_ids");
        assert_eq!(
            meta.storage,
            Some(CollectionStorage::Embedded {
                column: "label_ids".to_string()
            })
        );
        assert!(meta.is_embedded_collection());
        assert!(meta.join_table().is_none());
    }

    #[test]
    fn test_collection_name_default() {
        assert_eq!(TypeSchema::new("UserGroup", "usergroup").collection_name, "userGroups");
        assert_eq!(TypeSchema::new("Widget", "widget").collection_name, "widgets");
    }

    #[test]
    fn test_synthetic_properties_are_not_persisted() {
        assert!(!PropertyMeta::href().persisted);
        assert!(!PropertyMeta::access().persisted);
        assert!(!PropertyMeta::display("displayName", "name").persisted);
        assert!(PropertyMeta::sharing().persisted);
    }

    #[test]
    fn test_rank_orders_collections_last() {
        assert!(PropertyType::Reference.rank() < PropertyType::Collection.rank());
        assert!(PropertyType::Identifier.rank() < PropertyType::Text.rank());
    }

    #[test]
    fn test_computed_property() {
        let schema = TypeSchema::new("User", "users").with_computed("fullName", |src| {
            let first = src.get("firstName").and_then(Value::as_str).unwrap_or("");
            let last = src.get("surname").and_then(Value::as_str).unwrap_or("");
            Value::String(format!("{} {}", first, last))
        });
        let mut sources = Map::new();
        sources.insert("firstName".into(), Value::String("Ada".into()));
        sources.insert("surname".into(), Value::String("Lovelace".into()));
        let computed = &schema.computed["fullName"];
        assert_eq!(computed.compute(&sources), Value::String("Ada Lovelace".into()));
    }
}
