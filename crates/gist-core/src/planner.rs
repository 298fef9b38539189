//! Query planner.
//!
//! Normalizes a declared field/filter list into an explicit one:
//! - expands presets (`*`, `:identifiable`, ...) and sub-field lists
//! - applies removals (`-name`, `!name`)
//! - rewrites display fields, `collection.prop` and `reference.id` shorthands
//! - resolves every field's transformation
//! - attaches the support fields other fields need to compute their value
//! - appends the synthetic references field
//!
//! The planner never fails. Anything it cannot make sense of is left in
//! place for the validator to reject. Planning a planned query is a no-op.

use crate::access::AccessControl;
use crate::pipeline::QueryStage;
use crate::query::{path_on_same_parent, AutoDetail, Comparison, Field, Filter, GistQuery, Order, Transform};
use crate::schema::{
    GistInclusion, PropertyMeta, PropertyRole, PropertyType, SchemaRegistry, ScopedRegistry,
    TypeSchema,
};
use crate::syntax::{parse_fields, split_sub_fields};
use crate::error::GistResult;
use gist_config::QueryComponentConfig;
use std::collections::HashSet;
use tracing::debug;

/// Transformation of a collection field for a detail level
pub fn collection_transform(level: AutoDetail) -> Transform {
    match level {
        AutoDetail::Xs | AutoDetail::S | AutoDetail::M => Transform::Size,
        AutoDetail::L => Transform::Ids,
        AutoDetail::Xl => Transform::IdObjects,
    }
}

/// Name of a type's identifier property
pub(crate) fn id_property(schema: &TypeSchema) -> &str {
    schema
        .properties
        .iter()
        .find(|p| p.property_type == PropertyType::Identifier)
        .map_or("id", |p| p.name.as_str())
}

/// Property of `type_name` with `role`, by name
pub(crate) fn role_property<'r>(
    registry: &'r dyn SchemaRegistry,
    type_name: &str,
    role: &PropertyRole,
) -> Option<&'r PropertyMeta> {
    registry
        .type_schema(type_name)
        .and_then(|schema| schema.property_with_role(role))
}

/// Property shown for a reference field: the pluck argument, the target's
/// display property, then the first of `id`, `code`, `name` it has.
pub(crate) fn reference_display<'s>(field: &'s Field, target: &'s TypeSchema) -> &'s str {
    if field.transformation == Transform::Pluck {
        if let Some(arg) = field.transformation_argument.as_deref() {
            return arg;
        }
    }
    if let Some(display) = target.display_property.as_deref() {
        return display;
    }
    if target
        .properties
        .iter()
        .any(|p| p.property_type == PropertyType::Identifier)
    {
        return id_property(target);
    }
    ["code", "name"]
        .into_iter()
        .find(|name| target.has_property(name))
        .unwrap_or("id")
}

/// Whether a planned field registers an endpoint link in the references
/// field when compiled.
pub(crate) fn has_endpoint_side_effect(
    registry: &dyn SchemaRegistry,
    element_type: &str,
    field: &Field,
) -> bool {
    if field.support || field.attribute || field.is_references() {
        return false;
    }
    let Some(resolved) = registry.resolve_path(element_type, &field.path) else {
        return false;
    };
    if resolved.is_nested() {
        return false;
    }
    let property = resolved.property;
    match property.property_type {
        PropertyType::Collection => registry
            .type_schema(element_type)
            .is_some_and(|schema| schema.endpoint.is_some()),
        PropertyType::Reference => {
            let Some(target) = property
                .item_type
                .as_deref()
                .and_then(|t| registry.type_schema(t))
            else {
                return false;
            };
            let shows_id = matches!(
                field.transformation,
                Transform::Pluck
                    | Transform::None
                    | Transform::Auto
                    | Transform::IdObjects
                    | Transform::Ids
            ) && reference_display(field, target) == id_property(target);
            target.endpoint.is_some() && shows_id
        }
        _ => false,
    }
}

/// Turns declared queries into executable plans.
pub struct GistPlanner<'a> {
    registry: &'a dyn SchemaRegistry,
    access: &'a dyn AccessControl,
    config: &'a QueryComponentConfig,
}

impl<'a> GistPlanner<'a> {
    pub fn new(
        registry: &'a dyn SchemaRegistry,
        access: &'a dyn AccessControl,
        config: &'a QueryComponentConfig,
    ) -> Self {
        Self {
            registry,
            access,
            config,
        }
    }

    /// Plan `query`; never fails.
    pub fn plan(&self, query: &GistQuery) -> GistQuery {
        let scope = ScopedRegistry::new(self.registry, &query.element_type);
        let level = query.auto.unwrap_or(self.config.default_auto);

        let declared = if query.fields.is_empty() {
            vec![Field::new("*")]
        } else {
            query.fields.clone()
        };
        let expanded = self.expand_presets(scope, expand_sub_fields(declared), level);
        let rewritten: Vec<Field> = expanded
            .into_iter()
            .map(|field| self.rewrite_field(scope, query, field))
            .collect();
        let supported = self.with_support_fields(scope, query, rewritten);
        let fields = self.with_references(query, supported);

        let filters = query
            .filters
            .iter()
            .cloned()
            .map(|filter| self.rewrite_filter(scope, filter))
            .collect();
        let orders = query
            .orders
            .iter()
            .cloned()
            .map(|order| rewrite_order(scope, order))
            .collect();

        let planned = GistQuery {
            fields,
            filters,
            orders,
            ..query.clone()
        };
        debug!(
            element_type = %planned.element_type,
            fields = planned.fields.len(),
            support = planned.fields.iter().filter(|f| f.support).count(),
            "planned gist query"
        );
        planned
    }

    /// Properties selected by a preset token; `None` for unknown presets
    fn preset_properties(
        &self,
        scope: ScopedRegistry<'_>,
        preset: &str,
        level: AutoDetail,
    ) -> Option<Vec<&'a PropertyMeta>> {
        const PRESETS: [&str; 6] = ["*", ":all", ":identifiable", ":nameable", ":persisted", ":owner"];
        if !PRESETS.contains(&preset) {
            return None;
        }
        let type_name = scope.type_name();
        let mut selected: Vec<&PropertyMeta> = self
            .registry
            .properties_of(type_name)
            .iter()
            .filter(|p| p.readable && self.access.can_read_field(type_name, &p.name))
            .filter(|p| preset_includes(preset, level, p))
            .collect();
        selected.sort_by_key(|p| p.property_type.rank());
        Some(selected)
    }

    fn expand_presets(
        &self,
        scope: ScopedRegistry<'_>,
        fields: Vec<Field>,
        level: AutoDetail,
    ) -> Vec<Field> {
        let explicit: HashSet<String> = fields
            .iter()
            .filter(|f| !f.is_preset() && !f.is_removal())
            .map(|f| f.path.clone())
            .collect();

        let mut expanded: Vec<Field> = Vec::new();
        for field in fields {
            if field.is_removal() {
                let removed = &field.path[1..];
                expanded.retain(|f| f.path != removed);
                continue;
            }
            if field.is_preset() {
                match self.preset_properties(scope, &field.path, level) {
                    Some(properties) => {
                        for property in properties {
                            if !explicit.contains(&property.name)
                                && !expanded.iter().any(|f| f.path == property.name)
                            {
                                expanded.push(Field::new(property.name.as_str()));
                            }
                        }
                    }
                    None => expanded.push(field),
                }
                continue;
            }
            if !expanded
                .iter()
                .any(|f| f.path == field.path && f.alias == field.alias)
            {
                expanded.push(field);
            }
        }
        expanded
    }

    fn rewrite_field(&self, scope: ScopedRegistry<'_>, query: &GistQuery, mut field: Field) -> Field {
        if field.is_references() || field.is_preset() || field.is_removal() || field.support {
            return field;
        }

        let Some(mut resolved) = scope.resolve_path(&field.path) else {
            if field.attribute || self.registry.attribute(&field.path).is_some() {
                field.attribute = true;
                if field.transformation == Transform::Auto {
                    field.transformation = Transform::None;
                }
            }
            return field;
        };

        // collection.prop => collection::pluck(prop), collection.id => collection::ids
        // reference.id => reference::pluck(id)
        if let Some(parent) = resolved.parent {
            let leaf = resolved.property;
            let is_id = leaf.property_type == PropertyType::Identifier;
            if parent.is_collection() || (parent.is_reference() && is_id) {
                let original = field.path.clone();
                field.path = parent.name.clone();
                if parent.is_collection() && is_id {
                    field.transformation = Transform::Ids;
                    field.transformation_argument = None;
                } else {
                    field.transformation = Transform::Pluck;
                    field.transformation_argument = Some(leaf.name.clone());
                }
                if field.alias.is_none() {
                    field.alias = Some(original);
                }
                let Some(parent_resolved) = scope.resolve_path(&field.path) else {
                    return field;
                };
                resolved = parent_resolved;
            }
        }

        // displayName => name translated
        if let PropertyRole::Display { source } = &resolved.property.role {
            let original = field.path.clone();
            field.path = path_on_same_parent(&field.path, source);
            field.translate = true;
            if field.alias.is_none() {
                field.alias = Some(original);
            }
            match scope.resolve_path(&field.path) {
                Some(source_resolved) => resolved = source_resolved,
                None => return field,
            }
        }

        let property = resolved.property;
        if field.transformation == Transform::Auto {
            field.transformation = if resolved.is_nested() {
                Transform::None
            } else if property.is_collection() {
                match query.auto {
                    Some(level) => collection_transform(level),
                    None => property
                        .default_transform
                        .unwrap_or_else(|| collection_transform(self.config.default_auto)),
                }
            } else {
                match query.auto {
                    Some(_) => Transform::None,
                    None => property.default_transform.unwrap_or(Transform::None),
                }
            };
        }

        if property.is_collection() && !resolved.is_nested() {
            let degrade = match field.transformation {
                Transform::Ids | Transform::IdObjects => property.is_embedded_collection(),
                Transform::None | Transform::Auto => true,
                _ => false,
            };
            if degrade {
                field.transformation = Transform::Size;
                field.transformation_argument = None;
            }
        }
        field
    }

    fn with_support_fields(
        &self,
        scope: ScopedRegistry<'_>,
        query: &GistQuery,
        fields: Vec<Field>,
    ) -> Vec<Field> {
        let mut required: Vec<String> = Vec::new();
        let element = scope.schema();
        let root_id = element.map_or("id", id_property).to_string();

        for field in fields.iter().filter(|f| !f.support && !f.is_references()) {
            if field.attribute {
                if field.transformation != Transform::Pluck {
                    if let Some(bag) =
                        role_property(self.registry, scope.type_name(), &PropertyRole::AttributeValues)
                    {
                        required.push(bag.name.clone());
                    }
                }
                continue;
            }
            let Some(resolved) = scope.resolve_path(&field.path) else {
                continue;
            };
            let property = resolved.property;
            let owning = property.owning_type.as_str();

            if (query.translate || field.translate) && property.translatable {
                if let Some(translations) =
                    role_property(self.registry, owning, &PropertyRole::Translations)
                {
                    required.push(path_on_same_parent(&field.path, &translations.name));
                }
            }
            match property.role {
                PropertyRole::Href => {
                    let id = self
                        .registry
                        .type_schema(owning)
                        .map_or("id", id_property)
                        .to_string();
                    required.push(path_on_same_parent(&field.path, &id));
                }
                PropertyRole::Access => {
                    if let Some(sharing) =
                        role_property(self.registry, owning, &PropertyRole::Sharing)
                    {
                        required.push(path_on_same_parent(&field.path, &sharing.name));
                    }
                }
                _ => {}
            }
            if field.transformation == Transform::From {
                if let Some(sources) = &field.transformation_argument {
                    required.extend(
                        sources
                            .split(',')
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .map(str::to_string),
                    );
                }
            }
            if query.references && property.is_collection() && !resolved.is_nested() {
                required.push(root_id.clone());
            }
        }

        if query.include_ancestors {
            if let Some(path) = element.and_then(|schema| schema.hierarchy_path.clone()) {
                required.push(path);
                required.push(root_id.clone());
            }
        }

        let mut fields = fields;
        for path in required {
            if !fields.iter().any(|f| f.path == path) {
                fields.push(
                    Field::new(path)
                        .with_transformation(Transform::None)
                        .as_support(),
                );
            }
        }
        fields
    }

    fn with_references(&self, query: &GistQuery, mut fields: Vec<Field>) -> Vec<Field> {
        if !query.references || fields.iter().any(Field::is_references) {
            return fields;
        }
        let needed = fields
            .iter()
            .any(|f| has_endpoint_side_effect(self.registry, &query.element_type, f));
        if needed {
            fields.push(Field::references());
        }
        fields
    }

    fn rewrite_filter(&self, scope: ScopedRegistry<'_>, mut filter: Filter) -> Filter {
        match scope.resolve(&filter.path) {
            Some(property) => {
                if let PropertyRole::Display { source } = &property.role {
                    filter.path = path_on_same_parent(&filter.path, source);
                } else if property.is_collection()
                    && !filter.path.contains('.')
                    && matches!(filter.operator, Comparison::In | Comparison::NotIn)
                    && property.join_table().is_some()
                {
                    let item_id = property
                        .item_type
                        .as_deref()
                        .and_then(|t| self.registry.type_schema(t))
                        .map_or("id", id_property)
                        .to_string();
                    filter.path = format!("{}.{}", filter.path, item_id);
                }
            }
            None => {
                if self.registry.attribute(&filter.path).is_some() {
                    filter.attribute = true;
                }
            }
        }
        filter
    }
}

/// Whether a readable property belongs to a known preset
fn preset_includes(preset: &str, level: AutoDetail, p: &PropertyMeta) -> bool {
    let listed = p.gist_inclusion != GistInclusion::Never;
    match preset {
        "*" => match p.gist_inclusion {
            GistInclusion::Always => true,
            GistInclusion::Never => false,
            GistInclusion::Auto => {
                p.persisted
                    && p.role == PropertyRole::Plain
                    && if level.is_minimal() {
                        p.nameable_core
                    } else {
                        !p.is_collection() || level.includes_collections()
                    }
            }
        },
        ":all" => listed,
        ":identifiable" => p.identifiable_core,
        ":nameable" => p.nameable_core,
        ":persisted" => listed && p.persisted,
        ":owner" => listed && p.persisted && p.owner,
        _ => false,
    }
}

fn rewrite_order(scope: ScopedRegistry<'_>, mut order: Order) -> Order {
    if let Some(PropertyRole::Display { source }) = scope.resolve(&order.path).map(|p| &p.role) {
        order.path = path_on_same_parent(&order.path, source);
    }
    order
}

/// Expand `parent[a,b]` into `parent.a`, `parent.b`; unparsable lists stay
/// as they are. A renamed parent or child is named
/// `<parent name>.<child name>`.
fn expand_sub_fields(fields: Vec<Field>) -> Vec<Field> {
    let mut expanded = Vec::with_capacity(fields.len());
    for field in fields {
        let split = split_sub_fields(&field.path)
            .map(|(parent, inner)| (parent.to_string(), parse_fields(inner)));
        match split {
            Some((parent, Ok(children))) => {
                let parent_name = field.alias.as_deref().unwrap_or(&parent);
                for mut child in expand_sub_fields(children) {
                    if field.alias.is_some() || child.alias.is_some() {
                        child.alias = Some(format!("{}.{}", parent_name, child.name()));
                    }
                    let path = format!("{}.{}", parent, child.path);
                    expanded.push(child.with_path(path));
                }
            }
            _ => expanded.push(field),
        }
    }
    expanded
}

impl QueryStage for GistPlanner<'_> {
    fn name(&self) -> &'static str {
        "plan"
    }

    fn apply(&self, query: GistQuery) -> GistResult<GistQuery> {
        Ok(self.plan(&query))
    }
}
