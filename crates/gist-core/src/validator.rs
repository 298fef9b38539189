//! Query validator.
//!
//! Rejects planned queries that reference unknown, non-persisted or
//! unreadable properties, or that combine operators, arguments and
//! transformations illegally. Fail-fast: the first violation aborts.

use crate::access::AccessControl;
use crate::error::{GistError, GistResult};
use crate::pipeline::QueryStage;
use crate::query::{Comparison, Field, Filter, GistQuery, Order, Transform};
use crate::schema::{
    PropertyMeta, PropertyRole, PropertyType, SchemaRegistry, ScopedRegistry, TypeSchema,
};
use crate::values::typed_value;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Sharing pattern accepted by `canaccess`
static ACCESS_PATTERN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[_%rw]{2,8}$").unwrap());

/// Checks planned queries before compilation.
pub struct GistValidator<'a> {
    registry: &'a dyn SchemaRegistry,
    access: &'a dyn AccessControl,
}

impl<'a> GistValidator<'a> {
    pub fn new(registry: &'a dyn SchemaRegistry, access: &'a dyn AccessControl) -> Self {
        Self { registry, access }
    }

    pub fn validate(&self, query: &GistQuery) -> GistResult<()> {
        let schema = self.registry.type_schema(&query.element_type).ok_or_else(|| {
            GistError::Validation(format!("Type `{}` is not known", query.element_type))
        })?;
        if !self.access.can_read_type(&query.element_type) {
            return Err(GistError::AccessDenied(format!(
                "Type `{}` is not readable",
                query.element_type
            )));
        }
        let scope = ScopedRegistry::new(self.registry, &query.element_type);

        self.validate_owner(query)?;
        for field in &query.fields {
            self.validate_field(scope, schema, field)?;
        }
        for filter in &query.filters {
            self.validate_filter(scope, filter)?;
        }
        for order in &query.orders {
            self.validate_order(scope, order)?;
        }
        if query.include_ancestors && schema.hierarchy_path.is_none() {
            return Err(GistError::Validation(format!(
                "Type `{}` is not hierarchical and cannot include ancestors",
                query.element_type
            )));
        }
        debug!(element_type = %query.element_type, "validated gist query");
        Ok(())
    }

    fn validate_owner(&self, query: &GistQuery) -> GistResult<()> {
        let Some(owner) = &query.owner else {
            return Ok(());
        };
        let collection = self
            .registry
            .resolve(&owner.owner_type, &owner.collection_property)
            .filter(|p| p.is_persisted_collection() && p.join_table().is_some())
            .ok_or_else(|| {
                GistError::Validation(format!(
                    "Property `{}` is not a persisted collection member.",
                    owner.collection_property
                ))
            })?;
        if collection.item_type.as_deref() != Some(query.element_type.as_str()) {
            return Err(GistError::Validation(format!(
                "Collection `{}` of {} does not contain {} items",
                owner.collection_property, owner.owner_type, query.element_type
            )));
        }
        if !self.access.can_read_object(&owner.owner_type, &owner.id) {
            return Err(GistError::AccessDenied(format!(
                "User not allowed to view {} {}",
                owner.owner_type, owner.id
            )));
        }
        Ok(())
    }

    /// Schema and provider readability of a resolved path
    fn check_readable(&self, scope: ScopedRegistry<'_>, path: &str) -> GistResult<()> {
        let denied = || GistError::AccessDenied(format!("Property `{}` is not readable.", path));
        let Some(resolved) = scope.resolve_path(path) else {
            return Ok(());
        };
        if !self.access.can_read_field(scope.type_name(), path) {
            return Err(denied());
        }
        if let Some(parent) = resolved.parent {
            if !parent.readable {
                return Err(denied());
            }
            let property = resolved.property;
            if !self
                .access
                .can_read_field(&property.owning_type, &property.name)
            {
                return Err(denied());
            }
        }
        if !resolved.property.readable {
            return Err(denied());
        }
        Ok(())
    }

    fn validate_field(
        &self,
        scope: ScopedRegistry<'_>,
        schema: &TypeSchema,
        field: &Field,
    ) -> GistResult<()> {
        if field.is_references() {
            return Ok(());
        }
        if field.is_preset() || field.is_removal() {
            return Err(GistError::Specification(format!(
                "Field not supported: `{}`",
                field.path
            )));
        }
        if field.attribute {
            if self.registry.attribute(&field.path).is_none() {
                return Err(GistError::Validation(format!(
                    "Attribute `{}` does not exist",
                    field.path
                )));
            }
            if !matches!(
                field.transformation,
                Transform::None | Transform::Auto | Transform::Pluck
            ) {
                return Err(GistError::Validation(format!(
                    "Attribute field `{}` does not support transformation `{}`",
                    field.path, field.transformation
                )));
            }
            return Ok(());
        }

        let resolved = scope.resolve_path(&field.path).ok_or_else(|| {
            GistError::Validation(format!(
                "Property `{}` does not exist in {}",
                field.path,
                scope.type_name()
            ))
        })?;
        self.check_readable(scope, &field.path)?;
        let property = resolved.property;

        if let Some(parent) = resolved.parent {
            if parent.is_collection() || property.is_collection() {
                return Err(GistError::Validation(format!(
                    "Nested collection fields are not supported: `{}`",
                    field.path
                )));
            }
            return self.validate_plain(property, field);
        }

        match field.transformation {
            Transform::From => self.validate_from(schema, property, field),
            Transform::Member | Transform::NotMember => {
                self.require_join_collection(property, field)?;
                if field.transformation_argument.as_deref().map_or(true, str::is_empty) {
                    return Err(GistError::Validation(format!(
                        "Transformation `{}` of field `{}` requires an argument",
                        field.transformation, field.path
                    )));
                }
                Ok(())
            }
            Transform::Size | Transform::IsEmpty | Transform::IsNotEmpty => {
                if !property.is_persisted_collection() {
                    return Err(GistError::Validation(format!(
                        "Transformation `{}` requires a persisted collection but `{}` is not",
                        field.transformation, field.path
                    )));
                }
                Ok(())
            }
            Transform::Ids | Transform::IdObjects if property.is_reference() => {
                self.validate_plain(property, field)
            }
            Transform::Ids | Transform::IdObjects => {
                self.require_join_collection(property, field)
            }
            Transform::Pluck if property.is_reference() => {
                self.validate_pluck_target(property, field)
            }
            Transform::Pluck => {
                self.require_join_collection(property, field)?;
                self.validate_pluck_target(property, field)
            }
            Transform::None | Transform::Auto => self.validate_plain(property, field),
        }
    }

    fn validate_plain(&self, property: &PropertyMeta, field: &Field) -> GistResult<()> {
        let computed_role = matches!(property.role, PropertyRole::Href | PropertyRole::Access);
        if !property.persisted && !computed_role {
            return Err(GistError::Validation(format!(
                "Property `{}` is not persisted and cannot be listed without `::from`",
                field.path
            )));
        }
        if property.is_collection() {
            return Err(GistError::Validation(format!(
                "Collection `{}` cannot be listed as plain values",
                field.path
            )));
        }
        Ok(())
    }

    fn require_join_collection(&self, property: &PropertyMeta, field: &Field) -> GistResult<()> {
        if !property.is_persisted_collection() {
            return Err(GistError::Validation(format!(
                "Transformation `{}` requires a persisted collection but `{}` is not",
                field.transformation, field.path
            )));
        }
        if property.join_table().is_none() {
            return Err(GistError::Validation(format!(
                "Collection `{}` is embedded and only supports `size`",
                field.path
            )));
        }
        Ok(())
    }

    fn validate_pluck_target(&self, property: &PropertyMeta, field: &Field) -> GistResult<()> {
        let item_type = property.item_type.as_deref().unwrap_or_default();
        let target_name = field.transformation_argument.as_deref().unwrap_or("id");
        let target = self
            .registry
            .resolve(item_type, target_name)
            .ok_or_else(|| {
                GistError::Validation(format!(
                    "Property `{}` does not exist in {}",
                    target_name, item_type
                ))
            })?;
        if !target.persisted {
            return Err(GistError::Validation(format!(
                "Property `{}` of {} is not persisted and cannot be plucked",
                target_name, item_type
            )));
        }
        if !target.is_simple() {
            return Err(GistError::Validation(format!(
                "Property `{}` of {} is not a simple property and cannot be plucked",
                target_name, item_type
            )));
        }
        if !target.readable || !self.access.can_read_field(item_type, target_name) {
            return Err(GistError::AccessDenied(format!(
                "Property `{}` is not readable.",
                target_name
            )));
        }
        Ok(())
    }

    fn validate_from(
        &self,
        schema: &TypeSchema,
        property: &PropertyMeta,
        field: &Field,
    ) -> GistResult<()> {
        if !schema.constructible {
            return Err(GistError::Validation(format!(
                "Transformation `from` requires a constructible type but {} is not",
                schema.name
            )));
        }
        if property.persisted {
            return Err(GistError::Validation(format!(
                "Property `{}` is persisted and cannot be computed using `from`",
                field.path
            )));
        }
        if !schema.computed.contains_key(&property.name) {
            return Err(GistError::Validation(format!(
                "Property `{}` has no computation for `from`",
                field.path
            )));
        }
        let sources: Vec<&str> = field
            .transformation_argument
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if sources.is_empty() {
            return Err(GistError::Validation(format!(
                "Transformation `from` of field `{}` requires at least one source property",
                field.path
            )));
        }
        for source in sources {
            let persisted = schema.property(source).is_some_and(|p| p.persisted);
            if !persisted {
                return Err(GistError::Validation(format!(
                    "Property `{}` used as `from` source of `{}` is not persisted",
                    source, field.path
                )));
            }
        }
        Ok(())
    }

    fn validate_filter(&self, scope: ScopedRegistry<'_>, filter: &Filter) -> GistResult<()> {
        let op = filter.operator;
        if op.is_unary() && !filter.values.is_empty() {
            return Err(GistError::Validation(format!(
                "Filter `{}` uses an unary operator and does not need an argument.",
                filter
            )));
        }
        if !op.is_unary() && filter.values.is_empty() {
            return Err(GistError::Validation(format!(
                "Filter `{}` uses a binary operator that does need an argument.",
                filter
            )));
        }
        if !op.is_multi_value() && filter.values.len() > 1 {
            return Err(GistError::Validation(format!(
                "Filter `{}` can only be used with a single argument.",
                filter
            )));
        }
        if op.is_access_compare() {
            return self.validate_access_filter(scope, filter);
        }

        if filter.attribute {
            let attribute = self.registry.attribute(&filter.path).ok_or_else(|| {
                GistError::Validation(format!("Attribute `{}` does not exist", filter.path))
            })?;
            return check_filter_values(filter, attribute.value_type);
        }

        let resolved = scope.resolve_path(&filter.path).ok_or_else(|| {
            GistError::Validation(format!(
                "Property `{}` cannot be used as filter property.",
                filter.path
            ))
        })?;
        let property = resolved.property;
        if !property.persisted || resolved.parent.is_some_and(|p| !p.persisted) {
            return Err(GistError::Validation(format!(
                "Property `{}` cannot be used as filter property.",
                filter.path
            )));
        }
        self.check_readable(scope, &filter.path)?;

        if let Some(parent) = resolved.parent {
            if parent.is_collection() && parent.join_table().is_none() {
                return Err(GistError::Validation(format!(
                    "Filter `{}` cannot filter through embedded collection `{}`",
                    filter, parent.name
                )));
            }
            if property.is_collection() {
                return Err(GistError::Validation(format!(
                    "Property `{}` cannot be used as filter property.",
                    filter.path
                )));
            }
        }

        if property.is_collection() {
            let supported = matches!(
                op,
                Comparison::Eq
                    | Comparison::Ne
                    | Comparison::Lt
                    | Comparison::Le
                    | Comparison::Gt
                    | Comparison::Ge
                    | Comparison::Empty
                    | Comparison::NotEmpty
            );
            if !supported {
                return Err(GistError::Validation(format!(
                    "Filter `{}` cannot be used with collection property `{}`",
                    filter, filter.path
                )));
            }
        } else if op.is_emptiness_compare() && !property.property_type.is_textual() {
            return Err(GistError::Validation(format!(
                "Filter `{}` requires a text or collection property",
                filter
            )));
        }

        check_filter_values(filter, property.property_type)
    }

    fn validate_access_filter(&self, scope: ScopedRegistry<'_>, filter: &Filter) -> GistResult<()> {
        if filter.operator == Comparison::CanAccess {
            if filter.values.len() != 2 {
                return Err(GistError::Validation(format!(
                    "Filter `{}` requires a user ID and a access pattern argument.",
                    filter
                )));
            }
            if !ACCESS_PATTERN_RE.is_match(&filter.values[1]) {
                return Err(GistError::Validation(format!(
                    "Filter `{}` pattern argument must be 2 to 8 letters allowing letters 'r', 'w', '_' and '%'.",
                    filter
                )));
            }
        } else if filter.values.len() != 1 {
            return Err(GistError::Validation(format!(
                "Filter `{}` can only be used with a single argument.",
                filter
            )));
        }
        let user_id = &filter.values[0];
        if !self.access.can_filter_by_users_access(user_id) {
            return Err(GistError::AccessDenied(format!(
                "Filtering by user access in filter `{}` requires permissions to manage the user filtered by.",
                filter
            )));
        }

        let resolved = scope.resolve_path(&filter.path).ok_or_else(|| {
            GistError::Validation(format!(
                "Property `{}` cannot be used as filter property.",
                filter.path
            ))
        })?;
        if resolved.is_nested() {
            return Err(GistError::Validation(format!(
                "Filter `{}` cannot check access through nested property `{}`",
                filter, filter.path
            )));
        }
        let property = resolved.property;
        let target_type = if property.is_collection() {
            property.item_type.as_deref().unwrap_or_default()
        } else {
            scope.type_name()
        };
        let shareable = self
            .registry
            .type_schema(target_type)
            .is_some_and(|schema| schema.shareable);
        if !shareable || (property.is_collection() && property.join_table().is_none()) {
            return Err(GistError::Validation(format!(
                "Filter `{}` requires a shareable type but {} is not",
                filter, target_type
            )));
        }
        Ok(())
    }

    fn validate_order(&self, scope: ScopedRegistry<'_>, order: &Order) -> GistResult<()> {
        let cannot = || {
            GistError::Validation(format!(
                "Property `{}` cannot be used as order property.",
                order.path
            ))
        };
        let resolved = scope.resolve_path(&order.path).ok_or_else(cannot)?;
        let property = resolved.property;
        let through_collection = resolved.parent.is_some_and(|p| p.is_collection());
        if !property.persisted
            || property.is_collection()
            || through_collection
            || property.property_type == crate::schema::PropertyType::Json
        {
            return Err(cannot());
        }
        self.check_readable(scope, &order.path)
    }
}

/// Arguments of a comparing filter must parse as the compared type
fn check_filter_values(filter: &Filter, property_type: PropertyType) -> GistResult<()> {
    let op = filter.operator;
    if op.is_string_compare() || op.is_unary() {
        return Ok(());
    }
    for value in &filter.values {
        typed_value(property_type, value).map_err(|reason| {
            GistError::Validation(format!(
                "Filter `{}` has an invalid value for property `{}`: {}",
                filter, filter.path, reason
            ))
        })?;
    }
    Ok(())
}

impl QueryStage for GistValidator<'_> {
    fn name(&self) -> &'static str {
        "validate"
    }

    fn apply(&self, query: GistQuery) -> GistResult<GistQuery> {
        self.validate(&query)?;
        Ok(query)
    }
}
