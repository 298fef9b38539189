//! Field projections.

use super::{kind_of, Compilation, ROOT};
use crate::error::{GistError, GistResult};
use crate::ir::{Aggregate, Expr, Function, OrderTerm, Projection, SelectQuery, TableRef, ValueKind};
use crate::planner::{id_property, reference_display};
use crate::query::{path_on_same_parent, Field, Transform};
use crate::schema::{PropertyMeta, PropertyRole, TypeSchema};
use crate::transform::RowTransformer;
use serde_json::Value;

/// JSON path of an attribute's value in the attribute bag
pub(crate) fn attribute_value_path(attribute: &str) -> String {
    format!("$.\"{}\".value", attribute)
}

impl<'c> Compilation<'c> {
    /// Projection of field `index`, registering its transformers.
    pub(super) fn compile_field(&mut self, index: usize, field: &Field) -> GistResult<Projection> {
        if field.is_references() {
            return Ok(Projection::null());
        }
        if field.attribute {
            return self.attribute_field(index, field);
        }
        let resolved = self
            .scope
            .resolve_path(&field.path)
            .ok_or_else(|| GistError::invariant(format!("unresolved field `{}`", field.path)))?;
        let property = resolved.property;

        if (self.query.translate || field.translate) && property.translatable {
            self.register_translation(index, field, property);
        }
        match property.role {
            PropertyRole::Href => return self.href_field(index, field, property),
            PropertyRole::Access => return Ok(self.access_field(index, field, property)),
            _ => {}
        }
        if field.transformation == Transform::From {
            return self.derived_field(index, field, property);
        }
        if resolved.is_nested() {
            let (expr, property) = self.column_expr(&field.path)?;
            return Ok(Projection::new(expr, kind_of(property.property_type)));
        }
        if property.is_reference() {
            return self.reference_field(index, field, property);
        }
        if property.is_collection() {
            return self.collection_field(index, field, property);
        }
        Ok(Projection::new(
            Expr::column(ROOT, property.column.as_str()),
            kind_of(property.property_type),
        ))
    }

    fn register_translation(&mut self, index: usize, field: &Field, property: &PropertyMeta) {
        let Some(translations) = self
            .registry
            .type_schema(&property.owning_type)
            .and_then(|schema| schema.property_with_role(&PropertyRole::Translations))
        else {
            return;
        };
        let Some(translations) =
            self.field_index(&path_on_same_parent(&field.path, &translations.name))
        else {
            return;
        };
        let key = property
            .translation_key
            .clone()
            .unwrap_or_else(|| property.name.to_uppercase());
        self.transformers.push(
            index,
            RowTransformer::Translate {
                translations,
                key,
                locale: self.locale.clone(),
            },
        );
    }

    fn href_field(
        &mut self,
        index: usize,
        field: &Field,
        property: &PropertyMeta,
    ) -> GistResult<Projection> {
        let owner = self.type_schema(&property.owning_type)?;
        if let Some(endpoint) = self.endpoint_of(owner) {
            let id = self.require_field(&path_on_same_parent(&field.path, id_property(owner)))?;
            self.transformers
                .push(index, RowTransformer::EndpointUrl { id, endpoint });
        }
        Ok(Projection::null())
    }

    fn access_field(&mut self, index: usize, field: &Field, property: &PropertyMeta) -> Projection {
        let sharing = self
            .registry
            .type_schema(&property.owning_type)
            .and_then(|schema| schema.property_with_role(&PropertyRole::Sharing))
            .and_then(|sharing| {
                self.field_index(&path_on_same_parent(&field.path, &sharing.name))
            });
        if let Some(sharing) = sharing {
            self.transformers.push(
                index,
                RowTransformer::AccessSummary {
                    sharing,
                    type_name: property.owning_type.clone(),
                    access: self.access.clone(),
                },
            );
        }
        Projection::null()
    }

    fn derived_field(
        &mut self,
        index: usize,
        field: &Field,
        property: &PropertyMeta,
    ) -> GistResult<Projection> {
        let computed = self
            .element
            .computed
            .get(&property.name)
            .cloned()
            .ok_or_else(|| {
                GistError::invariant(format!("no computation for `{}`", property.name))
            })?;
        let mut sources = Vec::new();
        for source in field
            .transformation_argument
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            sources.push((source.to_string(), self.require_field(source)?));
        }
        self.transformers
            .push(index, RowTransformer::Derived { sources, computed });
        Ok(Projection::null())
    }

    fn attribute_field(&mut self, index: usize, field: &Field) -> GistResult<Projection> {
        let bag = self
            .element
            .property_with_role(&PropertyRole::AttributeValues)
            .ok_or_else(|| {
                GistError::invariant(format!(
                    "type `{}` has no attribute values",
                    self.element.name
                ))
            })?;
        if field.transformation == Transform::Pluck {
            let extract = Expr::call(
                Function::JsonExtract,
                vec![
                    Expr::column(ROOT, bag.column.as_str()),
                    Expr::text(attribute_value_path(&field.path)),
                ],
            );
            return Ok(Projection::new(extract, ValueKind::Any));
        }
        let bag = self.require_field(&bag.name)?;
        let value_type = if self.query.typed_attribute_values {
            self.registry.attribute(&field.path).map(|a| a.value_type)
        } else {
            None
        };
        self.transformers.push(
            index,
            RowTransformer::Attribute {
                bag,
                attribute: field.path.clone(),
                value_type,
            },
        );
        Ok(Projection::null())
    }

    fn reference_field(
        &mut self,
        index: usize,
        field: &Field,
        property: &PropertyMeta,
    ) -> GistResult<Projection> {
        let target = self.item_schema(property)?;
        let foreign_key = Expr::column(ROOT, property.column.as_str());
        let Some(endpoint) = self.endpoint_of(target) else {
            return Ok(self.embedded_reference(target, foreign_key));
        };

        let display_name = reference_display(field, target);
        let display = target.property(display_name).ok_or_else(|| {
            GistError::invariant(format!(
                "display property `{}` does not exist in {}",
                display_name, target.name
            ))
        })?;
        let shows_id = display_name == id_property(target);
        if shows_id && self.query.references {
            if let Some(refs) = self.query.references_index() {
                self.transformers.push(
                    index,
                    RowTransformer::ReferenceUrl {
                        refs,
                        name: field.name().to_string(),
                        endpoint,
                    },
                );
            }
        }
        if field.transformation == Transform::IdObjects {
            self.transformers.push(index, RowTransformer::IdObject);
        }

        let expr = if shows_id {
            foreign_key
        } else {
            self.referenced_column(property, target, &display.column)
        };
        Ok(Projection::new(expr, kind_of(display.property_type)))
    }

    /// Referenced row as a JSON object of its simple properties
    fn embedded_reference(&mut self, target: &TypeSchema, foreign_key: Expr) -> Projection {
        let alias = self.next_alias("t");
        let mut pairs = Vec::new();
        for p in target
            .properties
            .iter()
            .filter(|p| p.persisted && p.readable && p.is_simple())
        {
            pairs.push(Expr::text(p.name.as_str()));
            pairs.push(Expr::column(alias.as_str(), p.column.as_str()));
        }
        let row = SelectQuery::new(TableRef::new(target.table.as_str(), alias.as_str()))
            .project(Expr::call(Function::JsonObject, pairs), ValueKind::Json)
            .and_where(Expr::column(alias.as_str(), target.id_column()).equals(foreign_key));
        Projection::new(Expr::subquery(row), ValueKind::Json)
    }

    fn collection_field(
        &mut self,
        index: usize,
        field: &Field,
        property: &'c PropertyMeta,
    ) -> GistResult<Projection> {
        if self.query.references {
            if let (Some(refs), Some(endpoint)) =
                (self.query.references_index(), self.endpoint_of(self.element))
            {
                let id = self.require_field(id_property(self.element))?;
                self.transformers.push(
                    index,
                    RowTransformer::CollectionUrl {
                        refs,
                        id,
                        name: field.name().to_string(),
                        endpoint,
                        property: property.name.clone(),
                    },
                );
            }
        }

        match field.transformation {
            Transform::Size => Ok(Projection::new(
                self.collection_size(property)?,
                ValueKind::Integer,
            )),
            Transform::IsEmpty | Transform::IsNotEmpty => {
                let empty = field.transformation == Transform::IsEmpty;
                self.transformers
                    .push(index, RowTransformer::CountToBool { empty });
                Ok(Projection::new(
                    self.collection_size(property)?,
                    ValueKind::Integer,
                ))
            }
            Transform::Member | Transform::NotMember => {
                let empty = field.transformation == Transform::NotMember;
                self.transformers
                    .push(index, RowTransformer::CountToBool { empty });
                Ok(Projection::new(
                    self.membership_count(field, property)?,
                    ValueKind::Integer,
                ))
            }
            Transform::Ids | Transform::IdObjects | Transform::Pluck => {
                if field.transformation == Transform::IdObjects {
                    self.transformers.push(index, RowTransformer::IdObjects);
                }
                let item = self.item_schema(property)?;
                let plucked = match (field.transformation, &field.transformation_argument) {
                    (Transform::Pluck, Some(arg)) => item
                        .property(arg)
                        .map(|p| p.column.clone())
                        .ok_or_else(|| {
                            GistError::invariant(format!(
                                "pluck target `{}` does not exist in {}",
                                arg, item.name
                            ))
                        })?,
                    _ => item.id_column().to_string(),
                };
                let items = self.items(
                    property,
                    |alias, item| {
                        Expr::Aggregate(Aggregate::JsonArray {
                            arg: Box::new(Expr::column(alias, plucked.as_str())),
                            order_by: vec![OrderTerm::asc(Expr::column(alias, item.id_column()))],
                        })
                    },
                    ValueKind::Json,
                )?;
                Ok(Projection::new(Expr::subquery(items), ValueKind::Json))
            }
            Transform::None | Transform::Auto | Transform::From => Err(GistError::invariant(
                format!("collection `{}` cannot be listed as `{}`", field.path, field.transformation),
            )),
        }
    }

    /// Number of join rows linking the element to the item named by the
    /// field's argument
    fn membership_count(&mut self, field: &Field, property: &PropertyMeta) -> GistResult<Expr> {
        let (_, _, item_column) = property.join_table().ok_or_else(|| {
            GistError::invariant(format!("collection `{}` has no join table", property.name))
        })?;
        let item_id = field.transformation_argument.clone().unwrap_or_default();
        let mut name = format!("p_{}", field.path);
        if self.params.contains_key(&name) {
            name = format!("{}_{}", name, self.params.len());
        }
        let item = self.bind(name, Value::String(item_id));
        let owner_id = Expr::column(ROOT, self.element.id_column());
        let mut members = self.members(property, owner_id)?;
        let alias = members.from.alias.clone();
        members.projections.clear();
        Ok(Expr::subquery(
            members
                .project(Expr::count_all(), ValueKind::Integer)
                .and_where(Expr::column(alias.as_str(), item_column).equals(item)),
        ))
    }
}
