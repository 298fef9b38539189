//! Filter conditions.
//!
//! Root filters are combined with AND, or with OR when the query asks for
//! any-filter matching. Filters sharing a group number are combined with
//! the opposite junction and take the position of the group's first filter.

use super::fields::attribute_value_path;
use super::{Compilation, ROOT};
use crate::error::{GistError, GistResult};
use crate::ir::{BinaryOp, Expr, Function, SelectQuery, TableRef, ValueKind};
use crate::query::{Comparison, Filter};
use crate::schema::{PropertyMeta, PropertyRole, PropertyType};
use crate::values::typed_value;
use serde_json::Value;

/// Root-level filter part: a single condition or a numbered group
enum Part {
    Single(Expr),
    Group(i32, Vec<Expr>),
}

impl<'c> Compilation<'c> {
    /// Combined filter condition, `None` without filters
    pub(super) fn filters(&mut self) -> GistResult<Option<Expr>> {
        let query = self.query;
        let mut parts: Vec<Part> = Vec::new();
        for (index, filter) in query.filters.iter().enumerate() {
            let condition = self.compile_filter(index, filter)?;
            if !filter.is_grouped() {
                parts.push(Part::Single(condition));
                continue;
            }
            let existing = parts.iter_mut().find_map(|part| match part {
                Part::Group(group, members) if *group == filter.group => Some(members),
                _ => None,
            });
            match existing {
                Some(members) => members.push(condition),
                None => parts.push(Part::Group(filter.group, vec![condition])),
            }
        }
        if parts.is_empty() {
            return Ok(None);
        }
        let any = query.any_filter;
        let combined: Vec<Expr> = parts
            .into_iter()
            .map(|part| match part {
                Part::Single(condition) => condition,
                Part::Group(_, members) if any => Expr::all(members),
                Part::Group(_, members) => Expr::any(members),
            })
            .collect();
        Ok(Some(if any {
            Expr::any(combined)
        } else {
            Expr::all(combined)
        }))
    }

    fn compile_filter(&mut self, index: usize, filter: &Filter) -> GistResult<Expr> {
        let param = format!("f_{}", index);
        if filter.operator.is_access_compare() {
            return self.access_filter(filter);
        }
        if filter.attribute {
            let bag = self
                .element
                .property_with_role(&PropertyRole::AttributeValues)
                .ok_or_else(|| {
                    GistError::invariant(format!(
                        "type `{}` has no attribute values",
                        self.element.name
                    ))
                })?;
            let value_type = self
                .registry
                .attribute(&filter.path)
                .map_or(PropertyType::Text, |a| a.value_type);
            let extracted = Expr::call(
                Function::JsonExtract,
                vec![
                    Expr::column(ROOT, bag.column.as_str()),
                    Expr::text(attribute_value_path(&filter.path)),
                ],
            );
            return match value_type {
                PropertyType::Integer => {
                    self.condition(extracted.cast(ValueKind::Integer), filter, value_type, param)
                }
                PropertyType::Number => {
                    self.condition(extracted.cast(ValueKind::Number), filter, value_type, param)
                }
                PropertyType::Boolean => {
                    let filter = self.stored_attribute_text(filter, value_type)?;
                    self.condition(extracted.lower(), &filter, PropertyType::Text, param)
                }
                _ => {
                    let filter = self.stored_attribute_text(filter, value_type)?;
                    self.condition(extracted, &filter, PropertyType::Text, param)
                }
            };
        }

        let resolved = self
            .scope
            .resolve_path(&filter.path)
            .ok_or_else(|| GistError::invariant(format!("unresolved filter `{}`", filter)))?;
        let property = resolved.property;
        if let Some(parent) = resolved.parent.filter(|p| p.is_collection()) {
            return self.through_collection(parent, property, filter, param);
        }
        if property.is_collection() {
            let size = self.collection_size(property)?;
            return match filter.operator {
                Comparison::Empty => Ok(size.equals(Expr::int(0))),
                Comparison::NotEmpty => Ok(Expr::binary(BinaryOp::Gt, size, Expr::int(0))),
                _ => self.condition(size, filter, PropertyType::Integer, param),
            };
        }
        let (template, property) = self.column_expr(&filter.path)?;
        self.condition(template, filter, property.property_type, param)
    }

    /// `EXISTS` over the items of a root collection matching the filter;
    /// `!in` becomes `NOT EXISTS ... IN`.
    fn through_collection(
        &mut self,
        collection: &'c PropertyMeta,
        property: &PropertyMeta,
        filter: &Filter,
        param: String,
    ) -> GistResult<Expr> {
        let item = self.item_schema(collection)?;
        let owner_id = Expr::column(ROOT, self.element.id_column());
        let members = self.members(collection, owner_id)?;
        let alias = self.next_alias("t");
        let negated = filter.operator == Comparison::NotIn;
        let inner = if negated {
            Filter {
                operator: Comparison::In,
                ..filter.clone()
            }
        } else {
            filter.clone()
        };
        let condition = self.condition(
            Expr::column(alias.as_str(), property.column.as_str()),
            &inner,
            property.property_type,
            param,
        )?;
        let matching = SelectQuery::new(TableRef::new(item.table.as_str(), alias.as_str()))
            .project(Expr::int(1), ValueKind::Integer)
            .and_where(Expr::column(alias.as_str(), item.id_column()).in_subquery(members, false))
            .and_where(condition);
        Ok(if negated {
            Expr::not_exists(matching)
        } else {
            Expr::exists(matching)
        })
    }

    /// Sharing check of another user on the filtered object: the element
    /// itself for a plain property, any item for a collection.
    fn access_filter(&mut self, filter: &Filter) -> GistResult<Expr> {
        let user_id = filter
            .values
            .first()
            .ok_or_else(|| GistError::invariant(format!("filter `{}` has no user", filter)))?;
        let pattern = match filter.operator.access_pattern() {
            Some(pattern) => pattern.to_string(),
            None => filter.values.get(1).cloned().ok_or_else(|| {
                GistError::invariant(format!("filter `{}` has no access pattern", filter))
            })?,
        };
        let property = self
            .scope
            .resolve(&filter.path)
            .ok_or_else(|| GistError::invariant(format!("unresolved filter `{}`", filter)))?;
        if !property.is_collection() {
            return self.sharing_predicate(self.element, ROOT, &pattern, user_id);
        }
        let item = self.item_schema(property)?;
        let owner_id = Expr::column(ROOT, self.element.id_column());
        let members = self.members(property, owner_id)?;
        let alias = self.next_alias("t");
        let predicate = self.sharing_predicate(item, &alias, &pattern, user_id)?;
        Ok(Expr::exists(
            SelectQuery::new(TableRef::new(item.table.as_str(), alias.as_str()))
                .project(Expr::int(1), ValueKind::Integer)
                .and_where(Expr::column(alias.as_str(), item.id_column()).in_subquery(members, false))
                .and_where(predicate),
        ))
    }

    /// Attribute values are stored as text; typed comparisons use the
    /// stored text form of each argument.
    fn stored_attribute_text(&self, filter: &Filter, value_type: PropertyType) -> GistResult<Filter> {
        let typed = matches!(
            filter.operator,
            Comparison::Eq
                | Comparison::Ne
                | Comparison::Lt
                | Comparison::Le
                | Comparison::Gt
                | Comparison::Ge
                | Comparison::In
                | Comparison::NotIn
        );
        if !typed {
            return Ok(filter.clone());
        }
        let values = filter
            .values
            .iter()
            .map(|raw| {
                Ok(match self.typed(value_type, raw, filter)? {
                    Value::String(text) => text,
                    other => other.to_string(),
                })
            })
            .collect::<GistResult<Vec<String>>>()?;
        Ok(Filter {
            values,
            ..filter.clone()
        })
    }

    /// Typed argument of a filter
    fn typed(&self, property_type: PropertyType, raw: &str, filter: &Filter) -> GistResult<Value> {
        typed_value(property_type, raw).map_err(|reason| {
            GistError::invariant(format!("filter `{}` has an invalid value: {}", filter, reason))
        })
    }

    fn single(&self, filter: &Filter) -> GistResult<String> {
        filter
            .values
            .first()
            .cloned()
            .ok_or_else(|| GistError::invariant(format!("filter `{}` has no argument", filter)))
    }

    /// Comparison of `template` against the filter's arguments
    fn condition(
        &mut self,
        template: Expr,
        filter: &Filter,
        property_type: PropertyType,
        param: String,
    ) -> GistResult<Expr> {
        let op = filter.operator;
        Ok(match op {
            Comparison::Null => template.is_null(),
            Comparison::NotNull => template.is_not_null(),
            Comparison::Empty => Expr::call(
                Function::Coalesce,
                vec![Expr::call(Function::Length, vec![template]), Expr::int(0)],
            )
            .equals(Expr::int(0)),
            Comparison::NotEmpty => Expr::binary(
                BinaryOp::Gt,
                Expr::call(Function::Length, vec![template]),
                Expr::int(0),
            ),
            Comparison::Eq
            | Comparison::Ne
            | Comparison::Lt
            | Comparison::Le
            | Comparison::Gt
            | Comparison::Ge => {
                let value = self.typed(property_type, &self.single(filter)?, filter)?;
                let value = self.bind(param, value);
                let binary = match op {
                    Comparison::Eq => BinaryOp::Eq,
                    Comparison::Ne => BinaryOp::NotEq,
                    Comparison::Lt => BinaryOp::Lt,
                    Comparison::Le => BinaryOp::LtEq,
                    Comparison::Gt => BinaryOp::Gt,
                    _ => BinaryOp::GtEq,
                };
                Expr::binary(binary, template, value)
            }
            Comparison::Ieq => {
                let value = Value::String(self.single(filter)?.to_lowercase());
                let value = self.bind(param, value);
                template.lower().equals(value)
            }
            Comparison::In | Comparison::NotIn => {
                let values = filter
                    .values
                    .iter()
                    .map(|raw| self.typed(property_type, raw, filter))
                    .collect::<GistResult<Vec<Value>>>()?;
                let list = self.bind(param, Value::Array(values));
                template.in_list(vec![list], op == Comparison::NotIn)
            }
            _ if op.is_string_compare() => {
                let raw = self.single(filter)?;
                let (subject, raw) = if op.is_case_insensitive() {
                    (template.lower(), raw.to_lowercase())
                } else {
                    (template, raw)
                };
                let pattern = self.bind(param, Value::String(op.like_pattern(&raw)));
                subject.like(pattern, op.is_negated())
            }
            _ => {
                return Err(GistError::invariant(format!(
                    "operator `{}` cannot compare values",
                    op
                )))
            }
        })
    }
}
