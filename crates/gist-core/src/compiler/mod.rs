//! Query compiler.
//!
//! Turns a planned, validated [`GistQuery`] into a store-independent
//! [`SelectQuery`] pair (page fetch and total count), the parameter values
//! they reference and the row transformers that complete each fetched row.
//!
//! The element table is always aliased `e`. Relations are reached through
//! correlated subqueries aliased `t_<n>` (item tables) and `j_<n>` (join
//! tables), or through [`Expr::Dereference`] for required references.

mod fields;
mod filters;

use crate::access::AccessControl;
use crate::error::{GistError, GistResult};
use crate::ir::{Expr, Function, OrderTerm, ParamBindings, SelectQuery, TableRef, ValueKind};
use crate::planner::id_property;
use crate::query::{Direction, GistQuery};
use crate::schema::{PropertyMeta, PropertyRole, PropertyType, SchemaRegistry, ScopedRegistry, TypeSchema};
use crate::transform::RowTransformers;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Alias of the element table
pub const ROOT: &str = "e";

/// Output of compiling one planned query.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    /// One page of rows, one column per planned field
    pub fetch: SelectQuery,
    /// Total number of matching rows
    pub count: SelectQuery,
    /// Values of every parameter either query references
    pub params: ParamBindings,
    pub transformers: RowTransformers,
}

/// Compiles planned queries against a schema registry.
pub struct GistCompiler<'a> {
    registry: &'a dyn SchemaRegistry,
    access: Arc<dyn AccessControl>,
    default_locale: String,
}

impl<'a> GistCompiler<'a> {
    pub fn new(registry: &'a dyn SchemaRegistry, access: Arc<dyn AccessControl>) -> Self {
        Self {
            registry,
            access,
            default_locale: "en".to_string(),
        }
    }

    /// Locale used for translation when the query names none
    pub fn with_default_locale(mut self, locale: impl Into<String>) -> Self {
        self.default_locale = locale.into();
        self
    }

    pub fn compile(&self, plan: &GistQuery) -> GistResult<CompiledQuery> {
        let element = self.registry.type_schema(&plan.element_type).ok_or_else(|| {
            GistError::invariant(format!("unknown element type `{}`", plan.element_type))
        })?;
        let locale = plan
            .translation_locale
            .clone()
            .unwrap_or_else(|| self.default_locale.clone());
        let mut compilation = Compilation {
            registry: self.registry,
            access: &self.access,
            query: plan,
            scope: ScopedRegistry::new(self.registry, &plan.element_type),
            element,
            locale,
            params: ParamBindings::new(),
            transformers: RowTransformers::new(),
            aliases: 0,
        };

        let from = TableRef::new(element.table.as_str(), ROOT);
        let mut fetch = SelectQuery::new(from.clone());
        for (index, field) in plan.fields.iter().enumerate() {
            fetch.projections.push(compilation.compile_field(index, field)?);
        }

        let restriction = compilation.restriction()?;
        if let Some(condition) = restriction.clone() {
            fetch = fetch.and_where(condition);
        }
        for term in compilation.orders()? {
            fetch = fetch.order(term);
        }
        fetch = fetch
            .with_limit(u64::from(plan.paging.size))
            .with_offset(plan.paging.offset);

        let mut count = SelectQuery::new(from).project(Expr::count_all(), ValueKind::Integer);
        if let Some(condition) = restriction {
            count = count.and_where(condition);
        }

        debug!(
            element_type = %plan.element_type,
            columns = fetch.projections.len(),
            params = compilation.params.len(),
            transformers = compilation.transformers.len(),
            "compiled gist query"
        );
        Ok(CompiledQuery {
            fetch,
            count,
            params: compilation.params,
            transformers: compilation.transformers,
        })
    }
}

/// Mutable state of one compilation
pub(crate) struct Compilation<'c> {
    registry: &'c dyn SchemaRegistry,
    access: &'c Arc<dyn AccessControl>,
    query: &'c GistQuery,
    scope: ScopedRegistry<'c>,
    element: &'c TypeSchema,
    locale: String,
    params: ParamBindings,
    transformers: RowTransformers,
    aliases: usize,
}

/// Decoding hint for a property's stored value
pub(crate) fn kind_of(property_type: PropertyType) -> ValueKind {
    match property_type {
        PropertyType::Identifier
        | PropertyType::Text
        | PropertyType::Date
        | PropertyType::Reference => ValueKind::Text,
        PropertyType::Integer | PropertyType::Collection => ValueKind::Integer,
        PropertyType::Number => ValueKind::Number,
        PropertyType::Boolean => ValueKind::Boolean,
        PropertyType::Json => ValueKind::Json,
    }
}

impl<'c> Compilation<'c> {
    fn next_alias(&mut self, prefix: &str) -> String {
        self.aliases += 1;
        format!("{}_{}", prefix, self.aliases)
    }

    /// Bind `value` to `name` and reference it
    fn bind(&mut self, name: impl Into<String>, value: Value) -> Expr {
        let name = name.into();
        self.params.insert(name.clone(), value);
        Expr::Param(name)
    }

    fn type_schema(&self, type_name: &str) -> GistResult<&'c TypeSchema> {
        self.registry
            .type_schema(type_name)
            .ok_or_else(|| GistError::invariant(format!("unknown type `{}`", type_name)))
    }

    fn item_schema(&self, property: &PropertyMeta) -> GistResult<&'c TypeSchema> {
        let item_type = property.item_type.as_deref().ok_or_else(|| {
            GistError::invariant(format!("property `{}` has no item type", property.name))
        })?;
        self.type_schema(item_type)
    }

    /// Endpoint of a type prefixed with the query's endpoint root
    fn endpoint_of(&self, schema: &TypeSchema) -> Option<String> {
        schema
            .endpoint
            .as_ref()
            .map(|endpoint| format!("{}{}", self.query.endpoint_root, endpoint))
    }

    fn field_index(&self, path: &str) -> Option<usize> {
        self.query.field_index(path)
    }

    fn require_field(&self, path: &str) -> GistResult<usize> {
        self.field_index(path)
            .ok_or_else(|| GistError::invariant(format!("support field `{}` is missing", path)))
    }

    /// Whether rows of `schema` must be filtered by the caller's access
    fn needs_row_access(&self, schema: &TypeSchema) -> bool {
        !self.access.is_superuser()
            && schema.shareable
            && schema.property_with_role(&PropertyRole::Sharing).is_some()
    }

    /// Sharing predicate over the sharing column of `schema` aliased `alias`
    fn sharing_predicate(
        &self,
        schema: &TypeSchema,
        alias: &str,
        pattern: &str,
        user_id: &str,
    ) -> GistResult<Expr> {
        let sharing = schema
            .property_with_role(&PropertyRole::Sharing)
            .ok_or_else(|| {
                GistError::invariant(format!("type `{}` has no sharing property", schema.name))
            })?;
        let groups = self.access.group_ids_of(user_id);
        Ok(self.access.sharing_predicate(
            Expr::column(alias, sharing.column.as_str()),
            pattern,
            user_id,
            &groups,
        ))
    }

    /// Read restriction of the caller on rows of `schema` aliased `alias`
    fn read_restriction(&self, schema: &TypeSchema, alias: &str) -> GistResult<Option<Expr>> {
        if !self.needs_row_access(schema) {
            return Ok(None);
        }
        let user = self.access.current_user_id().to_string();
        self.sharing_predicate(schema, alias, "r%", &user).map(Some)
    }

    /// `SELECT j.<item> FROM <join> j WHERE j.<owner> = <owner_id>`
    fn members(&mut self, collection: &PropertyMeta, owner_id: Expr) -> GistResult<SelectQuery> {
        let (table, owner_column, item_column) = collection.join_table().ok_or_else(|| {
            GistError::invariant(format!("collection `{}` has no join table", collection.name))
        })?;
        let alias = self.next_alias("j");
        Ok(SelectQuery::new(TableRef::new(table, alias.as_str()))
            .project(Expr::column(alias.as_str(), item_column), ValueKind::Text)
            .and_where(Expr::column(alias.as_str(), owner_column).equals(owner_id)))
    }

    /// Items of a root collection visible to the caller, aliased `t_<n>`
    fn items(
        &mut self,
        collection: &PropertyMeta,
        projection: impl FnOnce(&str, &TypeSchema) -> Expr,
        kind: ValueKind,
    ) -> GistResult<SelectQuery> {
        let item = self.item_schema(collection)?;
        let owner_id = Expr::column(ROOT, self.element.id_column());
        let members = self.members(collection, owner_id)?;
        let alias = self.next_alias("t");
        let mut items = SelectQuery::new(TableRef::new(item.table.as_str(), alias.as_str()))
            .project(projection(&alias, item), kind)
            .and_where(Expr::column(alias.as_str(), item.id_column()).in_subquery(members, false));
        if let Some(restriction) = self.read_restriction(item, &alias)? {
            items = items.and_where(restriction);
        }
        Ok(items)
    }

    /// Number of items in a root collection
    fn collection_size(&mut self, collection: &PropertyMeta) -> GistResult<Expr> {
        if collection.is_embedded_collection() {
            let length = Expr::call(
                Function::JsonArrayLength,
                vec![Expr::column(ROOT, collection.column.as_str())],
            );
            return Ok(Expr::call(Function::Coalesce, vec![length, Expr::int(0)]));
        }
        let item = self.item_schema(collection)?;
        if self.needs_row_access(item) {
            let items = self.items(collection, |_, _| Expr::count_all(), ValueKind::Integer)?;
            return Ok(Expr::subquery(items));
        }
        let owner_id = Expr::column(ROOT, self.element.id_column());
        let mut members = self.members(collection, owner_id)?;
        members.projections.clear();
        Ok(Expr::subquery(
            members.project(Expr::count_all(), ValueKind::Integer),
        ))
    }

    /// Store expression of a scalar path: a root column, or a column of a
    /// referenced row for `reference.property`.
    fn column_expr(&mut self, path: &str) -> GistResult<(Expr, &'c PropertyMeta)> {
        let resolved = self
            .scope
            .resolve_path(path)
            .ok_or_else(|| GistError::invariant(format!("unresolved path `{}`", path)))?;
        let property = resolved.property;
        let Some(parent) = resolved.parent else {
            return Ok((Expr::column(ROOT, property.column.as_str()), property));
        };
        if !parent.is_reference() {
            return Err(GistError::invariant(format!(
                "path `{}` is not reached through a reference",
                path
            )));
        }
        let target = self.item_schema(parent)?;
        let expr = self.referenced_column(parent, target, &property.column);
        Ok((expr, property))
    }

    /// Column of the row a root reference points to
    fn referenced_column(&mut self, reference: &PropertyMeta, target: &TypeSchema, column: &str) -> Expr {
        if reference.required {
            return Expr::Dereference {
                table: ROOT.to_string(),
                column: reference.column.clone(),
                target_table: target.table.clone(),
                target_key: target.id_column().to_string(),
                target_column: column.to_string(),
            };
        }
        let alias = self.next_alias("t");
        Expr::subquery(
            SelectQuery::new(TableRef::new(target.table.as_str(), alias.as_str()))
                .project(Expr::column(alias.as_str(), column), ValueKind::Any)
                .and_where(
                    Expr::column(alias.as_str(), target.id_column())
                        .equals(Expr::column(ROOT, reference.column.as_str())),
                ),
        )
    }

    /// Row restrictions: caller access, owner scope and filters
    fn restriction(&mut self) -> GistResult<Option<Expr>> {
        let query = self.query;
        let mut parts = Vec::new();
        if let Some(access) = self.read_restriction(self.element, ROOT)? {
            parts.push(access);
        }
        if let Some(owner) = &query.owner {
            let owner_schema = self.type_schema(&owner.owner_type)?;
            let collection = owner_schema
                .property(&owner.collection_property)
                .ok_or_else(|| {
                    GistError::invariant(format!(
                        "unknown owner collection `{}`",
                        owner.collection_property
                    ))
                })?;
            let owner_id = self.bind("OwnerId", Value::String(owner.id.clone()));
            let members = self.members(collection, owner_id)?;
            parts.push(
                Expr::column(ROOT, self.element.id_column()).in_subquery(members, query.inverse),
            );
        }
        if let Some(filters) = self.filters()? {
            parts.push(filters);
        }
        Ok((!parts.is_empty()).then(|| Expr::all(parts)))
    }

    /// Requested orders followed by the primary key tiebreaker
    fn orders(&mut self) -> GistResult<Vec<OrderTerm>> {
        let query = self.query;
        let id = id_property(self.element);
        let mut terms = Vec::with_capacity(query.orders.len() + 1);
        for order in &query.orders {
            let (expr, _) = self.column_expr(&order.path)?;
            terms.push(match order.direction {
                Direction::Asc => OrderTerm::asc(expr),
                Direction::Desc => OrderTerm::desc(expr),
            });
        }
        if !query.orders.iter().any(|o| o.path == id) {
            terms.push(OrderTerm::asc(Expr::column(ROOT, self.element.id_column())));
        }
        Ok(terms)
    }
}
