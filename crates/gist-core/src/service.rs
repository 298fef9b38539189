//! End-to-end list service.
//!
//! Wires the stages together: plan, validate, compile, render, execute,
//! transform each row as it streams in, then count and page.

use crate::access::AccessControl;
use crate::compiler::{CompiledQuery, GistCompiler};
use crate::error::{GistError, GistResult};
use crate::output::{collection_name, GistOutput, OutputFormat};
use crate::pager::GistPager;
use crate::params::GistParams;
use crate::pipeline::StagePipeline;
use crate::planner::{id_property, GistPlanner};
use crate::query::{Comparison, Field, Filter, GistQuery, Owner, Paging};
use crate::render::{QueryRenderer, RenderedQuery, SqliteRenderer};
use crate::schema::SchemaRegistry;
use crate::transform::Row;
use crate::validator::GistValidator;
use gist_config::GistConfig;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Runs rendered queries against a backing store.
pub trait GistExecutor: Send + Sync {
    /// Stream the rows of `query` into `sink`, stopping at the first error
    fn fetch(
        &self,
        query: &RenderedQuery,
        sink: &mut dyn FnMut(Row) -> GistResult<()>,
    ) -> GistResult<()>;

    /// Run a single-column count query
    fn count(&self, query: &RenderedQuery) -> GistResult<u64>;
}

/// Result of one list request.
#[derive(Debug, Clone, PartialEq)]
pub struct GistResponse {
    /// Planned fields, support fields included; rows have one value each
    pub fields: Vec<Field>,
    pub rows: Vec<Row>,
    /// Absent for headless responses
    pub pager: Option<GistPager>,
    /// Envelope key of the rows
    pub collection_name: String,
    pub headless: bool,
}

/// List service over one registry, access provider and executor.
pub struct GistService<E: GistExecutor> {
    registry: Arc<dyn SchemaRegistry>,
    access: Arc<dyn AccessControl>,
    executor: E,
    config: GistConfig,
    renderer: Arc<dyn QueryRenderer>,
}

impl<E: GistExecutor> GistService<E> {
    pub fn new(
        registry: Arc<dyn SchemaRegistry>,
        access: Arc<dyn AccessControl>,
        executor: E,
        config: GistConfig,
    ) -> Self {
        Self {
            registry,
            access,
            executor,
            config,
            renderer: Arc::new(SqliteRenderer::new()),
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn QueryRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn config(&self) -> &GistConfig {
        &self.config
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Planned and validated form of `query`
    pub fn plan(&self, query: GistQuery) -> GistResult<GistQuery> {
        let registry = self.registry.as_ref();
        let access = self.access.as_ref();
        StagePipeline::new()
            .with_stage(GistPlanner::new(registry, access, &self.config.query))
            .with_stage(GistValidator::new(registry, access))
            .run(query)
    }

    pub fn compile(&self, plan: &GistQuery) -> GistResult<CompiledQuery> {
        GistCompiler::new(self.registry.as_ref(), Arc::clone(&self.access))
            .with_default_locale(self.config.query.default_locale.as_str())
            .compile(plan)
    }

    /// List from request parameters
    pub fn list_params(
        &self,
        element_type: &str,
        owner: Option<Owner>,
        params: &GistParams,
    ) -> GistResult<GistResponse> {
        self.list(params.to_query(element_type, owner, &self.config)?)
    }

    /// List and write the response in `format`
    pub fn list_as(&self, query: GistQuery, format: OutputFormat) -> GistResult<String> {
        GistOutput::write(format, &self.list(query)?)
    }

    pub fn list(&self, query: GistQuery) -> GistResult<GistResponse> {
        let plan = self.plan(query)?;
        let compiled = self.compile(&plan)?;
        let fetch = self.renderer.render(&compiled.fetch, &compiled.params)?;
        let mut rows = self.fetch_rows(&fetch, &compiled)?;
        debug!(
            element_type = %plan.element_type,
            renderer = self.renderer.name(),
            rows = rows.len(),
            "fetched gist page"
        );

        let pager = if plan.headless {
            None
        } else {
            let total = if plan.paging.want_total {
                Some(self.total(&plan, &compiled, rows.len())?)
            } else {
                None
            };
            Some(GistPager::new(
                &plan.paging,
                rows.len(),
                total,
                plan.request_url.as_deref(),
            ))
        };

        if plan.include_ancestors {
            self.add_ancestors(&plan, &mut rows)?;
        }

        let collection_name = match &plan.owner {
            Some(owner) => owner.collection_property.clone(),
            None => collection_name(self.registry.as_ref(), &plan.element_type),
        };
        Ok(GistResponse {
            fields: plan.fields,
            rows,
            pager,
            collection_name,
            headless: plan.headless,
        })
    }

    fn fetch_rows(&self, query: &RenderedQuery, compiled: &CompiledQuery) -> GistResult<Vec<Row>> {
        let mut rows = Vec::new();
        self.executor.fetch(query, &mut |mut row: Row| {
            compiled.transformers.apply(&mut row);
            rows.push(row);
            Ok(())
        })?;
        Ok(rows)
    }

    /// Total from the page alone when possible, else from the count query
    fn total(&self, plan: &GistQuery, compiled: &CompiledQuery, rows: usize) -> GistResult<u64> {
        if let Some(total) = GistPager::inferred_total(&plan.paging, rows) {
            return Ok(total);
        }
        if rows == 0 && plan.paging.offset == 0 {
            return Ok(0);
        }
        let count = self.renderer.render(&compiled.count, &compiled.params)?;
        let total = self.executor.count(&count)?;
        debug!(element_type = %plan.element_type, total, "counted gist rows");
        Ok(total)
    }

    /// Append the ancestors of every listed object not already on the page
    /// and sort all rows by hierarchy path.
    fn add_ancestors(&self, plan: &GistQuery, rows: &mut Vec<Row>) -> GistResult<()> {
        let schema = self
            .registry
            .type_schema(&plan.element_type)
            .ok_or_else(|| GistError::invariant(format!("unknown type `{}`", plan.element_type)))?;
        let hierarchy = schema.hierarchy_path.as_deref().ok_or_else(|| {
            GistError::invariant(format!("type `{}` is not hierarchical", plan.element_type))
        })?;
        let id = id_property(schema);
        let (Some(path_index), Some(id_index)) = (plan.field_index(hierarchy), plan.field_index(id))
        else {
            return Err(GistError::invariant("hierarchy support fields are missing"));
        };

        let listed: HashSet<String> = rows
            .iter()
            .filter_map(|row| row.get(id_index).and_then(Value::as_str))
            .map(str::to_string)
            .collect();
        let mut ancestors: Vec<String> = Vec::new();
        for row in rows.iter() {
            let Some(path) = row.get(path_index).and_then(Value::as_str) else {
                continue;
            };
            let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
            for ancestor in segments.iter().take(segments.len().saturating_sub(1)) {
                if !listed.contains(*ancestor) && !ancestors.iter().any(|a| a == ancestor) {
                    ancestors.push(ancestor.to_string());
                }
            }
        }

        if !ancestors.is_empty() {
            let mut lookup = plan.clone();
            lookup.owner = None;
            lookup.any_filter = false;
            lookup.include_ancestors = false;
            lookup.orders.clear();
            lookup.filters = vec![Filter::new(id, Comparison::In).with_values(ancestors.iter())];
            lookup.paging = Paging::new(0, u32::try_from(ancestors.len()).unwrap_or(u32::MAX));
            let compiled = self.compile(&lookup)?;
            let fetch = self.renderer.render(&compiled.fetch, &compiled.params)?;
            let found = self.fetch_rows(&fetch, &compiled)?;
            debug!(
                element_type = %plan.element_type,
                ancestors = found.len(),
                "fetched gist ancestors"
            );
            rows.extend(found);
        }

        rows.sort_by(|a, b| {
            let path = |row: &Row| {
                row.get(path_index)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            path(a).cmp(&path(b))
        });
        Ok(())
    }
}
