//! Request parameters.
//!
//! [`GistParams`] is the request-shaped input of a list query. It can be
//! deserialized by a web layer or built from raw `key=value` pairs, and is
//! turned into a [`GistQuery`] with [`GistParams::to_query`].

use crate::error::{GistError, GistResult};
use crate::query::{AutoDetail, GistQuery, Owner, Paging};
use crate::syntax::{parse_fields, parse_filters, parse_orders};
use gist_config::GistConfig;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Raw request parameters of a list query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GistParams {
    pub fields: Option<String>,
    /// Repeatable
    pub filter: Vec<String>,
    pub order: Option<String>,
    /// 1-based page number
    pub page: Option<u64>,
    pub page_size: Option<u32>,
    pub total: bool,
    pub auto: Option<String>,
    pub translate: Option<bool>,
    pub locale: Option<String>,
    pub absolute_urls: bool,
    pub headless: bool,
    /// `AND` (default) or `OR`
    pub root_junction: Option<String>,
    pub inverse: bool,
    pub references: Option<bool>,
    pub typed_attribute_values: bool,
    pub include_ancestors: bool,
    /// URL the request was made with; pager links are derived from it
    #[serde(skip)]
    pub request_url: Option<String>,
}

fn parse_bool(key: &str, value: &str) -> GistResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(GistError::Specification(format!(
            "Parameter `{}` expects a boolean but was `{}`",
            key, value
        ))),
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> GistResult<T> {
    value.trim().parse::<T>().map_err(|_| {
        GistError::Specification(format!(
            "Parameter `{}` expects a number but was `{}`",
            key, value
        ))
    })
}

impl GistParams {
    /// Build parameters from decoded `key=value` pairs; `filter` may repeat.
    pub fn from_pairs<'a, I>(pairs: I) -> GistResult<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut params = GistParams::default();
        for (key, value) in pairs {
            match key {
                "fields" => params.fields = Some(value.to_string()),
                "filter" => params.filter.push(value.to_string()),
                "order" => params.order = Some(value.to_string()),
                "page" => params.page = Some(parse_number(key, value)?),
                "pageSize" => params.page_size = Some(parse_number(key, value)?),
                "total" => params.total = parse_bool(key, value)?,
                "auto" => params.auto = Some(value.to_string()),
                "translate" => params.translate = Some(parse_bool(key, value)?),
                "locale" => params.locale = Some(value.to_string()),
                "absoluteUrls" => params.absolute_urls = parse_bool(key, value)?,
                "headless" => params.headless = parse_bool(key, value)?,
                "rootJunction" => params.root_junction = Some(value.to_string()),
                "inverse" => params.inverse = parse_bool(key, value)?,
                "references" => params.references = Some(parse_bool(key, value)?),
                "typedAttributeValues" => params.typed_attribute_values = parse_bool(key, value)?,
                "includeAncestors" => params.include_ancestors = parse_bool(key, value)?,
                other => tracing::trace!(parameter = other, "ignoring unknown parameter"),
            }
        }
        Ok(params)
    }

    /// Build parameters from a URL query string (`a=1&b=2`, percent-encoded).
    pub fn from_query_string(query: &str) -> GistResult<Self> {
        let query = query.trim_start_matches('?');
        let mut decoded = Vec::new();
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            decoded.push((decode_component(key)?, decode_component(value)?));
        }
        Self::from_pairs(decoded.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    pub fn with_request_url(mut self, url: impl Into<String>) -> Self {
        self.request_url = Some(url.into());
        self
    }

    /// Turn the parameters into a query specification for `element_type`.
    pub fn to_query(
        &self,
        element_type: &str,
        owner: Option<Owner>,
        config: &GistConfig,
    ) -> GistResult<GistQuery> {
        let fields = match &self.fields {
            Some(fields) => parse_fields(fields)?,
            None => Vec::new(),
        };

        let mut filters = Vec::new();
        for param in &self.filter {
            filters.extend(parse_filters(param)?);
        }
        if filters.len() > config.query.max_filters {
            return Err(GistError::Specification(format!(
                "Too many filters: {} given, at most {} allowed",
                filters.len(),
                config.query.max_filters
            )));
        }

        let orders = match &self.order {
            Some(order) => parse_orders(order)?,
            None => Vec::new(),
        };

        let auto = self
            .auto
            .as_deref()
            .map(AutoDetail::from_str)
            .transpose()
            .map_err(|e| GistError::Specification(e.to_string()))?;

        let any_filter = match self.root_junction.as_deref().map(str::to_ascii_uppercase) {
            None => false,
            Some(j) if j == "AND" => false,
            Some(j) if j == "OR" => true,
            Some(j) => {
                return Err(GistError::Specification(format!(
                    "Unknown root junction `{}`, expected AND or OR",
                    j
                )))
            }
        };

        let size = config.query.clamp_page_size(self.page_size);
        let page = self.page.unwrap_or(1).max(1);
        let paging = Paging::page(page, size)
            .ok_or_else(|| {
                GistError::Specification(format!(
                    "Page {} of size {} is out of range",
                    page, size
                ))
            })?
            .with_total(self.total);

        let mut query = GistQuery::new(element_type)
            .with_fields(fields)
            .with_filters(filters)
            .with_orders(orders)
            .with_paging(paging)
            .with_translate(self.translate.unwrap_or(true))
            .with_locale(
                self.locale
                    .clone()
                    .unwrap_or_else(|| config.query.default_locale.clone()),
            )
            .with_references(self.references.unwrap_or(config.query.references))
            .with_absolute_urls(self.absolute_urls)
            .with_headless(self.headless)
            .with_any_filter(any_filter)
            .with_inverse(self.inverse)
            .with_typed_attribute_values(self.typed_attribute_values)
            .with_include_ancestors(self.include_ancestors)
            .with_endpoint_root(config.endpoints.endpoint_root(self.absolute_urls));
        query.auto = auto;
        query.owner = owner;
        query.request_url = self.request_url.clone();
        Ok(query)
    }
}

fn decode_component(raw: &str) -> GistResult<String> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .map_err(|e| GistError::Specification(format!("Invalid encoding in `{}`: {}", raw, e)))
}
