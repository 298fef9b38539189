//! Row transformers.
//!
//! The compiler emits placeholder columns for values that cannot be
//! computed by the store (links, translations, access summaries, ...) and
//! registers a transformer per column that fills them in after fetching.
//!
//! Transformers run in a total order: by field index, then by registration
//! order within one field. A transformer may read columns written by an
//! earlier one in the same row.

use crate::access::AccessControl;
use crate::schema::{ComputedProperty, PropertyType};
use crate::values::coerce_attribute_value;
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::Arc;

/// One fetched row, one value per projected column
pub type Row = Vec<Value>;

/// Suffix of gist endpoint links
const GIST_PATH: &str = "/gist";

/// Post-fetch computation writing into one column.
#[derive(Clone)]
pub enum RowTransformer {
    /// Replace the value by its best translation for `locale`
    Translate {
        translations: usize,
        key: String,
        locale: String,
    },
    /// `<endpoint>/<id>/gist` from the id column
    EndpointUrl { id: usize, endpoint: String },
    /// Record `<endpoint>/<value>/gist` under `name` in the references column
    ReferenceUrl {
        refs: usize,
        name: String,
        endpoint: String,
    },
    /// Record `<endpoint>/<id>/<property>/gist` under `name` in the references column
    CollectionUrl {
        refs: usize,
        id: usize,
        name: String,
        endpoint: String,
        property: String,
    },
    /// Wrap an identifier as `{"id": value}`
    IdObject,
    /// Wrap each identifier of an array as `{"id": value}`
    IdObjects,
    /// Turn a count into `count == 0` (`empty`) or `count > 0`
    CountToBool { empty: bool },
    /// Look up one attribute value in the attribute bag column
    Attribute {
        bag: usize,
        attribute: String,
        value_type: Option<PropertyType>,
    },
    /// Capability summary of the caller from the sharing column
    AccessSummary {
        sharing: usize,
        type_name: String,
        access: Arc<dyn AccessControl>,
    },
    /// Computed value from named source columns
    Derived {
        sources: Vec<(String, usize)>,
        computed: ComputedProperty,
    },
}

impl fmt::Debug for RowTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowTransformer::Translate {
                translations,
                key,
                locale,
            } => f
                .debug_struct("Translate")
                .field("translations", translations)
                .field("key", key)
                .field("locale", locale)
                .finish(),
            RowTransformer::EndpointUrl { id, endpoint } => f
                .debug_struct("EndpointUrl")
                .field("id", id)
                .field("endpoint", endpoint)
                .finish(),
            RowTransformer::ReferenceUrl {
                refs,
                name,
                endpoint,
            } => f
                .debug_struct("ReferenceUrl")
                .field("refs", refs)
                .field("name", name)
                .field("endpoint", endpoint)
                .finish(),
            RowTransformer::CollectionUrl {
                refs,
                id,
                name,
                endpoint,
                property,
            } => f
                .debug_struct("CollectionUrl")
                .field("refs", refs)
                .field("id", id)
                .field("name", name)
                .field("endpoint", endpoint)
                .field("property", property)
                .finish(),
            RowTransformer::IdObject => f.write_str("IdObject"),
            RowTransformer::IdObjects => f.write_str("IdObjects"),
            RowTransformer::CountToBool { empty } => {
                f.debug_struct("CountToBool").field("empty", empty).finish()
            }
            RowTransformer::Attribute {
                bag,
                attribute,
                value_type,
            } => f
                .debug_struct("Attribute")
                .field("bag", bag)
                .field("attribute", attribute)
                .field("value_type", value_type)
                .finish(),
            RowTransformer::AccessSummary {
                sharing, type_name, ..
            } => f
                .debug_struct("AccessSummary")
                .field("sharing", sharing)
                .field("type_name", type_name)
                .finish_non_exhaustive(),
            RowTransformer::Derived { sources, .. } => f
                .debug_struct("Derived")
                .field("sources", sources)
                .finish_non_exhaustive(),
        }
    }
}

/// Parse JSON documents that arrive as text
fn document(value: &Value) -> Value {
    match value {
        Value::String(text) => serde_json::from_str(text).unwrap_or(Value::Null),
        other => other.clone(),
    }
}

fn cell(row: &Row, index: usize) -> &Value {
    row.get(index).unwrap_or(&Value::Null)
}

fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Best translation of `key` in a translation set for `locale`: exact
/// locale first, then any locale of the same language. Empty values are
/// skipped.
pub fn translate(value: &Value, key: &str, locale: &str, translations: &Value) -> Value {
    let Value::Array(entries) = translations else {
        return value.clone();
    };
    let candidates: Vec<(&str, &str)> = entries
        .iter()
        .filter(|t| {
            t.get("property")
                .and_then(Value::as_str)
                .is_some_and(|p| p.eq_ignore_ascii_case(key))
        })
        .filter_map(|t| {
            let locale = t.get("locale").and_then(Value::as_str)?;
            let value = t.get("value").and_then(Value::as_str)?;
            (!value.is_empty()).then_some((locale, value))
        })
        .collect();
    let language = locale.split(['_', '-']).next().unwrap_or(locale);
    candidates
        .iter()
        .find(|(l, _)| l.eq_ignore_ascii_case(locale))
        .or_else(|| {
            candidates
                .iter()
                .find(|(l, _)| !language.is_empty() && same_language(l, language))
        })
        .map_or_else(|| value.clone(), |(_, v)| Value::String(v.to_string()))
}

/// `locale` is `language` or one of its regional variants
fn same_language(locale: &str, language: &str) -> bool {
    match locale.get(..language.len()) {
        Some(head) if head.eq_ignore_ascii_case(language) => {
            matches!(locale[language.len()..].chars().next(), None | Some('_' | '-'))
        }
        _ => false,
    }
}

/// `<endpoint>/<id>/gist`
pub fn endpoint_url(endpoint: &str, id: &str) -> String {
    format!("{}/{}{}", endpoint, id, GIST_PATH)
}

fn add_reference(row: &mut Row, refs: usize, name: &str, url: String) {
    let Some(slot) = row.get_mut(refs) else {
        return;
    };
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    if let Value::Object(map) = slot {
        map.insert(name.to_string(), Value::String(url));
    }
}

impl RowTransformer {
    /// Apply to column `index` of `row`.
    pub fn apply(&self, index: usize, row: &mut Row) {
        let computed = match self {
            RowTransformer::Translate {
                translations,
                key,
                locale,
            } => translate(
                cell(row, index),
                key,
                locale,
                &document(cell(row, *translations)),
            ),
            RowTransformer::EndpointUrl { id, endpoint } => match id_text(cell(row, *id)) {
                Some(id) => Value::String(endpoint_url(endpoint, &id)),
                None => Value::Null,
            },
            RowTransformer::ReferenceUrl {
                refs,
                name,
                endpoint,
            } => {
                if let Some(id) = id_text(cell(row, index)) {
                    add_reference(row, *refs, name, endpoint_url(endpoint, &id));
                }
                return;
            }
            RowTransformer::CollectionUrl {
                refs,
                id,
                name,
                endpoint,
                property,
            } => {
                if let Some(id) = id_text(cell(row, *id)) {
                    let url = format!("{}/{}/{}{}", endpoint, id, property, GIST_PATH);
                    add_reference(row, *refs, name, url);
                }
                return;
            }
            RowTransformer::IdObject => match cell(row, index) {
                Value::Null => Value::Null,
                id => json!({ "id": id }),
            },
            RowTransformer::IdObjects => match document(cell(row, index)) {
                Value::Array(ids) if !ids.is_empty() => {
                    Value::Array(ids.into_iter().map(|id| json!({ "id": id })).collect())
                }
                _ => Value::Null,
            },
            RowTransformer::CountToBool { empty } => {
                let count = cell(row, index).as_i64().unwrap_or(0);
                Value::Bool(if *empty { count == 0 } else { count > 0 })
            }
            RowTransformer::Attribute {
                bag,
                attribute,
                value_type,
            } => {
                let value = document(cell(row, *bag))
                    .get(attribute)
                    .and_then(|entry| entry.get("value"))
                    .cloned()
                    .unwrap_or(Value::Null);
                match value_type {
                    Some(t) => coerce_attribute_value(*t, value),
                    None => value,
                }
            }
            RowTransformer::AccessSummary {
                sharing,
                type_name,
                access,
            } => access
                .access_summary(type_name, &document(cell(row, *sharing)))
                .to_value(),
            RowTransformer::Derived { sources, computed } => {
                let values: Map<String, Value> = sources
                    .iter()
                    .map(|(name, i)| (name.clone(), cell(row, *i).clone()))
                    .collect();
                computed.compute(&values)
            }
        };
        if let Some(slot) = row.get_mut(index) {
            *slot = computed;
        }
    }
}

/// Transformers of one compiled query, in application order.
#[derive(Debug, Clone, Default)]
pub struct RowTransformers {
    entries: Vec<(usize, RowTransformer)>,
}

impl RowTransformers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transformer for column `index`, keeping the total order.
    pub fn push(&mut self, index: usize, transformer: RowTransformer) {
        let at = self.entries.partition_point(|(i, _)| *i <= index);
        self.entries.insert(at, (index, transformer));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(usize, RowTransformer)> {
        self.entries.iter()
    }

    /// Apply every transformer to one row
    pub fn apply(&self, row: &mut Row) {
        for (index, transformer) in &self.entries {
            transformer.apply(*index, row);
        }
    }
}
