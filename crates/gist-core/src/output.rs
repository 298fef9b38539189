//! Presentation of list responses as JSON or CSV.
//!
//! JSON rows become objects keyed by field name, dotted names nest, and the
//! references column becomes `apiEndpoints`. Support fields never appear.
//! Unless headless, rows are wrapped in an envelope with the pager:
//!
//! ```json
//! {"pager": {"page": 1, "pageSize": 50}, "widgets": [{"name": "Acme One"}]}
//! ```

use crate::error::{GistError, GistResult};
use crate::query::Field;
use crate::schema::SchemaRegistry;
use crate::service::GistResponse;
use crate::transform::Row;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde_json::{Map, Value};

/// Element type name to envelope key; the mapping is pure per type name
static COLLECTION_NAMES: Lazy<DashMap<String, String>> = Lazy::new(DashMap::new);

/// Envelope key of a type's list: its collection name, read through a
/// process-wide cache.
pub fn collection_name(registry: &dyn SchemaRegistry, type_name: &str) -> String {
    if let Some(name) = COLLECTION_NAMES.get(type_name) {
        return name.clone();
    }
    let name = registry
        .type_schema(type_name)
        .map(|schema| schema.collection_name.clone())
        .unwrap_or_else(|| type_name.to_string());
    COLLECTION_NAMES.insert(type_name.to_string(), name.clone());
    name
}

/// Response format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Csv,
}

impl OutputFormat {
    /// Format for a request path extension or `format` parameter
    pub fn parse(name: &str) -> Option<OutputFormat> {
        match name.to_ascii_lowercase().as_str() {
            "json" => Some(OutputFormat::Json),
            "csv" => Some(OutputFormat::Csv),
            _ => None,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            OutputFormat::Json => "application/json",
            OutputFormat::Csv => "text/csv",
        }
    }
}

/// Writes [`GistResponse`]s in one [`OutputFormat`].
pub struct GistOutput;

impl GistOutput {
    pub fn write(format: OutputFormat, response: &GistResponse) -> GistResult<String> {
        match format {
            OutputFormat::Json => serde_json::to_string(&Self::json(response))
                .map_err(|e| GistError::Execution(format!("JSON output failed: {}", e))),
            OutputFormat::Csv => Self::csv(response),
        }
    }

    pub fn json(response: &GistResponse) -> Value {
        let fields: Vec<(usize, &Field)> = visible(&response.fields).collect();
        let single = response.headless && fields.len() == 1 && !fields[0].1.is_references();
        let items: Vec<Value> = response
            .rows
            .iter()
            .map(|row| {
                if single {
                    cell(row, fields[0].0)
                } else {
                    Value::Object(object(row, &fields))
                }
            })
            .collect();
        if response.headless {
            return Value::Array(items);
        }
        let mut envelope = Map::new();
        if let Some(pager) = &response.pager {
            envelope.insert(
                "pager".to_string(),
                serde_json::to_value(pager).unwrap_or(Value::Null),
            );
        }
        envelope.insert(response.collection_name.clone(), Value::Array(items));
        Value::Object(envelope)
    }

    /// One header row with the visible field names, then one record per row.
    pub fn csv(response: &GistResponse) -> GistResult<String> {
        let fields: Vec<(usize, &Field)> = visible(&response.fields)
            .filter(|(_, f)| !f.is_references())
            .collect();
        let mut writer = csv::Writer::from_writer(vec![]);
        writer
            .write_record(fields.iter().map(|(_, f)| f.name()))
            .map_err(csv_error)?;
        for row in &response.rows {
            writer
                .write_record(fields.iter().map(|(i, _)| csv_value(&cell(row, *i))))
                .map_err(csv_error)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| GistError::Execution(format!("CSV output failed: {}", e)))?;
        String::from_utf8(bytes)
            .map_err(|e| GistError::Execution(format!("CSV output failed: {}", e)))
    }
}

fn csv_error(e: csv::Error) -> GistError {
    GistError::Execution(format!("CSV output failed: {}", e))
}

fn visible(fields: &[Field]) -> impl Iterator<Item = (usize, &Field)> {
    fields.iter().enumerate().filter(|(_, f)| !f.support)
}

fn cell(row: &Row, index: usize) -> Value {
    row.get(index).cloned().unwrap_or(Value::Null)
}

fn csv_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Row as an object; null values and empty reference maps are left out
fn object(row: &Row, fields: &[(usize, &Field)]) -> Map<String, Value> {
    let mut object = Map::new();
    for (index, field) in fields {
        let value = cell(row, *index);
        match &value {
            Value::Null => continue,
            Value::Object(refs) if field.is_references() && refs.is_empty() => continue,
            _ => {}
        }
        insert_path(&mut object, field.name(), value);
    }
    object
}

/// Insert under a dotted name as nested objects; a name whose head is
/// already taken by a non-object value stays flat.
fn insert_path(object: &mut Map<String, Value>, name: &str, value: Value) {
    let Some((head, rest)) = name.split_once('.') else {
        object.insert(name.to_string(), value);
        return;
    };
    if !matches!(object.get(head), None | Some(Value::Object(_))) {
        object.insert(name.to_string(), value);
        return;
    }
    if let Value::Object(inner) = object
        .entry(head.to_string())
        .or_insert_with(|| Value::Object(Map::new()))
    {
        insert_path(inner, rest, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pager::GistPager;
    use crate::query::Paging;
    use crate::test_fixtures::registry;
    use serde_json::json;

    fn response(fields: Vec<Field>, rows: Vec<Row>) -> GistResponse {
        GistResponse {
            fields,
            rows,
            pager: Some(GistPager::new(&Paging::new(0, 50), 1, None, None)),
            collection_name: "widgets".to_string(),
            headless: false,
        }
    }

    #[test]
    fn test_collection_name_is_cached_per_type() {
        let registry = registry();
        assert_eq!(collection_name(&registry, "UserGroup"), "userGroups");
        assert_eq!(collection_name(&registry, "UserGroup"), "userGroups");
        assert_eq!(collection_name(&registry, "Unknown"), "Unknown");
    }

    #[test]
    fn test_json_envelope_nests_and_skips_support() {
        let response = response(
            vec![
                Field::new("name"),
                Field::new("owner.surname"),
                Field::new("id").as_support(),
                Field::references(),
            ],
            vec![vec![
                json!("Acme One"),
                json!("Smith"),
                json!("w1"),
                json!({"owner": "/api/users/u1/gist"}),
            ]],
        );

        assert_eq!(
            GistOutput::json(&response),
            json!({
                "pager": {"page": 1, "pageSize": 50},
                "widgets": [{
                    "name": "Acme One",
                    "owner": {"surname": "Smith"},
                    "apiEndpoints": {"owner": "/api/users/u1/gist"}
                }]
            })
        );
    }

    #[test]
    fn test_json_omits_nulls_and_empty_endpoints() {
        let response = response(
            vec![Field::new("name"), Field::new("code"), Field::references()],
            vec![vec![json!("Acme"), Value::Null, json!({})]],
        );
        assert_eq!(GistOutput::json(&response)["widgets"], json!([{"name": "Acme"}]));
    }

    #[test]
    fn test_headless_single_field_is_flat() {
        let mut response = response(
            vec![Field::new("name")],
            vec![vec![json!("a")], vec![json!("b")]],
        );
        response.headless = true;
        assert_eq!(GistOutput::json(&response), json!(["a", "b"]));
    }

    #[test]
    fn test_flat_name_when_head_is_scalar() {
        let mut object = Map::new();
        insert_path(&mut object, "owner", json!("u1"));
        insert_path(&mut object, "owner.surname", json!("Smith"));
        assert_eq!(
            Value::Object(object),
            json!({"owner": "u1", "owner.surname": "Smith"})
        );
    }

    #[test]
    fn test_csv_header_and_values() {
        let response = response(
            vec![
                Field::new("name"),
                Field::new("tags").with_alias("tagIds"),
                Field::new("age"),
                Field::references(),
            ],
            vec![
                vec![json!("Acme, Inc"), json!(["t1", "t2"]), json!(3), json!({})],
                vec![json!("Other"), json!([]), Value::Null, json!({})],
            ],
        );

        let csv = GistOutput::csv(&response).unwrap();

        assert_eq!(
            csv,
            "name,tagIds,age\n\"Acme, Inc\",\"[\"\"t1\"\",\"\"t2\"\"]\",3\nOther,[],\n"
        );
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!(OutputFormat::parse("CSV"), Some(OutputFormat::Csv));
        assert_eq!(OutputFormat::parse("xml"), None);
        assert_eq!(OutputFormat::Json.content_type(), "application/json");
    }
}
