//! Typing of filter arguments.
//!
//! Filter arguments arrive as strings and are typed from the declared
//! property type before binding, so the store never sees an integer
//! column compared with arbitrary text.

use crate::schema::PropertyType;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Number, Value};

/// Store representation of date-times
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

fn type_label(property_type: PropertyType) -> &'static str {
    match property_type {
        PropertyType::Integer | PropertyType::Collection => "integer",
        PropertyType::Number => "number",
        PropertyType::Boolean => "boolean",
        PropertyType::Date => "date",
        PropertyType::Json => "JSON",
        PropertyType::Identifier | PropertyType::Text | PropertyType::Reference => "text",
    }
}

/// Type `raw` for comparison with a property of `property_type`.
///
/// Collections compare by size, so their arguments are integers.
pub fn typed_value(property_type: PropertyType, raw: &str) -> Result<Value, String> {
    let invalid = || format!("`{}` is not a valid {}", raw, type_label(property_type));
    let trimmed = raw.trim();
    match property_type {
        PropertyType::Integer | PropertyType::Collection => trimmed
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| invalid()),
        PropertyType::Number => trimmed
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(invalid),
        PropertyType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(invalid()),
        },
        PropertyType::Date => parse_date(trimmed)
            .map(Value::String)
            .ok_or_else(invalid),
        PropertyType::Identifier
        | PropertyType::Text
        | PropertyType::Reference
        | PropertyType::Json => Ok(Value::String(raw.to_string())),
    }
}

/// Normalize a date or date-time argument to the store format.
fn parse_date(raw: &str) -> Option<String> {
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date.format("%Y-%m-%d").to_string());
    }
    if let Ok(date_time) = DateTime::parse_from_rfc3339(raw) {
        return Some(date_time.naive_utc().format(DATE_TIME_FORMAT).to_string());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|dt| dt.format(DATE_TIME_FORMAT).to_string())
}

/// Coerce a stored attribute value to its declared type; values that do
/// not parse are kept as they are.
pub fn coerce_attribute_value(property_type: PropertyType, value: Value) -> Value {
    let scalar = matches!(
        property_type,
        PropertyType::Integer | PropertyType::Number | PropertyType::Boolean
    );
    if let (true, Value::String(s)) = (scalar, &value) {
        if let Ok(typed) = typed_value(property_type, s) {
            return typed;
        }
    }
    value
}
