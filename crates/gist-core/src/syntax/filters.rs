//! Filter and order syntax.
//!
//! Filters: `[group:]path:operator[:value]` where the value is either a
//! single argument or a bracketed list `[a,b,c]`. Orders: `path[:asc|:desc]`.

use crate::error::{GistError, GistResult};
use crate::query::{Comparison, Direction, Filter, Order};
use once_cell::sync::Lazy;
use regex::Regex;

/// `[group:]path:operator[:value]`
static FILTER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:(\d+):)?([^:\s]+):([^:\s]+)(?::(.*))?$").unwrap());

/// `path[:asc|:desc]`
static ORDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*([A-Za-z0-9_.]+)(?::(asc|desc))?\s*$").unwrap());

/// Parse one `filter` parameter value.
pub fn parse_filter(input: &str) -> GistResult<Filter> {
    let caps = FILTER_RE.captures(input).ok_or_else(|| {
        GistError::Specification(format!(
            "Invalid filter `{}`, expected `property:operator[:value]`",
            input
        ))
    })?;

    let path = &caps[2];
    let symbol = &caps[3];
    let operator = Comparison::parse(symbol).ok_or_else(|| {
        GistError::Specification(format!(
            "Unknown filter operator `{}` in filter `{}`",
            symbol, input
        ))
    })?;

    let mut filter = Filter::new(path, operator);
    if let Some(group) = caps.get(1) {
        let group = group.as_str().parse::<i32>().map_err(|_| {
            GistError::Specification(format!("Invalid filter group in `{}`", input))
        })?;
        filter = filter.with_group(group);
    }
    if let Some(value) = caps.get(4) {
        filter = filter.with_values(split_values(value.as_str()));
    }
    Ok(filter)
}

/// Parse one `filter` parameter value holding one or more comma-separated
/// filters. Commas inside `[...]` lists belong to the list.
pub fn parse_filters(input: &str) -> GistResult<Vec<Filter>> {
    split_outside_brackets(input)
        .into_iter()
        .filter(|item| !item.trim().is_empty())
        .map(parse_filter)
        .collect()
}

fn split_outside_brackets(input: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in input.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                items.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    items.push(&input[start..]);
    items
}

/// Split a filter argument into its values.
///
/// `[a,b]` is a list, `[]` is no value, anything else is one value.
fn split_values(value: &str) -> Vec<String> {
    let trimmed = value.trim();
    match trimmed
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
    {
        Some(inner) if inner.trim().is_empty() => Vec::new(),
        Some(inner) => inner.split(',').map(|v| v.trim().to_string()).collect(),
        None => vec![trimmed.to_string()],
    }
}

/// Parse the comma-separated `order` parameter.
pub fn parse_orders(input: &str) -> GistResult<Vec<Order>> {
    input
        .split(',')
        .filter(|item| !item.trim().is_empty())
        .map(|item| {
            let caps = ORDER_RE.captures(item).ok_or_else(|| {
                GistError::Specification(format!(
                    "Invalid order `{}`, expected `property[:asc|:desc]`",
                    item.trim()
                ))
            })?;
            let direction = match caps.get(2).map(|d| d.as_str().to_ascii_lowercase()) {
                Some(d) if d == "desc" => Direction::Desc,
                _ => Direction::Asc,
            };
            Ok(Order {
                path: caps[1].to_string(),
                direction,
            })
        })
        .collect()
}
