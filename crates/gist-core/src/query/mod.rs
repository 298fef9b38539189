//! Query specification.
//!
//! A [`GistQuery`] describes one list request: what type to list, which
//! fields to return, how to filter, order and page. It is built once per
//! request and threaded through the planner, validator and compiler; each
//! stage returns a modified copy instead of mutating its input.

mod comparison;
mod transform;

pub use comparison::Comparison;
pub use gist_config::AutoDetail;
pub use transform::Transform;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Owner scope: list the members of one owner's collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    /// Type of the owning object
    pub owner_type: String,
    /// Identifier of the owning object
    pub id: String,
    /// Name of the collection property on the owner type
    pub collection_property: String,
}

impl Owner {
    pub fn new(
        owner_type: impl Into<String>,
        id: impl Into<String>,
        collection_property: impl Into<String>,
    ) -> Self {
        Self {
            owner_type: owner_type.into(),
            id: id.into(),
            collection_property: collection_property.into(),
        }
    }
}

/// A requested output column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Dotted property path, a preset token, or an attribute id
    pub path: String,
    pub transformation: Transform,
    /// Output name; defaults to the path
    pub alias: Option<String>,
    pub transformation_argument: Option<String>,
    /// Translate this field even when the query does not
    pub translate: bool,
    /// Path is a dynamic attribute id, not a property
    pub attribute: bool,
    /// Added by the planner for another field's computation; not returned
    pub support: bool,
}

impl Field {
    /// Path of the synthetic references field
    pub const REFS_PATH: &'static str = "__refs__";
    /// Output name of the synthetic references field
    pub const REFS_NAME: &'static str = "apiEndpoints";

    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            transformation: Transform::Auto,
            alias: None,
            transformation_argument: None,
            translate: false,
            attribute: false,
            support: false,
        }
    }

    /// The synthetic references field
    pub fn references() -> Self {
        Self::new(Self::REFS_PATH).with_alias(Self::REFS_NAME)
    }

    pub fn with_transformation(mut self, transformation: Transform) -> Self {
        self.transformation = transformation;
        self
    }

    pub fn with_argument(mut self, argument: impl Into<String>) -> Self {
        self.transformation_argument = Some(argument.into());
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_translate(mut self, translate: bool) -> Self {
        self.translate = translate;
        self
    }

    pub fn as_attribute(mut self) -> Self {
        self.attribute = true;
        self
    }

    pub fn as_support(mut self) -> Self {
        self.support = true;
        self
    }

    /// Output name: the alias when set, the path otherwise
    pub fn name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.path)
    }

    pub fn is_references(&self) -> bool {
        self.path == Self::REFS_PATH
    }

    /// `*` or `:preset` token not yet expanded
    pub fn is_preset(&self) -> bool {
        self.path == "*" || self.path.starts_with(':')
    }

    /// `-path` or `!path` removal token not yet applied
    pub fn is_removal(&self) -> bool {
        self.path.starts_with('-') || self.path.starts_with('!')
    }

    pub fn is_nested(&self) -> bool {
        self.path.contains('.')
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)?;
        if self.transformation != Transform::Auto {
            write!(f, "::{}", self.transformation)?;
            if let Some(arg) = &self.transformation_argument {
                write!(f, "({})", arg)?;
            }
        }
        if let Some(alias) = &self.alias {
            write!(f, "~rename({})", alias)?;
        }
        Ok(())
    }
}

/// A filter condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// Sub-group number; negative means ungrouped
    pub group: i32,
    pub path: String,
    pub operator: Comparison,
    pub values: Vec<String>,
    /// Path is a dynamic attribute id
    pub attribute: bool,
}

impl Filter {
    pub fn new(path: impl Into<String>, operator: Comparison) -> Self {
        Self {
            group: -1,
            path: path.into(),
            operator,
            values: Vec::new(),
            attribute: false,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.values.push(value.into());
        self
    }

    pub fn with_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.values.extend(values.into_iter().map(Into::into));
        self
    }

    pub fn with_group(mut self, group: i32) -> Self {
        self.group = group;
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn as_attribute(mut self) -> Self {
        self.attribute = true;
        self
    }

    pub fn is_grouped(&self) -> bool {
        self.group >= 0
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:[{}]",
            self.path,
            self.operator,
            self.values.join(", ")
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub path: String,
    pub direction: Direction,
}

impl Order {
    pub fn asc(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            direction: Direction::Desc,
        }
    }
}

/// Window of the result to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paging {
    pub offset: u64,
    pub size: u32,
    pub want_total: bool,
}

impl Paging {
    pub fn new(offset: u64, size: u32) -> Self {
        Self {
            offset,
            size,
            want_total: false,
        }
    }

    /// Paging for a 1-based page number, `None` when the offset is beyond
    /// what a store can address (`i64::MAX`)
    pub fn page(page: u64, size: u32) -> Option<Self> {
        page.saturating_sub(1)
            .checked_mul(u64::from(size))
            .filter(|offset| i64::try_from(*offset).is_ok())
            .map(|offset| Self::new(offset, size))
    }

    pub fn with_total(mut self, want_total: bool) -> Self {
        self.want_total = want_total;
        self
    }

    /// 1-based page number of the window
    pub fn page_number(&self) -> u64 {
        1 + self.offset / u64::from(self.size.max(1))
    }
}

impl Default for Paging {
    fn default() -> Self {
        Self::new(0, 50)
    }
}

/// Immutable description of one list request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GistQuery {
    pub element_type: String,
    pub owner: Option<Owner>,
    pub fields: Vec<Field>,
    pub filters: Vec<Filter>,
    pub orders: Vec<Order>,
    pub paging: Paging,
    /// Detail level named by the request, if any
    pub auto: Option<AutoDetail>,
    pub translate: bool,
    pub translation_locale: Option<String>,
    pub references: bool,
    pub absolute_urls: bool,
    pub headless: bool,
    /// Combine root filters with OR instead of AND
    pub any_filter: bool,
    /// List non-members of the owner collection
    pub inverse: bool,
    pub typed_attribute_values: bool,
    /// Include the ancestors of each listed object of a hierarchical type
    pub include_ancestors: bool,
    /// Root prefixed to endpoint links
    pub endpoint_root: String,
    /// URL of the request, used to build pager links
    pub request_url: Option<String>,
}

impl GistQuery {
    pub fn new(element_type: impl Into<String>) -> Self {
        Self {
            element_type: element_type.into(),
            owner: None,
            fields: Vec::new(),
            filters: Vec::new(),
            orders: Vec::new(),
            paging: Paging::default(),
            auto: None,
            translate: true,
            translation_locale: None,
            references: true,
            absolute_urls: false,
            headless: false,
            any_filter: false,
            inverse: false,
            typed_attribute_values: false,
            include_ancestors: false,
            endpoint_root: "/api".to_string(),
            request_url: None,
        }
    }

    pub fn with_owner(mut self, owner: Owner) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn with_fields(mut self, fields: Vec<Field>) -> Self {
        self.fields = fields;
        self
    }

    /// Append one field
    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_filters(mut self, filters: Vec<Filter>) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_orders(mut self, orders: Vec<Order>) -> Self {
        self.orders = orders;
        self
    }

    pub fn with_order(mut self, order: Order) -> Self {
        self.orders.push(order);
        self
    }

    pub fn with_paging(mut self, paging: Paging) -> Self {
        self.paging = paging;
        self
    }

    pub fn with_auto(mut self, auto: AutoDetail) -> Self {
        self.auto = Some(auto);
        self
    }

    pub fn with_translate(mut self, translate: bool) -> Self {
        self.translate = translate;
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.translation_locale = Some(locale.into());
        self
    }

    pub fn with_references(mut self, references: bool) -> Self {
        self.references = references;
        self
    }

    pub fn with_absolute_urls(mut self, absolute_urls: bool) -> Self {
        self.absolute_urls = absolute_urls;
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_any_filter(mut self, any_filter: bool) -> Self {
        self.any_filter = any_filter;
        self
    }

    pub fn with_inverse(mut self, inverse: bool) -> Self {
        self.inverse = inverse;
        self
    }

    pub fn with_typed_attribute_values(mut self, typed: bool) -> Self {
        self.typed_attribute_values = typed;
        self
    }

    pub fn with_include_ancestors(mut self, include: bool) -> Self {
        self.include_ancestors = include;
        self
    }

    pub fn with_endpoint_root(mut self, root: impl Into<String>) -> Self {
        self.endpoint_root = root.into();
        self
    }

    pub fn with_request_url(mut self, url: impl Into<String>) -> Self {
        self.request_url = Some(url.into());
        self
    }

    /// Index of the field with exactly this path
    pub fn field_index(&self, path: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.path == path)
    }

    pub fn has_field(&self, path: &str) -> bool {
        self.field_index(path).is_some()
    }

    pub fn references_index(&self) -> Option<usize> {
        self.field_index(Field::REFS_PATH)
    }

    /// Fields returned to the caller, in output order
    pub fn visible_fields(&self) -> impl Iterator<Item = (usize, &Field)> {
        self.fields.iter().enumerate().filter(|(_, f)| !f.support)
    }
}

/// Parent part of a dotted path (`""` for a root path)
pub fn parent_path(path: &str) -> &str {
    path.rfind('.').map_or("", |i| &path[..i])
}

/// Last segment of a dotted path
pub fn leaf_name(path: &str) -> &str {
    path.rfind('.').map_or(path, |i| &path[i + 1..])
}

/// `property` on the same parent as `path`
pub fn path_on_same_parent(path: &str, property: &str) -> String {
    let parent = parent_path(path);
    if parent.is_empty() {
        property.to_string()
    } else {
        format!("{}.{}", parent, property)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paging_page_number() {
        assert_eq!(Paging::new(0, 50).page_number(), 1);
        assert_eq!(Paging::new(50, 50).page_number(), 2);
        assert_eq!(Paging::new(49, 50).page_number(), 1);
        assert_eq!(Paging::page(6, 50).unwrap().offset, 250);
        assert_eq!(Paging::page(0, 10).unwrap().offset, 0);
        assert_eq!(Paging::page(u64::MAX, 2), None);
        assert_eq!(Paging::page(1 << 62, 4), None);
    }

    #[test]
    fn test_filter_display_matches_request_form() {
        let filter = Filter::new("surname", Comparison::Gt).with_values(["a", "b"]);
        assert_eq!(filter.to_string(), "surname:gt:[a, b]");

        let unary = Filter::new("surname", Comparison::Null);
        assert_eq!(unary.to_string(), "surname:null:[]");

        let access = Filter::new("surname", Comparison::CanRead).with_value("abc");
        assert_eq!(access.to_string(), "surname:canread:[abc]");
    }

    #[test]
    fn test_field_name_prefers_alias() {
        let field = Field::new("name").with_alias("displayName");
        assert_eq!(field.name(), "displayName");
        assert_eq!(Field::new("code").name(), "code");
        assert_eq!(Field::references().name(), "apiEndpoints");
    }

    #[test]
    fn test_field_tokens() {
        assert!(Field::new("*").is_preset());
        assert!(Field::new(":nameable").is_preset());
        assert!(Field::new("-surname").is_removal());
        assert!(Field::new("!surname").is_removal());
        assert!(Field::new("owner.name").is_nested());
        assert!(!Field::new("name").is_nested());
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(parent_path("owner.name"), "owner");
        assert_eq!(parent_path("name"), "");
        assert_eq!(leaf_name("owner.name"), "name");
        assert_eq!(path_on_same_parent("owner.name", "id"), "owner.id");
        assert_eq!(path_on_same_parent("name", "translations"), "translations");
    }

    #[test]
    fn test_builders_return_copies() {
        let base = GistQuery::new("User");
        let extended = base.clone().with_field(Field::new("name"));
        assert!(base.fields.is_empty());
        assert_eq!(extended.fields.len(), 1);
        assert!(extended.has_field("name"));
    }

    #[test]
    fn test_field_display() {
        let field = Field::new("users")
            .with_transformation(Transform::Pluck)
            .with_argument("surname")
            .with_alias("names");
        assert_eq!(field.to_string(), "users::pluck(surname)~rename(names)");
    }
}
