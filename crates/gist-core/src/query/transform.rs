//! Field transformations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a field's value is derived from its property.
///
/// Collections are never embedded as raw arrays; the planner resolves
/// `Auto` and degrades `None` on collections to `Size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Transform {
    None,
    #[default]
    Auto,
    Ids,
    IdObjects,
    Size,
    IsEmpty,
    IsNotEmpty,
    Member,
    NotMember,
    Pluck,
    From,
}

impl Transform {
    /// Parse a transformation name as written after `::` or `~`.
    pub fn parse(name: &str) -> Option<Transform> {
        let normalized: String = name
            .trim()
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "none" => Some(Transform::None),
            "auto" => Some(Transform::Auto),
            "ids" => Some(Transform::Ids),
            "idobjects" => Some(Transform::IdObjects),
            "size" => Some(Transform::Size),
            "isempty" => Some(Transform::IsEmpty),
            "isnotempty" => Some(Transform::IsNotEmpty),
            "member" => Some(Transform::Member),
            "notmember" => Some(Transform::NotMember),
            "pluck" => Some(Transform::Pluck),
            "from" => Some(Transform::From),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Transform::None => "none",
            Transform::Auto => "auto",
            Transform::Ids => "ids",
            Transform::IdObjects => "id-objects",
            Transform::Size => "size",
            Transform::IsEmpty => "is-empty",
            Transform::IsNotEmpty => "is-not-empty",
            Transform::Member => "member",
            Transform::NotMember => "not-member",
            Transform::Pluck => "pluck",
            Transform::From => "from",
        }
    }

    /// Takes a required argument in parentheses
    pub fn requires_argument(self) -> bool {
        matches!(
            self,
            Transform::Member | Transform::NotMember | Transform::From
        )
    }

    /// Produces a list of item values
    pub fn is_listing(self) -> bool {
        matches!(self, Transform::Ids | Transform::IdObjects | Transform::Pluck)
    }

    /// Computed from a count of items
    pub fn is_counting(self) -> bool {
        matches!(
            self,
            Transform::Size
                | Transform::IsEmpty
                | Transform::IsNotEmpty
                | Transform::Member
                | Transform::NotMember
        )
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("ids", Transform::Ids)]
    #[test_case("id-objects", Transform::IdObjects)]
    #[test_case("id_objects", Transform::IdObjects)]
    #[test_case("idObjects", Transform::IdObjects)]
    #[test_case("is-not-empty", Transform::IsNotEmpty)]
    #[test_case("not-member", Transform::NotMember)]
    #[test_case("PLUCK", Transform::Pluck)]
    fn test_parse(name: &str, expected: Transform) {
        assert_eq!(Transform::parse(name), Some(expected));
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert_eq!(Transform::parse("rename"), None);
        assert_eq!(Transform::parse("explode"), None);
    }

    #[test]
    fn test_names_round_trip() {
        for t in [
            Transform::None,
            Transform::Auto,
            Transform::Ids,
            Transform::IdObjects,
            Transform::Size,
            Transform::IsEmpty,
            Transform::IsNotEmpty,
            Transform::Member,
            Transform::NotMember,
            Transform::Pluck,
            Transform::From,
        ] {
            assert_eq!(Transform::parse(t.name()), Some(t));
        }
    }
}
