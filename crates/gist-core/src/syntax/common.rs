//! Shared parser primitives for the request syntaxes.

use chumsky::extra;
use chumsky::prelude::*;

/// Extra type for parsers - uses Rich errors for better messages
pub type Extra<'src> = extra::Err<Rich<'src, char>>;

// ============================================================================
// Primitive parsers
// ============================================================================

/// Parser for identifiers: alphanumeric + underscore
pub fn ident<'src>() -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    any()
        .filter(|c: &char| c.is_alphanumeric() || *c == '_')
        .repeated()
        .at_least(1)
        .to_slice()
        .map(|s: &str| s.to_string())
        .labelled("identifier")
}

/// Parser for transformation names, which may be kebab-cased
pub fn transform_name<'src>() -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    any()
        .filter(|c: &char| c.is_alphanumeric() || *c == '_' || *c == '-')
        .repeated()
        .at_least(1)
        .to_slice()
        .map(|s: &str| s.to_string())
        .labelled("transformation name")
}

/// Parser for dotted property paths: `name`, `owner.code`
pub fn property_path<'src>() -> impl Parser<'src, &'src str, &'src str, Extra<'src>> + Clone {
    any()
        .filter(|c: &char| c.is_alphanumeric() || *c == '_' || *c == '.')
        .repeated()
        .at_least(1)
        .to_slice()
        .labelled("property path")
}

/// Parser for a balanced `[...]` group, returned verbatim
pub fn bracket_group<'src>() -> impl Parser<'src, &'src str, &'src str, Extra<'src>> + Clone {
    recursive(|group| {
        just('[')
            .then(
                choice((none_of("[]").ignored(), group.ignored()))
                    .repeated(),
            )
            .then(just(']'))
            .to_slice()
    })
    .labelled("sub-field list like [id,name]")
}

// ============================================================================
// Error formatting
// ============================================================================

/// Format chumsky errors for an error message
pub fn format_errors(errs: &[Rich<'_, char>]) -> String {
    errs.iter()
        .map(|e| {
            let start = e.span().start;
            let found = e
                .found()
                .map_or("end of input".to_string(), |c| format!("'{}'", c));
            format!("column {}: {} (found {})", start + 1, e.reason(), found)
        })
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ident_simple() {
        let result = ident().parse("foo_bar1").into_result();
        assert_eq!(result.unwrap(), "foo_bar1");
    }

    #[test]
    fn test_property_path_nested() {
        let result = property_path().parse("owner.code").into_result();
        assert_eq!(result.unwrap(), "owner.code");
    }

    #[test]
    fn test_transform_name_kebab() {
        let result = transform_name().parse("id-objects").into_result();
        assert_eq!(result.unwrap(), "id-objects");
    }

    #[test]
    fn test_bracket_group_nested() {
        let result = bracket_group().parse("[id,owner[id,name]]").into_result();
        assert_eq!(result.unwrap(), "[id,owner[id,name]]");
    }

    #[test]
    fn test_bracket_group_unbalanced() {
        let result = bracket_group().parse("[id,name").into_result();
        assert!(result.is_err());
    }
}
