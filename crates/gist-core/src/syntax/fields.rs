//! Field list syntax.
//!
//! Parses the `fields` request parameter:
//! - `name,code` plain properties
//! - `*`, `:nameable` presets
//! - `-surname`, `!surname` removals
//! - `userCredentials[id,username]` sub-field lists (kept verbatim for the planner)
//! - `users::size`, `users~pluck(surname)`, `name::rename(label)` transformation chains

use crate::error::{GistError, GistResult};
use crate::query::{Field, Transform};
use crate::syntax::common::{
    bracket_group, format_errors, ident, property_path, transform_name, Extra,
};
use chumsky::prelude::*;

/// One `::name(arg)` or `~name(arg)` step
fn transform_step<'src>(
) -> impl Parser<'src, &'src str, (String, Option<String>), Extra<'src>> + Clone {
    just("::")
        .or(just("~"))
        .ignore_then(transform_name())
        .then(
            none_of(")")
                .repeated()
                .to_slice()
                .delimited_by(just('('), just(')'))
                .or_not(),
        )
        .map(|(name, arg): (String, Option<&str>)| (name, arg.map(|a| a.trim().to_string())))
        .labelled("transformation like ::size or ~pluck(name)")
}

fn apply_steps(mut field: Field, steps: Vec<(String, Option<String>)>) -> Result<Field, String> {
    for (name, arg) in steps {
        if name.eq_ignore_ascii_case("rename") {
            match arg {
                Some(alias) if !alias.is_empty() => field.alias = Some(alias),
                _ => return Err("rename requires an alias argument".to_string()),
            }
            continue;
        }
        let transform =
            Transform::parse(&name).ok_or_else(|| format!("unknown transformation `{}`", name))?;
        field.transformation = transform;
        field.transformation_argument = arg.filter(|a| !a.is_empty());
    }
    Ok(field)
}

/// Parser for one field list item
fn field_item<'src>() -> impl Parser<'src, &'src str, Field, Extra<'src>> + Clone {
    let removal = one_of("-!")
        .then(property_path())
        .to_slice()
        .map(Field::new)
        .labelled("removal like -name");

    let preset = just('*')
        .to_slice()
        .or(just(':').then(ident()).to_slice())
        .map(Field::new)
        .labelled("preset like * or :nameable");

    let property = property_path()
        .then(bracket_group().or_not())
        .to_slice()
        .then(transform_step().repeated().collect::<Vec<_>>())
        .try_map(|(path, steps): (&str, Vec<_>), span| {
            apply_steps(Field::new(path), steps).map_err(|msg| Rich::custom(span, msg))
        });

    choice((removal, preset, property)).padded()
}

/// Parser for a whole comma-separated field list
pub fn field_list<'src>() -> impl Parser<'src, &'src str, Vec<Field>, Extra<'src>> {
    field_item()
        .separated_by(just(','))
        .allow_trailing()
        .collect::<Vec<_>>()
        .then_ignore(end())
}

/// Parse a `fields` parameter into unplanned fields.
pub fn parse_fields(input: &str) -> GistResult<Vec<Field>> {
    field_list()
        .parse(input)
        .into_result()
        .map_err(|errs| {
            GistError::Specification(format!(
                "Invalid field list `{}`: {}",
                input,
                format_errors(&errs)
            ))
        })
}

/// Split `path[inner]` into its parent path and inner list.
pub fn split_sub_fields(path: &str) -> Option<(&str, &str)> {
    let open = path.find('[')?;
    let inner = path[open + 1..].strip_suffix(']')?;
    Some((&path[..open], inner))
}
