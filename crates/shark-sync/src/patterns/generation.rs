//! Filename/key generation templates.
//!
//! Generation formats produce new names; they are disjoint from the
//! matching patterns. Placeholders: `{number}`, `{number:02d}`,
//! `{number:03d}`, `{slug}`, `{epic}`, `{epic:02d}`, `{feature}`,
//! `{feature:02d}`.

use super::PatternKind;

/// Default key/filename generation templates per kind.
pub fn default_format(kind: PatternKind) -> &'static str {
    match kind {
        PatternKind::Epic => "E{epic:02d}-{slug}",
        PatternKind::Feature => "E{epic:02d}-F{feature:02d}-{slug}",
        PatternKind::Task => "T-E{epic:02d}-F{feature:02d}-{number:03d}",
    }
}

/// Values available to a template render.
#[derive(Debug, Clone, Default)]
pub struct GenerationValues {
    pub number: Option<i64>,
    pub slug: Option<String>,
    pub epic: Option<i64>,
    pub feature: Option<i64>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("unknown placeholder '{{{0}}}'")]
    UnknownPlaceholder(String),

    #[error("no value available for placeholder '{{{0}}}'")]
    MissingValue(String),

    #[error("slug '{0}' contains a path separator, '..', ':', or control character")]
    InvalidSlug(String),

    #[error("unbalanced braces in template")]
    UnbalancedBraces,
}

/// Render a generation template.
pub fn render(template: &str, values: &GenerationValues) -> Result<String, GenerationError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or(GenerationError::UnbalancedBraces)?;
        let token = &after[..close];
        out.push_str(&render_token(token, values)?);
        rest = &after[close + 1..];
    }
    if rest.contains('}') {
        return Err(GenerationError::UnbalancedBraces);
    }
    out.push_str(rest);
    Ok(out)
}

fn render_token(token: &str, values: &GenerationValues) -> Result<String, GenerationError> {
    let (name, width) = match token.split_once(':') {
        Some((name, "02d")) => (name, 2),
        Some((name, "03d")) => (name, 3),
        Some(_) => return Err(GenerationError::UnknownPlaceholder(token.to_string())),
        None => (token, 0),
    };

    let numeric = |value: Option<i64>| {
        value
            .map(|n| format!("{n:0width$}"))
            .ok_or_else(|| GenerationError::MissingValue(token.to_string()))
    };

    match name {
        "number" => numeric(values.number),
        "epic" => numeric(values.epic),
        "feature" => numeric(values.feature),
        "slug" if width == 0 => {
            let slug = values
                .slug
                .as_deref()
                .ok_or_else(|| GenerationError::MissingValue(token.to_string()))?;
            validate_slug(slug)?;
            Ok(slug.to_string())
        }
        _ => Err(GenerationError::UnknownPlaceholder(token.to_string())),
    }
}

fn validate_slug(slug: &str) -> Result<(), GenerationError> {
    let forbidden = slug.contains('/')
        || slug.contains('\\')
        || slug.contains("..")
        || slug.contains(':')
        || slug.chars().any(|c| c.is_control());
    if forbidden {
        Err(GenerationError::InvalidSlug(slug.to_string()))
    } else {
        Ok(())
    }
}
