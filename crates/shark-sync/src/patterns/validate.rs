//! Load-time pattern validation.
//!
//! The regex engine itself is RE2-class and cannot backtrack, but patterns
//! travel in config files shared with other tools, so constructs that
//! would be catastrophic elsewhere are rejected outright.

use shark_core::errors::pattern_error::MAX_PATTERN_LENGTH;
use shark_core::errors::PatternError;
use shark_core::types::report::SyncWarning;

use super::{PatternKind, PatternSlot};

/// Capture group names the engine understands.
pub const RECOGNIZED_GROUPS: &[&str] = &[
    "epic_id",
    "epic_num",
    "epic_slug",
    "feature_id",
    "feature_num",
    "feature_slug",
    "task_id",
    "task_slug",
    "task_key",
    "number",
    "slug",
];

const EPIC_IDENTIFIERS: &[&str] = &["epic_id", "epic_num"];
const EPIC_ANY: &[&str] = &["epic_id", "epic_slug", "number"];
const FEATURE_ANY: &[&str] = &["feature_id", "feature_slug", "number"];
const TASK_ANY: &[&str] = &["task_id", "task_slug", "task_key", "number"];

/// Validate a single pattern before compilation. Returns warnings for
/// unrecognized capture group names; hard failures are errors.
pub fn validate_pattern(
    name: &str,
    pattern: &str,
    kind: PatternKind,
    slot: PatternSlot,
) -> Result<Vec<SyncWarning>, PatternError> {
    if pattern.len() > MAX_PATTERN_LENGTH {
        return Err(PatternError::TooLong {
            name: name.to_string(),
            pattern: pattern.to_string(),
            len: pattern.len(),
        });
    }

    if let Some(construct) = find_catastrophic(pattern) {
        return Err(PatternError::CatastrophicConstruct {
            name: name.to_string(),
            pattern: pattern.to_string(),
            construct,
        });
    }

    let groups = capture_names(pattern);
    check_required_groups(name, pattern, kind, slot, &groups)?;

    let mut warnings = Vec::new();
    for group in &groups {
        if !RECOGNIZED_GROUPS.contains(&group.as_str()) {
            let suggestion = closest_recognized(group)
                .map(|s| format!("; did you mean '{s}'?"))
                .unwrap_or_default();
            warnings.push(SyncWarning::general(format!(
                "pattern '{name}' captures unrecognized group '{group}'{suggestion}"
            )));
        }
    }
    Ok(warnings)
}

/// Group requirements are keyed to the slot that carries the artifact's
/// identity: folder names for epics and features, file names for tasks.
/// Task file patterns need only a task-local identifier; epic and feature
/// context may come from parent directories instead of the filename
/// (the numbered and `.prp.md` task forms rely on that).
fn check_required_groups(
    name: &str,
    pattern: &str,
    kind: PatternKind,
    slot: PatternSlot,
    groups: &[String],
) -> Result<(), PatternError> {
    let has = |candidates: &[&str]| candidates.iter().any(|c| groups.iter().any(|g| g == c));

    let missing: Option<String> = match (kind, slot) {
        (PatternKind::Epic, PatternSlot::Folder) => {
            (!has(EPIC_ANY)).then(|| "one of epic_id, epic_slug, number".to_string())
        }
        (PatternKind::Feature, PatternSlot::Folder) => {
            if !has(EPIC_IDENTIFIERS) {
                Some("an epic identifier (epic_id or epic_num)".to_string())
            } else if !has(FEATURE_ANY) {
                Some("one of feature_id, feature_slug, number".to_string())
            } else {
                None
            }
        }
        (PatternKind::Task, PatternSlot::File) => {
            (!has(TASK_ANY)).then(|| "one of task_id, task_slug, task_key, number".to_string())
        }
        // Epic/feature document patterns (epic.md, prd.md) carry no keys.
        _ => None,
    };

    match missing {
        Some(expected) => Err(PatternError::MissingCaptureGroup {
            name: name.to_string(),
            pattern: pattern.to_string(),
            kind: format!("{} {}", kind.as_str(), slot.as_str()),
            expected,
        }),
        None => Ok(()),
    }
}

/// Scan for a group whose body ends in an unbounded quantifier and is
/// itself quantified without bound, e.g. `(.*)*`, `(.+)+`, `(a+)+`.
pub fn find_catastrophic(pattern: &str) -> Option<String> {
    let bytes = pattern.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b != b')' || i == 0 {
            continue;
        }
        let inner_unbounded = matches!(bytes[i - 1], b'*' | b'+');
        if !inner_unbounded {
            continue;
        }
        let outer_unbounded = match bytes.get(i + 1) {
            Some(b'*') | Some(b'+') => true,
            Some(b'{') => pattern[i + 1..]
                .find('}')
                .is_some_and(|end| pattern[i + 1..i + 2 + end].ends_with(",}")),
            _ => false,
        };
        if outer_unbounded {
            let start = pattern[..i].rfind('(').unwrap_or(0);
            let end = (i + 2).min(pattern.len());
            return Some(pattern[start..end].to_string());
        }
    }
    None
}

/// Named capture groups in source order, parsed from `(?P<name>` / `(?<name>`.
pub fn capture_names(pattern: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = pattern;
    while let Some(pos) = rest.find("(?") {
        let after = &rest[pos + 2..];
        let after = after.strip_prefix('P').unwrap_or(after);
        if let Some(body) = after.strip_prefix('<') {
            if let Some(end) = body.find('>') {
                let name = &body[..end];
                // `(?<=` / `(?<!` are lookarounds, not captures.
                if !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_') {
                    names.push(name.to_string());
                }
            }
        }
        rest = &rest[pos + 2..];
    }
    names
}

/// Closest recognized group name within Damerau-Levenshtein distance 2.
pub fn closest_recognized(group: &str) -> Option<&'static str> {
    RECOGNIZED_GROUPS
        .iter()
        .map(|candidate| (damerau_levenshtein(group, candidate), *candidate))
        .filter(|(distance, _)| *distance <= 2)
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, candidate)| candidate)
}

/// Damerau-Levenshtein distance with adjacent transpositions.
fn damerau_levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (n, m) = (a.len(), b.len());
    if n == 0 {
        return m;
    }
    if m == 0 {
        return n;
    }

    let mut dist = vec![vec![0usize; m + 1]; n + 1];
    for (i, row) in dist.iter_mut().enumerate() {
        row[0] = i;
    }
    for j in 0..=m {
        dist[0][j] = j;
    }

    for i in 1..=n {
        for j in 1..=m {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            let mut d = (dist[i - 1][j] + 1)
                .min(dist[i][j - 1] + 1)
                .min(dist[i - 1][j - 1] + cost);
            if i > 1 && j > 1 && a[i - 1] == b[j - 2] && a[i - 2] == b[j - 1] {
                d = d.min(dist[i - 2][j - 2] + 1);
            }
            dist[i][j] = d;
        }
    }
    dist[n][m]
}
