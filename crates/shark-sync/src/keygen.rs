//! Task key synthesis.
//!
//! Every imported task file needs a stable `task_key`. The key comes from
//! frontmatter when present, from the matched filename pattern when it
//! captured one, and is otherwise synthesized from the owning epic and
//! feature plus the next unused sequence number within that feature.

use shark_core::types::metadata::TaskMetadata;

use crate::patterns::generation::{render, GenerationError, GenerationValues};
use crate::patterns::registry::{MatchBudgetExceeded, PatternRegistry};
use crate::patterns::{PatternKind, PatternMatch, PatternSlot};

/// Epic and feature identity inferred from a task file's ancestor
/// directories.
#[derive(Debug, Clone)]
pub struct OwnerKeys {
    /// The epic folder name, verbatim (e.g. `E04-task-mgmt`, `tech-debt`).
    pub epic_key: String,
    pub epic_num: Option<i64>,
    pub epic_slug: Option<String>,
    /// The feature folder name, verbatim (e.g. `E04-F02-cli`).
    pub feature_key: String,
    pub feature_num: Option<i64>,
    pub feature_slug: Option<String>,
}

/// Infer owning epic and feature by matching ancestor directory names
/// against the folder pattern sets, nearest directory first.
///
/// Returns `None` when no feature or epic folder resolves — the orphan
/// path case, which skips the file with a warning.
pub fn resolve_owners(
    rel_path: &str,
    registry: &PatternRegistry,
) -> Result<Option<OwnerKeys>, MatchBudgetExceeded> {
    let segments: Vec<&str> = rel_path.split('/').collect();
    if segments.len() < 2 {
        return Ok(None);
    }
    let dirs = &segments[..segments.len() - 1];

    let mut feature = None;
    for (i, name) in dirs.iter().enumerate().rev() {
        if let Some(m) = registry.classify(name, PatternKind::Feature, PatternSlot::Folder)? {
            feature = Some((i, m, *name));
            break;
        }
    }
    let Some((feature_idx, feature_match, feature_name)) = feature else {
        return Ok(None);
    };

    let mut epic = None;
    for name in dirs[..feature_idx].iter().rev() {
        if let Some(m) = registry.classify(name, PatternKind::Epic, PatternSlot::Folder)? {
            epic = Some((m, *name));
            break;
        }
    }
    let Some((epic_match, epic_name)) = epic else {
        return Ok(None);
    };

    Ok(Some(OwnerKeys {
        epic_key: epic_name.to_string(),
        epic_num: epic_match.capture_num("epic_num"),
        epic_slug: epic_match.capture("epic_slug").map(str::to_string),
        feature_key: feature_name.to_string(),
        feature_num: feature_match.capture_num("feature_num"),
        feature_slug: feature_match.capture("feature_slug").map(str::to_string),
    }))
}

/// A key already present in the file or captured by its pattern.
pub fn existing_key(
    metadata: &TaskMetadata,
    pattern_match: Option<&PatternMatch>,
) -> Option<String> {
    if let Some(key) = metadata.task_key.as_deref().filter(|k| !k.is_empty()) {
        return Some(key.to_string());
    }
    pattern_match.and_then(|m| {
        m.capture("task_key")
            .or_else(|| m.capture("task_id"))
            .filter(|k| !k.is_empty())
            .map(str::to_string)
    })
}

/// A key reconstructed from a filename that embeds the full identity:
/// epic number, feature number, and sequence all captured. Files like
/// `T-E04-F02-007.md` keep their own number rather than being assigned
/// the feature's next sequence.
///
/// Patterns that capture only a bare `number` (e.g. `01-research.md`)
/// do not qualify — their number is a listing position, not a key.
pub fn key_from_captures(
    registry: &PatternRegistry,
    pattern_match: &PatternMatch,
) -> Option<String> {
    let values = GenerationValues {
        number: Some(pattern_match.capture_num("number")?),
        slug: pattern_match.capture("task_slug").map(str::to_string),
        epic: Some(pattern_match.capture_num("epic_num")?),
        feature: Some(pattern_match.capture_num("feature_num")?),
    };
    render(registry.generation_format(PatternKind::Task), &values).ok()
}

/// Render a new key through the configured task generation format.
///
/// `sequence` is the next unused number within the owning feature;
/// `slug` feeds the `{slug}` placeholder for formats that use one.
pub fn synthesize_key(
    registry: &PatternRegistry,
    owners: &OwnerKeys,
    sequence: i64,
    slug: Option<&str>,
) -> Result<String, GenerationError> {
    let values = GenerationValues {
        number: Some(sequence),
        slug: slug.map(str::to_string),
        epic: owners.epic_num,
        feature: owners.feature_num,
    };
    render(registry.generation_format(PatternKind::Task), &values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shark_core::config::PatternsConfig;

    fn registry() -> PatternRegistry {
        PatternRegistry::from_config(&PatternsConfig::default(), false)
            .unwrap()
            .0
    }

    #[test]
    fn owners_resolve_from_standard_tree() {
        let owners = resolve_owners(
            "docs/plan/E04-task-mgmt/E04-F02-cli/tasks/01-research.md",
            &registry(),
        )
        .unwrap()
        .expect("owners should resolve");

        assert_eq!(owners.epic_key, "E04-task-mgmt");
        assert_eq!(owners.epic_num, Some(4));
        assert_eq!(owners.epic_slug.as_deref(), Some("task-mgmt"));
        assert_eq!(owners.feature_key, "E04-F02-cli");
        assert_eq!(owners.feature_num, Some(2));
    }

    #[test]
    fn orphan_path_yields_none() {
        let owners = resolve_owners("docs/plan/loose/tasks/01-x.md", &registry()).unwrap();
        assert!(owners.is_none());
    }

    #[test]
    fn feature_folder_without_epic_ancestor_is_orphan() {
        let owners = resolve_owners("docs/plan/E04-F02-cli/tasks/01-x.md", &registry()).unwrap();
        assert!(owners.is_none());
    }

    #[test]
    fn frontmatter_key_wins_over_capture() {
        let mut metadata = TaskMetadata::new();
        metadata.task_key = Some("T-E01-F01-009".to_string());

        let mut captures = shark_core::FxHashMap::default();
        captures.insert("task_key".to_string(), "T-E01-F01-001".to_string());
        let m = PatternMatch {
            pattern_name: "p".to_string(),
            captures,
        };

        assert_eq!(
            existing_key(&metadata, Some(&m)).as_deref(),
            Some("T-E01-F01-009")
        );
        metadata.task_key = None;
        assert_eq!(
            existing_key(&metadata, Some(&m)).as_deref(),
            Some("T-E01-F01-001")
        );
        assert_eq!(existing_key(&metadata, None), None);
    }

    #[test]
    fn full_key_filenames_keep_their_own_number() {
        let registry = registry();
        let m = registry
            .classify(
                "T-E04-F02-007.md",
                crate::patterns::PatternKind::Task,
                crate::patterns::PatternSlot::File,
            )
            .unwrap()
            .unwrap();
        assert_eq!(
            key_from_captures(&registry, &m).as_deref(),
            Some("T-E04-F02-007")
        );

        // A bare listing number does not reconstruct a key.
        let m = registry
            .classify(
                "01-research.md",
                crate::patterns::PatternKind::Task,
                crate::patterns::PatternSlot::File,
            )
            .unwrap()
            .unwrap();
        assert_eq!(key_from_captures(&registry, &m), None);
    }

    #[test]
    fn synthesized_key_uses_generation_format() {
        let owners = resolve_owners(
            "docs/plan/E04-task-mgmt/E04-F02-cli/tasks/02-next.md",
            &registry(),
        )
        .unwrap()
        .unwrap();

        let key = synthesize_key(&registry(), &owners, 2, Some("next")).unwrap();
        assert_eq!(key, "T-E04-F02-002");
    }

    #[test]
    fn missing_numbers_fail_synthesis() {
        // Well-known epics (tech-debt) have no epic number for the
        // default numeric format.
        let owners = OwnerKeys {
            epic_key: "tech-debt".to_string(),
            epic_num: None,
            epic_slug: Some("tech-debt".to_string()),
            feature_key: "E04-F02-cli".to_string(),
            feature_num: Some(2),
            feature_slug: Some("cli".to_string()),
        };
        assert!(synthesize_key(&registry(), &owners, 1, None).is_err());
    }
}
