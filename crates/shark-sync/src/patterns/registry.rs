//! Compiled pattern registry.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use regex::Regex;
use shark_core::config::{KindPatternConfig, PatternEntry, PatternsConfig};
use shark_core::errors::PatternError;
use shark_core::types::report::SyncWarning;
use shark_core::FxHashMap;

use super::generation::default_format;
use super::{validate, PatternKind, PatternMatch, PatternSlot};

/// Per-match evaluation budget. A filename whose classification exceeds
/// this is skipped with a warning.
pub const MATCH_BUDGET: Duration = Duration::from_millis(100);

/// Classification aborted because the evaluation budget ran out.
#[derive(Debug, thiserror::Error)]
#[error("pattern matching exceeded {}ms budget on '{name}'", MATCH_BUDGET.as_millis())]
pub struct MatchBudgetExceeded {
    pub name: String,
}

#[derive(Debug)]
struct CompiledPattern {
    name: String,
    regex: Regex,
}

/// The compiled, validated pattern sets for all kinds and slots.
///
/// Patterns are evaluated in declaration order; the first match wins and
/// later patterns are never evaluated.
pub struct PatternRegistry {
    sets: FxHashMap<(PatternKind, PatternSlot), Vec<CompiledPattern>>,
    generation: FxHashMap<PatternKind, String>,
    evaluations: AtomicUsize,
}

impl PatternRegistry {
    /// Compile every enabled pattern from config, falling back to the
    /// built-in defaults for any slot the config leaves empty.
    ///
    /// `skip_validation` bypasses the load-time checks (compile errors are
    /// still fatal) and is reported with a prominent warning.
    pub fn from_config(
        config: &PatternsConfig,
        skip_validation: bool,
    ) -> Result<(Self, Vec<SyncWarning>), PatternError> {
        let mut warnings = Vec::new();
        if skip_validation {
            let warning =
                SyncWarning::general("PATTERN VALIDATION SKIPPED — malformed patterns may silently drop files");
            tracing::warn!("{}", warning.message);
            warnings.push(warning);
        }

        let mut sets = FxHashMap::default();
        for (kind, kind_config) in [
            (PatternKind::Epic, &config.epic),
            (PatternKind::Feature, &config.feature),
            (PatternKind::Task, &config.task),
        ] {
            for slot in [PatternSlot::Folder, PatternSlot::File] {
                let compiled =
                    Self::compile_slot(kind, slot, kind_config, skip_validation, &mut warnings)?;
                sets.insert((kind, slot), compiled);
            }
        }

        let mut generation = FxHashMap::default();
        for (kind, kind_config) in [
            (PatternKind::Epic, &config.epic),
            (PatternKind::Feature, &config.feature),
            (PatternKind::Task, &config.task),
        ] {
            let format = kind_config
                .generation
                .clone()
                .unwrap_or_else(|| default_format(kind).to_string());
            generation.insert(kind, format);
        }

        Ok((
            Self {
                sets,
                generation,
                evaluations: AtomicUsize::new(0),
            },
            warnings,
        ))
    }

    fn compile_slot(
        kind: PatternKind,
        slot: PatternSlot,
        kind_config: &KindPatternConfig,
        skip_validation: bool,
        warnings: &mut Vec<SyncWarning>,
    ) -> Result<Vec<CompiledPattern>, PatternError> {
        let entries = match slot {
            PatternSlot::Folder => &kind_config.folder,
            PatternSlot::File => &kind_config.file,
        };

        let sources: Vec<(String, String)> = if entries.is_empty() {
            default_patterns(kind, slot)
                .iter()
                .map(|(name, pattern)| (name.to_string(), pattern.to_string()))
                .collect()
        } else {
            entries
                .iter()
                .enumerate()
                .filter(|(_, entry)| entry.enabled())
                .map(|(i, entry)| {
                    let name = match entry {
                        PatternEntry::Detailed { name, .. } => name.clone(),
                        PatternEntry::Plain(_) => {
                            format!("{}-{}-{}", kind.as_str(), slot.as_str(), i + 1)
                        }
                    };
                    (name, entry.pattern().to_string())
                })
                .collect()
        };

        let mut compiled = Vec::with_capacity(sources.len());
        for (name, pattern) in sources {
            if !skip_validation {
                warnings.extend(validate::validate_pattern(&name, &pattern, kind, slot)?);
            }
            let regex = Regex::new(&pattern).map_err(|e| PatternError::Compile {
                name: name.clone(),
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
            compiled.push(CompiledPattern { name, regex });
        }
        Ok(compiled)
    }

    /// Classify a name against the enabled patterns of `kind`/`slot`.
    /// First match wins; later patterns are not evaluated.
    pub fn classify(
        &self,
        name: &str,
        kind: PatternKind,
        slot: PatternSlot,
    ) -> Result<Option<PatternMatch>, MatchBudgetExceeded> {
        let Some(patterns) = self.sets.get(&(kind, slot)) else {
            return Ok(None);
        };

        let start = Instant::now();
        for pattern in patterns {
            if start.elapsed() > MATCH_BUDGET {
                return Err(MatchBudgetExceeded {
                    name: name.to_string(),
                });
            }
            self.evaluations.fetch_add(1, Ordering::Relaxed);

            if let Some(caps) = pattern.regex.captures(name) {
                let mut captures = FxHashMap::default();
                for group in pattern.regex.capture_names().flatten() {
                    if let Some(value) = caps.name(group) {
                        captures.insert(group.to_string(), value.as_str().to_string());
                    }
                }
                return Ok(Some(PatternMatch {
                    pattern_name: pattern.name.clone(),
                    captures,
                }));
            }
        }
        Ok(None)
    }

    /// The generation template for creating new names of `kind`.
    pub fn generation_format(&self, kind: PatternKind) -> &str {
        self.generation
            .get(&kind)
            .map(String::as_str)
            .unwrap_or_else(|| default_format(kind))
    }

    /// Total regex evaluations performed. Exposed so first-match-wins
    /// short-circuiting is observable.
    pub fn evaluation_count(&self) -> usize {
        self.evaluations.load(Ordering::Relaxed)
    }
}

/// Built-in defaults, used for any slot the config leaves empty.
fn default_patterns(kind: PatternKind, slot: PatternSlot) -> &'static [(&'static str, &'static str)] {
    match (kind, slot) {
        (PatternKind::Epic, PatternSlot::Folder) => &[
            (
                "epic-folder-standard",
                r"^E(?P<epic_num>\d{2})-(?P<epic_slug>[A-Za-z0-9][A-Za-z0-9_-]*)$",
            ),
            (
                "epic-folder-wellknown",
                r"^(?P<epic_slug>tech-debt|bugs|change-cards)$",
            ),
        ],
        (PatternKind::Epic, PatternSlot::File) => &[("epic-file-doc", r"^epic\.md$")],
        (PatternKind::Feature, PatternSlot::Folder) => &[(
            "feature-folder-standard",
            r"^E(?P<epic_num>\d{2})-F(?P<feature_num>\d{2})-(?P<feature_slug>[A-Za-z0-9][A-Za-z0-9_-]*)$",
        )],
        (PatternKind::Feature, PatternSlot::File) => &[
            ("feature-file-prd", r"^prd\.md$"),
            (
                "feature-file-doc",
                r"^(?P<feature_slug>[A-Za-z0-9][A-Za-z0-9_-]*)\.md$",
            ),
        ],
        (PatternKind::Task, PatternSlot::Folder) => &[
            ("task-folder-tasks", r"^tasks$"),
            ("task-folder-prps", r"^prps$"),
        ],
        (PatternKind::Task, PatternSlot::File) => &[
            (
                "task-file-standard",
                r"^T-E(?P<epic_num>\d{2})-F(?P<feature_num>\d{2})-(?P<number>\d{3})(?:-(?P<task_slug>[A-Za-z0-9][A-Za-z0-9_-]*))?\.md$",
            ),
            (
                "task-file-numbered",
                r"^(?P<number>\d{2,3})-(?P<task_slug>[A-Za-z0-9][A-Za-z0-9_-]*)\.md$",
            ),
            (
                "task-file-prp",
                r"^(?P<task_slug>[A-Za-z0-9][A-Za-z0-9_.-]*)\.prp\.md$",
            ),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> PatternRegistry {
        let (registry, warnings) =
            PatternRegistry::from_config(&PatternsConfig::default(), false).unwrap();
        assert!(warnings.is_empty(), "defaults must validate cleanly");
        registry
    }

    #[test]
    fn standard_task_filename_classifies() {
        let registry = registry();
        let m = registry
            .classify("T-E04-F02-001.md", PatternKind::Task, PatternSlot::File)
            .unwrap()
            .expect("should match");
        assert_eq!(m.pattern_name, "task-file-standard");
        assert_eq!(m.capture_num("epic_num"), Some(4));
        assert_eq!(m.capture_num("feature_num"), Some(2));
        assert_eq!(m.capture_num("number"), Some(1));
    }

    #[test]
    fn numbered_and_prp_alternatives_classify() {
        let registry = registry();
        let m = registry
            .classify("01-research.md", PatternKind::Task, PatternSlot::File)
            .unwrap()
            .unwrap();
        assert_eq!(m.pattern_name, "task-file-numbered");
        assert_eq!(m.capture("task_slug"), Some("research"));

        let m = registry
            .classify("auth-flow.prp.md", PatternKind::Task, PatternSlot::File)
            .unwrap()
            .unwrap();
        assert_eq!(m.pattern_name, "task-file-prp");
    }

    #[test]
    fn epic_folder_wellknown_names_classify() {
        let registry = registry();
        for name in ["tech-debt", "bugs", "change-cards"] {
            let m = registry
                .classify(name, PatternKind::Epic, PatternSlot::Folder)
                .unwrap()
                .unwrap();
            assert_eq!(m.capture("epic_slug"), Some(name));
        }
    }

    #[test]
    fn first_match_wins_and_short_circuits() {
        use shark_core::config::{KindPatternConfig, PatternEntry};

        // Both patterns match the same filename; only the first may run.
        let config = PatternsConfig {
            task: KindPatternConfig {
                file: vec![
                    PatternEntry::Detailed {
                        name: "first".to_string(),
                        pattern: r"^(?P<number>\d{2})-.*\.md$".to_string(),
                        enabled: true,
                        description: None,
                    },
                    PatternEntry::Detailed {
                        name: "second".to_string(),
                        pattern: r"^(?P<number>\d{2,3})-(?P<task_slug>.+)\.md$".to_string(),
                        enabled: true,
                        description: None,
                    },
                ],
                ..Default::default()
            },
            ..Default::default()
        };
        let (registry, _) = PatternRegistry::from_config(&config, false).unwrap();

        let before = registry.evaluation_count();
        let m = registry
            .classify("01-research.md", PatternKind::Task, PatternSlot::File)
            .unwrap()
            .unwrap();
        assert_eq!(m.pattern_name, "first");
        assert_eq!(
            registry.evaluation_count() - before,
            1,
            "second pattern must not be evaluated"
        );
    }

    #[test]
    fn disabled_patterns_are_not_compiled() {
        use shark_core::config::{KindPatternConfig, PatternEntry};

        let config = PatternsConfig {
            task: KindPatternConfig {
                file: vec![
                    PatternEntry::Detailed {
                        name: "off".to_string(),
                        pattern: r"^(?P<number>\d{2})\.md$".to_string(),
                        enabled: false,
                        description: None,
                    },
                    PatternEntry::Plain(r"^(?P<task_slug>.+)\.prp\.md$".to_string()),
                ],
                ..Default::default()
            },
            ..Default::default()
        };
        let (registry, _) = PatternRegistry::from_config(&config, false).unwrap();

        assert!(registry
            .classify("01.md", PatternKind::Task, PatternSlot::File)
            .unwrap()
            .is_none());
        assert!(registry
            .classify("x.prp.md", PatternKind::Task, PatternSlot::File)
            .unwrap()
            .is_some());
    }

    #[test]
    fn invalid_config_pattern_aborts_load() {
        use shark_core::config::{KindPatternConfig, PatternEntry};

        let config = PatternsConfig {
            epic: KindPatternConfig {
                folder: vec![PatternEntry::Plain("^no-groups$".to_string())],
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(PatternRegistry::from_config(&config, false).is_err());
        // The bypass flag downgrades validation but still compiles.
        assert!(PatternRegistry::from_config(&config, true).is_ok());
    }
}
