//! Conflict resolution strategies.

use std::io::{BufRead, BufReader, Write};
use std::str::FromStr;

use shark_core::types::metadata::TaskMetadata;
use shark_core::types::records::TaskRecord;
use shark_core::types::report::{Conflict, ConflictField};

/// How field conflicts are settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    #[default]
    FileWins,
    DatabaseWins,
    NewerWins,
    Manual,
}

pub const STRATEGY_TOKENS: &[&str] = &["file-wins", "database-wins", "newer-wins", "manual"];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown strategy '{token}'; valid values: file-wins, database-wins, newer-wins, manual")]
pub struct StrategyParseError {
    pub token: String,
}

impl FromStr for Strategy {
    type Err = StrategyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "file-wins" => Ok(Self::FileWins),
            "database-wins" => Ok(Self::DatabaseWins),
            "newer-wins" => Ok(Self::NewerWins),
            "manual" => Ok(Self::Manual),
            other => Err(StrategyParseError {
                token: other.to_string(),
            }),
        }
    }
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FileWins => "file-wins",
            Self::DatabaseWins => "database-wins",
            Self::NewerWins => "newer-wins",
            Self::Manual => "manual",
        }
    }
}

/// Which side supplies the value for one conflicted field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChoiceSource {
    File,
    Db,
}

/// Interactive seam for the `manual` strategy. Tests supply a scripted
/// implementation; production reads lines from standard input.
pub trait ConflictPrompter {
    fn prompt_choice(&mut self, conflict: &Conflict) -> std::io::Result<ChoiceSource>;
}

/// Line-oriented prompter over any reader/writer pair.
///
/// Accepts only `file` or `db` (case-insensitive, trimmed) and re-prompts
/// on anything else. EOF surfaces as an error, leaving the conflict
/// unresolved.
pub struct LinePrompter<R, W> {
    input: R,
    output: W,
}

impl LinePrompter<BufReader<std::io::Stdin>, std::io::Stderr> {
    pub fn stdin() -> Self {
        Self {
            input: BufReader::new(std::io::stdin()),
            output: std::io::stderr(),
        }
    }
}

impl<R: BufRead, W: Write> LinePrompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> ConflictPrompter for LinePrompter<R, W> {
    fn prompt_choice(&mut self, conflict: &Conflict) -> std::io::Result<ChoiceSource> {
        writeln!(
            self.output,
            "Conflict on '{}' for {}:",
            conflict.field, conflict.task_key
        )?;
        writeln!(self.output, "  database: {}", conflict.db_value)?;
        writeln!(self.output, "  file:     {}", conflict.file_value)?;

        loop {
            write!(self.output, "Keep which value? [file/db]: ")?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "stdin closed during manual conflict resolution",
                ));
            }
            match line.trim().to_lowercase().as_str() {
                "file" => return Ok(ChoiceSource::File),
                "db" => return Ok(ChoiceSource::Db),
                _ => continue,
            }
        }
    }
}

/// Result of resolving one file's conflicts.
#[derive(Debug)]
pub struct Resolution {
    /// The merged record. Inputs are never mutated; the orchestrator
    /// performs the persistent write.
    pub merged: TaskRecord,
    /// How many of the conflicts were settled (all, for the automatic
    /// strategies; zero for `manual` without a prompter).
    pub resolved: usize,
}

/// Produce a merged record from the detected conflicts.
pub fn resolve(
    strategy: Strategy,
    conflicts: &[Conflict],
    metadata: &TaskMetadata,
    row: &TaskRecord,
    mut prompter: Option<&mut dyn ConflictPrompter>,
) -> std::io::Result<Resolution> {
    let mut merged = row.clone();
    let mut resolved = 0;

    for conflict in conflicts {
        let choice = match strategy {
            Strategy::FileWins => ChoiceSource::File,
            Strategy::DatabaseWins => ChoiceSource::Db,
            Strategy::NewerWins => {
                if conflict.file_mtime > row.updated_at {
                    ChoiceSource::File
                } else {
                    ChoiceSource::Db
                }
            }
            Strategy::Manual => match prompter {
                Some(ref mut p) => p.prompt_choice(conflict)?,
                None => continue,
            },
        };
        if choice == ChoiceSource::File {
            apply_field(&mut merged, conflict.field, metadata);
        }
        resolved += 1;
    }

    Ok(Resolution { merged, resolved })
}

fn apply_field(merged: &mut TaskRecord, field: ConflictField, metadata: &TaskMetadata) {
    match field {
        ConflictField::Title => merged.title = metadata.title.clone(),
        ConflictField::Description => merged.description = Some(metadata.description.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use shark_core::types::status::TaskStatus;

    fn at(secs: i64) -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn fixtures() -> (TaskMetadata, TaskRecord, Vec<Conflict>) {
        let metadata = TaskMetadata {
            title: "Updated".to_string(),
            description: "from file".to_string(),
            ..TaskMetadata::new()
        };
        let row = TaskRecord {
            id: 1,
            feature_id: 1,
            task_key: "T-E04-F02-001".to_string(),
            title: "Renamed".to_string(),
            description: Some("from db".to_string()),
            status: TaskStatus::InProgress,
            agent_type: None,
            priority: 2,
            assigned_agent: None,
            file_path: "docs/plan/t.md".to_string(),
            blocked_reason: None,
            depends_on: Vec::new(),
            created_at: at(-1000),
            updated_at: at(50),
            started_at: Some(at(-500)),
            completed_at: None,
            blocked_at: None,
        };
        let conflicts = vec![
            Conflict {
                task_key: row.task_key.clone(),
                field: ConflictField::Title,
                file_value: metadata.title.clone(),
                db_value: row.title.clone(),
                file_mtime: at(100),
                db_updated_at: row.updated_at,
            },
            Conflict {
                task_key: row.task_key.clone(),
                field: ConflictField::Description,
                file_value: metadata.description.clone(),
                db_value: "from db".to_string(),
                file_mtime: at(100),
                db_updated_at: row.updated_at,
            },
        ];
        (metadata, row, conflicts)
    }

    #[test]
    fn strategy_parse_rejects_unknown_tokens() {
        assert_eq!("file-wins".parse::<Strategy>(), Ok(Strategy::FileWins));
        assert_eq!("manual".parse::<Strategy>(), Ok(Strategy::Manual));
        let err = "merge".parse::<Strategy>().unwrap_err();
        assert!(err.to_string().contains("newer-wins"));
    }

    #[test]
    fn file_wins_takes_file_values_and_keeps_db_owned_fields() {
        let (metadata, row, conflicts) = fixtures();
        let resolution =
            resolve(Strategy::FileWins, &conflicts, &metadata, &row, None).unwrap();
        assert_eq!(resolution.merged.title, "Updated");
        assert_eq!(resolution.merged.description.as_deref(), Some("from file"));
        // Database-owned fields are untouched.
        assert_eq!(resolution.merged.status, TaskStatus::InProgress);
        assert_eq!(resolution.merged.started_at, Some(at(-500)));
        assert_eq!(resolution.resolved, 2);
        // Inputs not mutated.
        assert_eq!(row.title, "Renamed");
    }

    #[test]
    fn database_wins_keeps_row_values() {
        let (metadata, row, conflicts) = fixtures();
        let resolution =
            resolve(Strategy::DatabaseWins, &conflicts, &metadata, &row, None).unwrap();
        assert_eq!(resolution.merged.title, "Renamed");
        assert_eq!(resolution.resolved, 2);
    }

    #[test]
    fn newer_wins_compares_timestamps() {
        let (metadata, row, conflicts) = fixtures();
        // file_mtime (t+100) > updated_at (t+50): file wins.
        let resolution =
            resolve(Strategy::NewerWins, &conflicts, &metadata, &row, None).unwrap();
        assert_eq!(resolution.merged.title, "Updated");

        let mut older = conflicts.clone();
        for c in &mut older {
            c.file_mtime = at(0);
        }
        let resolution = resolve(Strategy::NewerWins, &older, &metadata, &row, None).unwrap();
        assert_eq!(resolution.merged.title, "Renamed");
    }

    #[test]
    fn manual_reprompts_until_valid_input() {
        let (metadata, row, conflicts) = fixtures();
        // Garbage, then FILE (case-insensitive), then db.
        let input = std::io::Cursor::new(b"what\nboth\n FILE \ndb\n".to_vec());
        let mut prompter = LinePrompter::new(input, Vec::new());

        let resolution = resolve(
            Strategy::Manual,
            &conflicts,
            &metadata,
            &row,
            Some(&mut prompter),
        )
        .unwrap();
        assert_eq!(resolution.merged.title, "Updated");
        assert_eq!(resolution.merged.description.as_deref(), Some("from db"));
        assert_eq!(resolution.resolved, 2);
    }

    #[test]
    fn manual_without_prompter_resolves_nothing() {
        let (metadata, row, conflicts) = fixtures();
        let resolution = resolve(Strategy::Manual, &conflicts, &metadata, &row, None).unwrap();
        assert_eq!(resolution.merged.title, "Renamed");
        assert_eq!(resolution.resolved, 0);
    }

    #[test]
    fn manual_eof_is_an_error() {
        let (metadata, row, conflicts) = fixtures();
        let input = std::io::Cursor::new(b"".to_vec());
        let mut prompter = LinePrompter::new(input, Vec::new());
        let result = resolve(
            Strategy::Manual,
            &conflicts,
            &metadata,
            &row,
            Some(&mut prompter),
        );
        assert!(result.is_err());
    }
}
