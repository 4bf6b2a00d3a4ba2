//! Task workflow status.

use serde::{Deserialize, Serialize};

/// Workflow status of a task.
///
/// Stored lowercase in both frontmatter and the database. Status is
/// database-owned after import: workflow transitions mutate the row, and
/// the sync engine never treats a status difference as a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Review,
    Blocked,
    Done,
}

impl TaskStatus {
    /// Parse a lowercase status token. Returns `None` for unknown tokens;
    /// callers degrade to `Todo` with a warning rather than failing the file.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "todo" => Some(Self::Todo),
            "in_progress" => Some(Self::InProgress),
            "review" => Some(Self::Review),
            "blocked" => Some(Self::Blocked),
            "done" => Some(Self::Done),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Review => "review",
            Self::Blocked => "blocked",
            Self::Done => "done",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips() {
        for status in [
            TaskStatus::Todo,
            TaskStatus::InProgress,
            TaskStatus::Review,
            TaskStatus::Blocked,
            TaskStatus::Done,
        ] {
            assert_eq!(TaskStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn parse_rejects_unknown() {
        assert_eq!(TaskStatus::parse("doing"), None);
        assert_eq!(TaskStatus::parse(""), None);
    }
}
