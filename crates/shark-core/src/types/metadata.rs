//! Parsed task-file metadata.

use chrono::{DateTime, Utc};

use super::status::TaskStatus;

/// Default priority for tasks that do not declare one.
pub const DEFAULT_PRIORITY: i64 = 2;

/// Structured metadata extracted from one task file: YAML frontmatter
/// fields plus Markdown-body fallbacks, with defaults already applied.
///
/// `extra` carries every frontmatter key the engine does not recognize,
/// preserved verbatim so write-backs never drop user data.
#[derive(Debug, Clone, Default)]
pub struct TaskMetadata {
    pub task_key: Option<String>,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub agent_type: Option<String>,
    pub priority: i64,
    pub assigned_agent: Option<String>,
    pub blocked_reason: Option<String>,
    pub depends_on: Vec<String>,
    /// Unrecognized frontmatter keys, in document order.
    pub extra: serde_yaml::Mapping,
    /// Filesystem mtime of the source file.
    pub modified_at: Option<DateTime<Utc>>,
}

impl TaskMetadata {
    pub fn new() -> Self {
        Self {
            priority: DEFAULT_PRIORITY,
            ..Self::default()
        }
    }
}
