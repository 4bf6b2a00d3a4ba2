//! Sync run reporting: warnings, conflicts, and the per-run summary record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A non-fatal problem encountered during a sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncWarning {
    /// Project-relative path of the file involved, when one exists.
    pub path: Option<String>,
    pub message: String,
}

impl SyncWarning {
    pub fn for_file(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            message: message.into(),
        }
    }

    pub fn general(message: impl Into<String>) -> Self {
        Self {
            path: None,
            message: message.into(),
        }
    }
}

/// A field for which file and database disagree while both sides changed.
///
/// Only file-owned fields ever surface as conflicts; status, priority,
/// agent assignment, and dependencies are database-owned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictField {
    Title,
    Description,
}

impl ConflictField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Description => "description",
        }
    }
}

impl std::fmt::Display for ConflictField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detected three-way conflict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub task_key: String,
    pub field: ConflictField,
    pub file_value: String,
    pub db_value: String,
    pub file_mtime: DateTime<Utc>,
    pub db_updated_at: DateTime<Utc>,
}

/// Terminal state of a sync invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Transaction committed (or dry run completed).
    Committed,
    /// Nothing survived the incremental filter; no transaction was opened.
    NoChanges,
    /// Transaction rolled back; the watermark is unchanged.
    RolledBack,
}

/// Per-run statistics and findings, returned by every sync invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub status: SyncStatus,
    pub files_scanned: usize,
    pub files_filtered: usize,
    pub files_skipped: usize,
    pub tasks_imported: usize,
    pub tasks_updated: usize,
    pub conflicts_detected: usize,
    pub conflicts_resolved: usize,
    pub warnings: Vec<SyncWarning>,
    pub errors: Vec<String>,
    pub conflicts: Vec<Conflict>,
    pub elapsed_ms: u64,
    pub incremental: bool,
    pub dry_run: bool,
    pub watermark_before: Option<DateTime<Utc>>,
    pub watermark_after: Option<DateTime<Utc>>,
}

impl SyncReport {
    pub fn new(incremental: bool, dry_run: bool) -> Self {
        Self {
            status: SyncStatus::Committed,
            files_scanned: 0,
            files_filtered: 0,
            files_skipped: 0,
            tasks_imported: 0,
            tasks_updated: 0,
            conflicts_detected: 0,
            conflicts_resolved: 0,
            warnings: Vec::new(),
            errors: Vec::new(),
            conflicts: Vec::new(),
            elapsed_ms: 0,
            incremental,
            dry_run,
            watermark_before: None,
            watermark_after: None,
        }
    }

    pub fn warn(&mut self, warning: SyncWarning) {
        tracing::warn!(path = ?warning.path, "{}", warning.message);
        self.warnings.push(warning);
    }

    /// Process exit status: 0 committed (warnings allowed), 2 committed
    /// with unresolved conflicts, 1 rolled back.
    pub fn exit_code(&self) -> i32 {
        match self.status {
            SyncStatus::RolledBack => 1,
            SyncStatus::Committed | SyncStatus::NoChanges => {
                if self.conflicts_detected > self.conflicts_resolved {
                    2
                } else {
                    0
                }
            }
        }
    }

    /// One-line summary for log output.
    pub fn summary(&self) -> String {
        format!(
            "scanned {} filtered {} skipped {} imported {} updated {} conflicts {}/{} warnings {} in {}ms",
            self.files_scanned,
            self.files_filtered,
            self.files_skipped,
            self.tasks_imported,
            self.tasks_updated,
            self.conflicts_resolved,
            self.conflicts_detected,
            self.warnings.len(),
            self.elapsed_ms,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes() {
        let mut report = SyncReport::new(true, false);
        assert_eq!(report.exit_code(), 0);

        report.conflicts_detected = 2;
        report.conflicts_resolved = 2;
        assert_eq!(report.exit_code(), 0);

        report.conflicts_resolved = 1;
        assert_eq!(report.exit_code(), 2);

        report.status = SyncStatus::RolledBack;
        assert_eq!(report.exit_code(), 1);
    }
}
