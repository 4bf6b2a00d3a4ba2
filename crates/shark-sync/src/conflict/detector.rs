//! Three-way conflict detection over file state, database state, and the
//! sync watermark.

use chrono::{DateTime, Duration, Utc};
use shark_core::types::metadata::TaskMetadata;
use shark_core::types::records::TaskRecord;
use shark_core::types::report::{Conflict, ConflictField};

use crate::incremental::CLOCK_SKEW_BUFFER_SECS;

/// What the orchestrator should do with an existing row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectAction {
    /// Neither side changed since the watermark.
    NoChange,
    /// Only the file changed: it is the source of truth, no conflict.
    UpdateFromFile,
    /// Only the database changed: it wins by default, skip the file.
    KeepDatabase,
    /// Both sides changed (or there is no watermark): the field-level
    /// conflicts carry the differences.
    FieldMerge,
}

#[derive(Debug)]
pub struct Detection {
    pub action: DetectAction,
    pub conflicts: Vec<Conflict>,
}

/// Decide which differences between file and row need a resolution policy.
///
/// With a watermark, a side counts as changed when its timestamp exceeds
/// `watermark - clock-skew buffer`. Without one, field comparison always
/// runs (the pre-incremental behavior).
pub fn detect(
    metadata: &TaskMetadata,
    row: &TaskRecord,
    file_mtime: DateTime<Utc>,
    watermark: Option<DateTime<Utc>>,
) -> Detection {
    let Some(mark) = watermark else {
        return Detection {
            action: DetectAction::FieldMerge,
            conflicts: field_conflicts(metadata, row, file_mtime),
        };
    };

    let threshold = mark - Duration::seconds(CLOCK_SKEW_BUFFER_SECS);
    let file_changed = file_mtime > threshold;
    let db_changed = row.updated_at > threshold;

    match (file_changed, db_changed) {
        (false, false) => Detection {
            action: DetectAction::NoChange,
            conflicts: Vec::new(),
        },
        (true, false) => Detection {
            action: DetectAction::UpdateFromFile,
            conflicts: Vec::new(),
        },
        (false, true) => Detection {
            action: DetectAction::KeepDatabase,
            conflicts: Vec::new(),
        },
        (true, true) => Detection {
            action: DetectAction::FieldMerge,
            conflicts: field_conflicts(metadata, row, file_mtime),
        },
    }
}

/// Compare the file-owned fields. Status, priority, agent type, assigned
/// agent, and depends_on are database-owned and never conflict; file_path
/// differences are applied silently, not surfaced.
fn field_conflicts(
    metadata: &TaskMetadata,
    row: &TaskRecord,
    file_mtime: DateTime<Utc>,
) -> Vec<Conflict> {
    let mut conflicts = Vec::new();

    if !metadata.title.trim().is_empty() && metadata.title != row.title {
        conflicts.push(Conflict {
            task_key: row.task_key.clone(),
            field: ConflictField::Title,
            file_value: metadata.title.clone(),
            db_value: row.title.clone(),
            file_mtime,
            db_updated_at: row.updated_at,
        });
    }

    if !metadata.description.is_empty() {
        if let Some(db_description) = row.description.as_deref().filter(|d| !d.is_empty()) {
            if metadata.description != db_description {
                conflicts.push(Conflict {
                    task_key: row.task_key.clone(),
                    field: ConflictField::Description,
                    file_value: metadata.description.clone(),
                    db_value: db_description.to_string(),
                    file_mtime,
                    db_updated_at: row.updated_at,
                });
            }
        }
    }

    conflicts
}
