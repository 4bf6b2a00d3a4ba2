//! tasks table queries.

use rusqlite::{params, Connection, OptionalExtension};
use shark_core::errors::StorageError;
use shark_core::types::records::TaskRecord;
use shark_core::types::status::TaskStatus;

use super::{parse_ts, parse_ts_opt, sq, ts, ts_opt};

/// Look up a task by its key.
pub fn get_by_key(conn: &Connection, task_key: &str) -> Result<Option<TaskRecord>, StorageError> {
    let mut stmt = conn
        .prepare_cached(&format!(
            "SELECT {COLUMNS} FROM tasks WHERE task_key = ?1"
        ))
        .map_err(sq)?;

    stmt.query_row(params![task_key], map_task_row)
        .optional()
        .map_err(sq)
}

/// Look up a task by its project-relative file path.
pub fn get_by_path(conn: &Connection, file_path: &str) -> Result<Option<TaskRecord>, StorageError> {
    let mut stmt = conn
        .prepare_cached(&format!(
            "SELECT {COLUMNS} FROM tasks WHERE file_path = ?1"
        ))
        .map_err(sq)?;

    stmt.query_row(params![file_path], map_task_row)
        .optional()
        .map_err(sq)
}

/// All known task file paths, in one batch query.
pub fn known_file_paths(conn: &Connection) -> Result<Vec<String>, StorageError> {
    let mut stmt = conn
        .prepare_cached("SELECT file_path FROM tasks")
        .map_err(sq)?;

    let rows = stmt.query_map([], |row| row.get(0)).map_err(sq)?;

    let mut result = Vec::new();
    for row in rows {
        result.push(row.map_err(sq)?);
    }
    Ok(result)
}

/// Highest allocated sequence number among a feature's task keys.
/// Returns 0 when the feature has no tasks yet.
pub fn max_sequence_for_feature(
    conn: &Connection,
    feature_id: i64,
) -> Result<i64, StorageError> {
    let mut stmt = conn
        .prepare_cached("SELECT task_key FROM tasks WHERE feature_id = ?1")
        .map_err(sq)?;

    let rows = stmt
        .query_map(params![feature_id], |row| row.get::<_, String>(0))
        .map_err(sq)?;

    let mut max = 0;
    for row in rows {
        let key = row.map_err(sq)?;
        if let Some(seq) = sequence_of(&key) {
            max = max.max(seq);
        }
    }
    Ok(max)
}

/// Insert a new task; `task.id` is ignored. Returns the row id.
pub fn insert(conn: &Connection, task: &TaskRecord) -> Result<i64, StorageError> {
    let mut stmt = conn
        .prepare_cached(
            "INSERT INTO tasks
             (feature_id, task_key, title, description, status, agent_type, priority,
              assigned_agent, file_path, blocked_reason, depends_on,
              created_at, updated_at, started_at, completed_at, blocked_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        )
        .map_err(sq)?;

    stmt.execute(params![
        task.feature_id,
        task.task_key,
        task.title,
        task.description,
        task.status.as_str(),
        task.agent_type,
        task.priority,
        task.assigned_agent,
        task.file_path,
        task.blocked_reason,
        depends_on_json(&task.depends_on),
        ts(task.created_at),
        ts(task.updated_at),
        ts_opt(task.started_at),
        ts_opt(task.completed_at),
        ts_opt(task.blocked_at),
    ])
    .map_err(sq)?;
    Ok(conn.last_insert_rowid())
}

/// Update every mutable column of an existing task row by id.
pub fn update(conn: &Connection, task: &TaskRecord) -> Result<(), StorageError> {
    let mut stmt = conn
        .prepare_cached(
            "UPDATE tasks SET
             title = ?2, description = ?3, status = ?4, agent_type = ?5, priority = ?6,
             assigned_agent = ?7, file_path = ?8, blocked_reason = ?9, depends_on = ?10,
             updated_at = ?11, started_at = ?12, completed_at = ?13, blocked_at = ?14
             WHERE id = ?1",
        )
        .map_err(sq)?;

    stmt.execute(params![
        task.id,
        task.title,
        task.description,
        task.status.as_str(),
        task.agent_type,
        task.priority,
        task.assigned_agent,
        task.file_path,
        task.blocked_reason,
        depends_on_json(&task.depends_on),
        ts(task.updated_at),
        ts_opt(task.started_at),
        ts_opt(task.completed_at),
        ts_opt(task.blocked_at),
    ])
    .map_err(sq)?;
    Ok(())
}

/// Count total tasks.
pub fn count(conn: &Connection) -> Result<i64, StorageError> {
    conn.query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))
        .map_err(sq)
}

const COLUMNS: &str = "id, feature_id, task_key, title, description, status, agent_type, \
                       priority, assigned_agent, file_path, blocked_reason, depends_on, \
                       created_at, updated_at, started_at, completed_at, blocked_at";

fn map_task_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskRecord> {
    let status_raw: String = row.get(5)?;
    let depends_raw: Option<String> = row.get(11)?;

    Ok(TaskRecord {
        id: row.get(0)?,
        feature_id: row.get(1)?,
        task_key: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        status: TaskStatus::parse(&status_raw).unwrap_or_default(),
        agent_type: row.get(6)?,
        priority: row.get(7)?,
        assigned_agent: row.get(8)?,
        file_path: row.get(9)?,
        blocked_reason: row.get(10)?,
        depends_on: depends_raw
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default(),
        created_at: parse_ts(12, row.get(12)?)?,
        updated_at: parse_ts(13, row.get(13)?)?,
        started_at: parse_ts_opt(14, row.get(14)?)?,
        completed_at: parse_ts_opt(15, row.get(15)?)?,
        blocked_at: parse_ts_opt(16, row.get(16)?)?,
    })
}

fn depends_on_json(depends_on: &[String]) -> Option<String> {
    if depends_on.is_empty() {
        None
    } else {
        serde_json::to_string(depends_on).ok()
    }
}

/// The trailing numeric segment of a task key, e.g. 3 for `T-E04-F02-003`
/// and for the slugged form `T-E04-F02-003-research`.
fn sequence_of(task_key: &str) -> Option<i64> {
    task_key
        .split('-')
        .filter(|seg| !seg.is_empty() && seg.bytes().all(|b| b.is_ascii_digit()))
        .last()
        .and_then(|seg| seg.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_parses_plain_and_slugged_keys() {
        assert_eq!(sequence_of("T-E04-F02-003"), Some(3));
        assert_eq!(sequence_of("T-E04-F02-012-research-spike"), Some(12));
        assert_eq!(sequence_of("no-digits-here"), None);
    }
}
