//! Database row records for epics, features, and tasks.
//!
//! Foreign references are by surrogate id in storage and by key at the
//! protocol layer; the orchestrator resolves keys to ids before insert.

use chrono::{DateTime, Utc};

use super::status::TaskStatus;

/// An epic row. Identified by `epic_key` (e.g. `E04-task-mgmt`).
#[derive(Debug, Clone)]
pub struct EpicRecord {
    pub id: i64,
    pub epic_key: String,
    pub title: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A feature row. Belongs to exactly one epic.
#[derive(Debug, Clone)]
pub struct FeatureRecord {
    pub id: i64,
    pub epic_id: i64,
    pub feature_key: String,
    pub title: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A task row. Belongs to exactly one feature.
///
/// `updated_at` is monotonically non-decreasing and set only by the
/// orchestrator on write. `depends_on` is stored but never validated here;
/// consumers may enforce DAG properties.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub id: i64,
    pub feature_id: i64,
    pub task_key: String,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub agent_type: Option<String>,
    pub priority: i64,
    pub assigned_agent: Option<String>,
    pub file_path: String,
    pub blocked_reason: Option<String>,
    pub depends_on: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub blocked_at: Option<DateTime<Utc>>,
}
