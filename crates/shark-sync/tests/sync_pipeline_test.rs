//! End-to-end sync pipeline tests over tempdir trees and an in-memory
//! database.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use shark_core::config::ConfigStore;
use shark_core::errors::SyncError;
use shark_core::runtime::FixedClock;
use shark_core::types::report::{SyncReport, SyncStatus};
use shark_core::types::status::TaskStatus;
use shark_storage::{queries, Database};
use shark_sync::conflict::resolver::{LinePrompter, Strategy};
use shark_sync::orchestrator::{SyncOptions, SyncOrchestrator};
use tempfile::TempDir;

const TASK_REL: &str = "docs/plan/E04-task-mgmt/E04-F02-cli/tasks/T-E04-F02-001.md";

fn write_file(root: &Path, rel: &str, content: &str) -> PathBuf {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, content).unwrap();
    path
}

fn standard_tree(root: &Path) {
    write_file(root, TASK_REL, "---\ntitle: Setup\n---\n\nBootstrap the CLI.\n");
}

fn run_sync(
    root: &Path,
    db: &mut Database,
    at: DateTime<Utc>,
    configure: impl FnOnce(&mut SyncOptions),
) -> Result<SyncReport, SyncError> {
    let clock = FixedClock(at);
    let mut options = SyncOptions::new(root);
    configure(&mut options);
    let mut orchestrator = SyncOrchestrator::new(options, &clock, None);
    orchestrator.sync(db)
}

fn watermark_of(root: &Path, at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let (config, _) = ConfigStore::load(&root.join(".sharkconfig.json"), at);
    config.last_sync_time
}

#[test]
fn fresh_import_creates_epic_feature_and_task() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    standard_tree(root);
    let mut db = Database::open_in_memory().unwrap();

    let t1 = Utc::now() + Duration::minutes(2);
    let report = run_sync(root, &mut db, t1, |_| {}).unwrap();

    assert_eq!(report.status, SyncStatus::Committed);
    assert_eq!(report.files_scanned, 1);
    assert_eq!(report.files_filtered, 1);
    assert_eq!(report.tasks_imported, 1);
    assert_eq!(report.exit_code(), 0);

    let conn = db.conn();
    assert_eq!(queries::epics::count(conn).unwrap(), 1);
    assert_eq!(queries::features::count(conn).unwrap(), 1);

    let epic = queries::epics::get_by_key(conn, "E04-task-mgmt").unwrap().unwrap();
    assert_eq!(epic.title, "Task Mgmt");
    let feature = queries::features::get_by_key(conn, "E04-F02-cli").unwrap().unwrap();
    assert_eq!(feature.epic_id, epic.id);

    let task = queries::tasks::get_by_key(conn, "T-E04-F02-001").unwrap().unwrap();
    assert_eq!(task.feature_id, feature.id);
    assert_eq!(task.title, "Setup");
    assert_eq!(task.status, TaskStatus::Todo);
    assert_eq!(task.file_path, TASK_REL);

    // Watermark advanced to the run start.
    assert_eq!(watermark_of(root, t1), Some(t1));
    assert_eq!(report.watermark_after, Some(t1));

    // The filename already carried the key: no frontmatter rewrite.
    let content = std::fs::read_to_string(root.join(TASK_REL)).unwrap();
    assert!(!content.contains("task_key"));
}

#[test]
fn round_trip_frontmatter_key_lands_in_database() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_file(
        root,
        "docs/plan/E04-task-mgmt/E04-F02-cli/tasks/setup-work.prp.md",
        "---\ntask_key: T-E04-F02-042\ntitle: Setup\n---\n",
    );
    let mut db = Database::open_in_memory().unwrap();

    let report = run_sync(root, &mut db, Utc::now() + Duration::minutes(2), |_| {}).unwrap();
    assert_eq!(report.tasks_imported, 1);

    let task = queries::tasks::get_by_key(db.conn(), "T-E04-F02-042").unwrap();
    assert!(task.is_some(), "frontmatter key must round-trip verbatim");
}

#[test]
fn incremental_noop_second_sync() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    standard_tree(root);
    let mut db = Database::open_in_memory().unwrap();

    let t1 = Utc::now() + Duration::minutes(2);
    run_sync(root, &mut db, t1, |_| {}).unwrap();

    let t2 = Utc::now() + Duration::minutes(5);
    let report = run_sync(root, &mut db, t2, |_| {}).unwrap();

    assert_eq!(report.status, SyncStatus::NoChanges);
    assert_eq!(report.files_scanned, 1);
    assert_eq!(report.files_filtered, 0);
    assert_eq!(report.files_skipped, 1);
    assert_eq!(report.tasks_imported, 0);
    assert_eq!(report.tasks_updated, 0);
    assert!(report.incremental);

    // Watermark untouched by the no-op run.
    assert_eq!(watermark_of(root, t2), Some(t1));
}

#[test]
fn pattern_fallback_synthesizes_key_and_writes_back() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    standard_tree(root);
    let mut db = Database::open_in_memory().unwrap();

    let t1 = Utc::now() + Duration::minutes(2);
    run_sync(root, &mut db, t1, |_| {}).unwrap();

    let research_rel = "docs/plan/E04-task-mgmt/E04-F02-cli/tasks/01-research.md";
    write_file(root, research_rel, "# Task: Research\n\nLook at prior art.\n");

    let t2 = Utc::now() + Duration::minutes(5);
    let report = run_sync(root, &mut db, t2, |_| {}).unwrap();

    assert_eq!(report.status, SyncStatus::Committed);
    assert_eq!(report.files_filtered, 1, "only the new file re-parses");
    assert_eq!(report.tasks_imported, 1);

    let task = queries::tasks::get_by_key(db.conn(), "T-E04-F02-002")
        .unwrap()
        .expect("synthesized key should allocate the next sequence");
    assert_eq!(task.title, "Research");
    assert_eq!(task.description, Some("Look at prior art.".to_string()));

    // The synthesized key was written back into the frontmatter.
    let content = std::fs::read_to_string(root.join(research_rel)).unwrap();
    assert!(content.starts_with("---\ntask_key: T-E04-F02-002\n"));
    assert!(content.contains("# Task: Research"));
}

#[test]
fn three_way_conflict_file_wins() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    standard_tree(root);
    let mut db = Database::open_in_memory().unwrap();

    // Sync an hour in the past so both later edits land after the watermark.
    let t1 = Utc::now() - Duration::hours(1);
    run_sync(root, &mut db, t1, |_| {}).unwrap();

    // External (database-side) rename.
    let mut task = queries::tasks::get_by_key(db.conn(), "T-E04-F02-001").unwrap().unwrap();
    task.title = "Renamed".to_string();
    task.updated_at = Utc::now() - Duration::minutes(30);
    queries::tasks::update(db.conn(), &task).unwrap();

    // File-side rename.
    write_file(root, TASK_REL, "---\ntitle: Updated\n---\n\nBootstrap the CLI.\n");

    let t2 = Utc::now();
    let report = run_sync(root, &mut db, t2, |options| {
        options.strategy = Strategy::FileWins;
    })
    .unwrap();

    assert_eq!(report.conflicts_detected, 1);
    assert_eq!(report.conflicts_resolved, 1);
    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(report.conflicts[0].field.as_str(), "title");
    assert_eq!(report.conflicts[0].file_value, "Updated");
    assert_eq!(report.conflicts[0].db_value, "Renamed");
    assert_eq!(report.tasks_updated, 1);
    assert_eq!(report.exit_code(), 0);

    let task = queries::tasks::get_by_key(db.conn(), "T-E04-F02-001").unwrap().unwrap();
    assert_eq!(task.title, "Updated");
}

#[test]
fn database_owned_status_change_is_not_a_conflict() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    standard_tree(root);
    let mut db = Database::open_in_memory().unwrap();

    let t1 = Utc::now() + Duration::minutes(2);
    run_sync(root, &mut db, t1, |_| {}).unwrap();

    // Workflow transition out-of-band; the file is untouched.
    let mut task = queries::tasks::get_by_key(db.conn(), "T-E04-F02-001").unwrap().unwrap();
    task.status = TaskStatus::InProgress;
    task.updated_at = t1 + Duration::minutes(1);
    queries::tasks::update(db.conn(), &task).unwrap();

    // Force a full scan so the unchanged file reaches the detector.
    let t2 = Utc::now() + Duration::minutes(10);
    let report = run_sync(root, &mut db, t2, |options| {
        options.force_full_scan = true;
    })
    .unwrap();

    assert_eq!(report.conflicts_detected, 0);
    assert_eq!(report.tasks_updated, 0);
    assert_eq!(report.files_filtered, 1);
    assert!(!report.incremental);

    let task = queries::tasks::get_by_key(db.conn(), "T-E04-F02-001").unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::InProgress, "database wins");
    assert_eq!(task.title, "Setup");
}

#[test]
fn force_full_scan_produces_zero_writes_for_unchanged_files() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    standard_tree(root);
    let mut db = Database::open_in_memory().unwrap();

    run_sync(root, &mut db, Utc::now() + Duration::minutes(2), |_| {}).unwrap();

    let report = run_sync(root, &mut db, Utc::now() + Duration::minutes(10), |options| {
        options.force_full_scan = true;
    })
    .unwrap();

    assert_eq!(report.status, SyncStatus::Committed);
    assert_eq!(report.files_filtered, 1, "force re-evaluates everything");
    assert_eq!(report.tasks_imported, 0);
    assert_eq!(report.tasks_updated, 0);
}

#[test]
fn failed_transaction_leaves_watermark_and_rolls_back() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    standard_tree(root);
    let mut db = Database::open_in_memory().unwrap();

    // Break the schema so owner resolution hits a fatal storage error.
    db.conn().execute_batch("DROP TABLE features").unwrap();

    let t1 = Utc::now() + Duration::minutes(2);
    let report = run_sync(root, &mut db, t1, |_| {}).unwrap();

    assert_eq!(report.status, SyncStatus::RolledBack);
    assert!(!report.errors.is_empty());
    assert_eq!(report.exit_code(), 1);
    // The epic insert from the same run was rolled back with it.
    assert_eq!(queries::epics::count(db.conn()).unwrap(), 0);
    assert_eq!(watermark_of(root, t1), None, "watermark must not advance");

    // Repair the schema; the rerun picks up the very same file set.
    db.conn().pragma_update(None, "user_version", 0).unwrap();
    shark_storage::migrations::run_migrations(db.conn()).unwrap();

    let t2 = Utc::now() + Duration::minutes(5);
    let report = run_sync(root, &mut db, t2, |_| {}).unwrap();
    assert_eq!(report.status, SyncStatus::Committed);
    assert_eq!(report.tasks_imported, 1);
    assert_eq!(watermark_of(root, t2), Some(t2));
}

#[test]
fn orphan_path_does_not_block_sibling_files() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    standard_tree(root);
    write_file(root, "docs/plan/stray/tasks/01-lost.md", "# Task: Lost\n");
    let mut db = Database::open_in_memory().unwrap();

    let report = run_sync(root, &mut db, Utc::now() + Duration::minutes(2), |_| {}).unwrap();

    assert_eq!(report.status, SyncStatus::Committed);
    assert_eq!(report.tasks_imported, 1);
    assert!(report
        .warnings
        .iter()
        .any(|w| w.message.contains("does not resolve")));
    assert_eq!(queries::tasks::count(db.conn()).unwrap(), 1);
}

#[test]
fn manual_strategy_prompts_and_applies_choice() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    standard_tree(root);
    let mut db = Database::open_in_memory().unwrap();

    let t1 = Utc::now() - Duration::hours(1);
    run_sync(root, &mut db, t1, |_| {}).unwrap();

    let mut task = queries::tasks::get_by_key(db.conn(), "T-E04-F02-001").unwrap().unwrap();
    task.title = "Renamed".to_string();
    task.updated_at = Utc::now() - Duration::minutes(30);
    queries::tasks::update(db.conn(), &task).unwrap();
    write_file(root, TASK_REL, "---\ntitle: Updated\n---\n");

    // Garbage first, then a valid answer: the prompter re-prompts.
    let input = std::io::Cursor::new(b"keep\ndb\n".to_vec());
    let mut prompter = LinePrompter::new(input, Vec::new());

    let clock = FixedClock(Utc::now());
    let mut options = SyncOptions::new(root);
    options.strategy = Strategy::Manual;
    let mut orchestrator = SyncOrchestrator::new(options, &clock, Some(&mut prompter));
    let report = orchestrator.sync(&mut db).unwrap();

    assert_eq!(report.conflicts_detected, 1);
    assert_eq!(report.conflicts_resolved, 1);
    assert_eq!(report.exit_code(), 0);

    let task = queries::tasks::get_by_key(db.conn(), "T-E04-F02-001").unwrap().unwrap();
    assert_eq!(task.title, "Renamed", "db choice keeps the database value");
}

#[test]
fn dry_run_predicts_keys_without_writing() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    standard_tree(root);
    let mut db = Database::open_in_memory().unwrap();

    let t1 = Utc::now() + Duration::minutes(2);
    run_sync(root, &mut db, t1, |_| {}).unwrap();

    let research_rel = "docs/plan/E04-task-mgmt/E04-F02-cli/tasks/01-research.md";
    write_file(root, research_rel, "# Task: Research\n");

    let t2 = Utc::now() + Duration::minutes(5);
    let report = run_sync(root, &mut db, t2, |options| {
        options.dry_run = true;
    })
    .unwrap();

    assert!(report.dry_run);
    assert_eq!(report.tasks_imported, 1, "dry run predicts the import");
    // No database write, no frontmatter rewrite, no watermark move.
    assert_eq!(queries::tasks::count(db.conn()).unwrap(), 1);
    let content = std::fs::read_to_string(root.join(research_rel)).unwrap();
    assert!(!content.contains("task_key"));
    assert_eq!(watermark_of(root, t2), Some(t1));
}

#[test]
fn missing_file_warns_but_row_is_retained() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    standard_tree(root);
    let mut db = Database::open_in_memory().unwrap();

    run_sync(root, &mut db, Utc::now() + Duration::minutes(2), |_| {}).unwrap();
    std::fs::remove_file(root.join(TASK_REL)).unwrap();

    let report = run_sync(root, &mut db, Utc::now() + Duration::minutes(5), |_| {}).unwrap();

    assert_eq!(report.status, SyncStatus::NoChanges);
    assert!(report
        .warnings
        .iter()
        .any(|w| w.message.contains("missing from disk")));
    assert_eq!(queries::tasks::count(db.conn()).unwrap(), 1, "never deleted");
}

#[test]
fn invalid_pattern_aborts_with_config_exit_code() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    standard_tree(root);
    write_file(
        root,
        ".sharkconfig.json",
        r#"{"patterns": {"task": {"file": ["^no-captures\\.md$"]}}}"#,
    );
    let mut db = Database::open_in_memory().unwrap();

    let err = run_sync(root, &mut db, Utc::now(), |_| {}).unwrap_err();
    assert!(matches!(err, SyncError::Pattern(_)));
    assert_eq!(err.exit_code(), 3);

    // The bypass flag downgrades validation to a warning.
    let report = run_sync(root, &mut db, Utc::now() + Duration::minutes(2), |options| {
        options.skip_pattern_validation = true;
    })
    .unwrap();
    assert!(report
        .warnings
        .iter()
        .any(|w| w.message.contains("VALIDATION SKIPPED")));
}

#[test]
fn cancellation_aborts_without_advancing_watermark() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    standard_tree(root);
    let mut db = Database::open_in_memory().unwrap();

    let t1 = Utc::now() + Duration::minutes(2);
    let err = run_sync(root, &mut db, t1, |options| {
        options.cancel.cancel();
    })
    .unwrap_err();

    assert!(matches!(err, SyncError::Cancelled));
    assert_eq!(err.exit_code(), 1);
    assert_eq!(queries::tasks::count(db.conn()).unwrap(), 0);
    assert_eq!(watermark_of(root, t1), None);
}
