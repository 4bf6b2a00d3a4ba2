//! The sync orchestrator.
//!
//! Drives the full pipeline — scan, classify, filter, parse, key
//! synthesis, conflict reconciliation — inside one database transaction,
//! and advances the watermark only after a successful commit. Constructed
//! per invocation with injected dependencies; it owns the error boundary:
//! per-file problems become report warnings, database failures roll the
//! transaction back, and cancellation or timeout aborts the run.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use shark_core::config::{ConfigStore, SharkConfig};
use shark_core::errors::{StorageError, SyncError};
use shark_core::runtime::{CancellationToken, Clock};
use shark_core::types::metadata::TaskMetadata;
use shark_core::types::records::TaskRecord;
use shark_core::types::report::{SyncReport, SyncStatus, SyncWarning};
use shark_core::types::status::TaskStatus;
use shark_core::{FxHashMap, FxHashSet};
use shark_storage::{queries, Database};

use crate::conflict::detector::{detect, DetectAction};
use crate::conflict::resolver::{resolve, ConflictPrompter, Strategy};
use crate::frontmatter::{self, title_case};
use crate::incremental;
use crate::keygen::{self, OwnerKeys};
use crate::patterns::registry::PatternRegistry;
use crate::patterns::{PatternKind, PatternMatch, PatternSlot};
use crate::scanner::{self, FileDescriptor, FileKindHint};

/// Default per-invocation timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Config file name at the project root.
pub const CONFIG_FILE_NAME: &str = ".sharkconfig.json";

/// Options for one sync invocation.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub project_root: PathBuf,
    /// Defaults to `<project_root>/.sharkconfig.json`.
    pub config_path: Option<PathBuf>,
    /// Overrides the config's `docs_root`.
    pub docs_root: Option<PathBuf>,
    pub strategy: Strategy,
    pub dry_run: bool,
    pub force_full_scan: bool,
    pub skip_pattern_validation: bool,
    pub timeout: Duration,
    pub cancel: CancellationToken,
}

impl SyncOptions {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            config_path: None,
            docs_root: None,
            strategy: Strategy::default(),
            dry_run: false,
            force_full_scan: false,
            skip_pattern_validation: false,
            timeout: DEFAULT_TIMEOUT,
            cancel: CancellationToken::new(),
        }
    }

    fn config_path(&self) -> PathBuf {
        self.config_path
            .clone()
            .unwrap_or_else(|| self.project_root.join(CONFIG_FILE_NAME))
    }
}

/// Simulated write state for dry runs: virtual owner rows and in-memory
/// sequence counters, so the report predicts the keys a real run would
/// synthesize.
#[derive(Default)]
struct DryState {
    virtual_epics: FxHashMap<String, i64>,
    virtual_features: FxHashMap<String, i64>,
    /// feature_id -> last allocated sequence (seeded from the database).
    sequences: FxHashMap<i64, i64>,
    next_virtual_id: i64,
}

impl DryState {
    fn virtual_epic_id(&mut self, epic_key: &str) -> i64 {
        let Self {
            virtual_epics,
            next_virtual_id,
            ..
        } = self;
        *virtual_epics.entry(epic_key.to_string()).or_insert_with(|| {
            *next_virtual_id -= 1;
            *next_virtual_id
        })
    }

    fn virtual_feature_id(&mut self, feature_key: &str) -> i64 {
        let Self {
            virtual_features,
            next_virtual_id,
            ..
        } = self;
        *virtual_features
            .entry(feature_key.to_string())
            .or_insert_with(|| {
                *next_virtual_id -= 1;
                *next_virtual_id
            })
    }
}

/// Per-invocation pipeline driver.
pub struct SyncOrchestrator<'a> {
    options: SyncOptions,
    clock: &'a dyn Clock,
    prompter: Option<&'a mut dyn ConflictPrompter>,
}

impl<'a> SyncOrchestrator<'a> {
    pub fn new(
        options: SyncOptions,
        clock: &'a dyn Clock,
        prompter: Option<&'a mut dyn ConflictPrompter>,
    ) -> Self {
        Self {
            options,
            clock,
            prompter,
        }
    }

    /// Run one sync over the given database.
    ///
    /// Returns `Err` for pre-scan validation failures, cancellation, and
    /// timeout; database failures mid-run roll back and are reported via
    /// the returned report's `RolledBack` status instead.
    pub fn sync(&mut self, db: &mut Database) -> Result<SyncReport, SyncError> {
        let started = Instant::now();
        let now = self.clock.now();
        let config_path = self.options.config_path();

        let (config, config_warnings) = ConfigStore::load(&config_path, now);
        let (registry, pattern_warnings) = PatternRegistry::from_config(
            &config.patterns,
            self.options.skip_pattern_validation,
        )?;

        let watermark = config.last_sync_time;
        let incremental_mode = watermark.is_some() && !self.options.force_full_scan;
        let mut report = SyncReport::new(incremental_mode, self.options.dry_run);
        report.watermark_before = watermark;
        report.watermark_after = watermark;
        report.warnings.extend(config_warnings);
        report.warnings.extend(pattern_warnings);

        self.guard(&started)?;

        // Scan and classify.
        let docs_root = self
            .options
            .docs_root
            .clone()
            .unwrap_or_else(|| self.options.project_root.join(&config.docs_root));
        let scan_outcome = scanner::scan(&self.options.project_root, &docs_root);
        report.files_scanned = scan_outcome.files.len();
        for warning in scan_outcome.warnings {
            report.warn(warning);
        }

        let scanned_paths: FxHashSet<String> = scan_outcome
            .files
            .iter()
            .map(|f| f.rel_path.clone())
            .collect();

        let mut matches: FxHashMap<String, PatternMatch> = FxHashMap::default();
        let mut task_files = Vec::new();
        for descriptor in scan_outcome.files {
            self.guard(&started)?;
            if let Some(m) = classify_task_file(&registry, &descriptor, &mut report) {
                matches.insert(descriptor.rel_path.clone(), m);
                task_files.push(descriptor);
            } else {
                report.files_skipped += 1;
            }
        }

        // One batch query for the known path set; also powers the
        // missing-file warnings (rows are never deleted for a lost file).
        let known: FxHashSet<String> = queries::tasks::known_file_paths(db.conn())?
            .into_iter()
            .collect();
        for path in &known {
            if !scanned_paths.contains(path) {
                report.warn(SyncWarning::for_file(
                    path.clone(),
                    "task file missing from disk; database row retained",
                ));
            }
        }

        let filter = incremental::filter_changed(
            task_files,
            &known,
            watermark,
            now,
            self.options.force_full_scan,
        );
        report.files_skipped += filter.skipped;
        report.files_filtered = filter.kept.len();
        for warning in filter.warnings {
            report.warn(warning);
        }

        if filter.kept.is_empty() {
            report.status = SyncStatus::NoChanges;
            report.elapsed_ms = started.elapsed().as_millis() as u64;
            tracing::info!(summary = %report.summary(), "sync: no changes");
            return Ok(report);
        }

        let sync_started_at = now;

        if self.options.dry_run {
            self.run_dry(db, &registry, &config, &filter.kept, &matches, watermark, now, &started, &mut report)?;
        } else {
            self.run_transactional(
                db,
                &registry,
                &config,
                &filter.kept,
                &matches,
                watermark,
                now,
                sync_started_at,
                &config_path,
                &started,
                &mut report,
            )?;
        }

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(summary = %report.summary(), "sync finished");
        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    fn run_transactional(
        &mut self,
        db: &mut Database,
        registry: &PatternRegistry,
        config: &SharkConfig,
        kept: &[FileDescriptor],
        matches: &FxHashMap<String, PatternMatch>,
        watermark: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        sync_started_at: DateTime<Utc>,
        config_path: &std::path::Path,
        started: &Instant,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let tx = db.transaction()?;

        let mut fatal: Option<SyncError> = None;
        for descriptor in kept {
            if let Err(e) = self.guard(started) {
                fatal = Some(e);
                break;
            }
            let pattern_match = matches.get(&descriptor.rel_path);
            if let Err(e) = self.process_file(
                &tx,
                None,
                registry,
                config,
                descriptor,
                pattern_match,
                watermark,
                now,
                report,
            ) {
                fatal = Some(SyncError::Storage(e));
                break;
            }
        }

        let outcome = match fatal {
            None => match tx.commit() {
                Ok(()) => Ok(()),
                Err(e) => Err(SyncError::Storage(StorageError::SqliteError {
                    message: e.to_string(),
                })),
            },
            Some(e) => {
                // Dropping an uncommitted transaction rolls it back.
                drop(tx);
                Err(e)
            }
        };

        match outcome {
            Ok(()) => {
                report.status = SyncStatus::Committed;
                report.watermark_after = Some(sync_started_at);
                if let Err(e) = ConfigStore::update_watermark(config_path, sync_started_at, now) {
                    report.warn(SyncWarning::general(format!(
                        "committed, but failed to persist watermark: {e}"
                    )));
                }
            }
            Err(SyncError::Storage(e)) => {
                report.status = SyncStatus::RolledBack;
                report.errors.push(e.to_string());
                tracing::error!(error = %e, "sync rolled back");
            }
            // Cancellation and timeout abort the invocation entirely;
            // the transaction is already rolled back.
            Err(e) => {
                report.status = SyncStatus::RolledBack;
                self.record_history(db, sync_started_at, now, report, Some(&e.to_string()));
                return Err(e);
            }
        }

        let error = report.errors.first().cloned();
        self.record_history(db, sync_started_at, self.clock.now(), report, error.as_deref());
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn run_dry(
        &mut self,
        db: &mut Database,
        registry: &PatternRegistry,
        config: &SharkConfig,
        kept: &[FileDescriptor],
        matches: &FxHashMap<String, PatternMatch>,
        watermark: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        started: &Instant,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let mut dry = DryState::default();
        for descriptor in kept {
            self.guard(started)?;
            let pattern_match = matches.get(&descriptor.rel_path);
            if let Err(e) = self.process_file(
                db.conn(),
                Some(&mut dry),
                registry,
                config,
                descriptor,
                pattern_match,
                watermark,
                now,
                report,
            ) {
                report.status = SyncStatus::RolledBack;
                report.errors.push(e.to_string());
                return Ok(());
            }
        }
        Ok(())
    }

    /// Process one surviving file. Soft failures append warnings and
    /// return `Ok`; the returned error is reserved for storage failures
    /// that must abort the transaction.
    #[allow(clippy::too_many_arguments)]
    fn process_file(
        &mut self,
        conn: &Connection,
        mut dry: Option<&mut DryState>,
        registry: &PatternRegistry,
        config: &SharkConfig,
        descriptor: &FileDescriptor,
        pattern_match: Option<&PatternMatch>,
        watermark: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        report: &mut SyncReport,
    ) -> Result<(), StorageError> {
        let rel = descriptor.rel_path.as_str();

        let content = match std::fs::read_to_string(&descriptor.abs_path) {
            Ok(content) => content,
            Err(e) => {
                report.warn(SyncWarning::for_file(rel, format!("unreadable: {e}")));
                report.files_skipped += 1;
                return Ok(());
            }
        };

        let parsed = frontmatter::parse_task_file(&content, descriptor, pattern_match);
        let mut metadata = parsed.metadata;
        for warning in parsed.warnings {
            report.warn(warning);
        }
        if metadata.agent_type.is_none() {
            metadata.agent_type = config.default_agent.clone();
        }

        let owners = match keygen::resolve_owners(rel, registry) {
            Ok(Some(owners)) => owners,
            Ok(None) => {
                report.warn(SyncWarning::for_file(
                    rel,
                    "path does not resolve to a known epic/feature",
                ));
                report.files_skipped += 1;
                return Ok(());
            }
            Err(e) => {
                report.warn(SyncWarning::for_file(rel, e.to_string()));
                report.files_skipped += 1;
                return Ok(());
            }
        };

        let feature_id = match self.resolve_feature_id(conn, dry.as_deref_mut(), &owners, now) {
            Ok(id) => id,
            Err(StorageError::ConstraintViolation { message }) => {
                report.warn(SyncWarning::for_file(rel, message));
                report.files_skipped += 1;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        // Stable key: frontmatter, then pattern captures, then synthesis.
        let existing = keygen::existing_key(&metadata, pattern_match).or_else(|| {
            pattern_match.and_then(|m| keygen::key_from_captures(registry, m))
        });
        let (task_key, synthesized) = match existing {
            Some(key) => (key, false),
            None => {
                let sequence = match self.next_sequence(conn, dry.as_deref_mut(), feature_id) {
                    Ok(seq) => seq,
                    Err(e) => return Err(e),
                };
                let slug = pattern_match
                    .and_then(|m| m.capture("task_slug").or_else(|| m.capture("slug")))
                    .map(str::to_string);
                match keygen::synthesize_key(registry, &owners, sequence, slug.as_deref()) {
                    Ok(key) => (key, true),
                    Err(e) => {
                        report.warn(SyncWarning::for_file(
                            rel,
                            format!("cannot synthesize task key: {e}"),
                        ));
                        report.files_skipped += 1;
                        return Ok(());
                    }
                }
            }
        };

        // Write the synthesized key back into the file. This is the one
        // side effect outside the transaction's rollback domain; failure
        // downgrades to a warning and the in-memory key is used.
        if synthesized && dry.is_none() {
            let rewritten = frontmatter::inject_task_key(&content, &task_key);
            if let Err(e) = frontmatter::atomic_write(&descriptor.abs_path, &rewritten) {
                report.warn(SyncWarning::for_file(
                    rel,
                    format!("failed to write task_key back: {e}"),
                ));
            }
        }

        let existing = queries::tasks::get_by_key(conn, &task_key)?;
        match existing {
            None => self.import_task(conn, dry, &metadata, &task_key, feature_id, rel, now, report),
            Some(row) => self.reconcile_task(conn, dry, &metadata, row, descriptor, watermark, now, report),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn import_task(
        &mut self,
        conn: &Connection,
        dry: Option<&mut DryState>,
        metadata: &TaskMetadata,
        task_key: &str,
        feature_id: i64,
        rel: &str,
        now: DateTime<Utc>,
        report: &mut SyncReport,
    ) -> Result<(), StorageError> {
        let record = new_task_record(metadata, task_key, feature_id, rel, now);
        if dry.is_some() {
            report.tasks_imported += 1;
            return Ok(());
        }
        match queries::tasks::insert(conn, &record) {
            Ok(_) => {
                report.tasks_imported += 1;
                Ok(())
            }
            Err(StorageError::ConstraintViolation { message }) => {
                report.warn(SyncWarning::for_file(rel, message));
                report.files_skipped += 1;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn reconcile_task(
        &mut self,
        conn: &Connection,
        dry: Option<&mut DryState>,
        metadata: &TaskMetadata,
        row: TaskRecord,
        descriptor: &FileDescriptor,
        watermark: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        report: &mut SyncReport,
    ) -> Result<(), StorageError> {
        let rel = descriptor.rel_path.as_str();
        let detection = detect(metadata, &row, descriptor.mtime, watermark);

        let mut merged = match detection.action {
            DetectAction::NoChange | DetectAction::KeepDatabase => row.clone(),
            DetectAction::UpdateFromFile => apply_file_fields(&row, metadata),
            DetectAction::FieldMerge => {
                report.conflicts_detected += detection.conflicts.len();
                report.conflicts.extend(detection.conflicts.iter().cloned());

                let prompter: Option<&mut dyn ConflictPrompter> = if dry.is_none() {
                    match self.prompter.as_mut() {
                        Some(p) => Some(&mut **p),
                        None => None,
                    }
                } else {
                    None
                };
                match resolve(
                    self.options.strategy,
                    &detection.conflicts,
                    metadata,
                    &row,
                    prompter,
                ) {
                    Ok(resolution) => {
                        report.conflicts_resolved += resolution.resolved;
                        resolution.merged
                    }
                    Err(e) => {
                        report.warn(SyncWarning::for_file(
                            rel,
                            format!("manual resolution aborted: {e}; database values kept"),
                        ));
                        row.clone()
                    }
                }
            }
        };

        // The path is identity, not content: keep it current without
        // surfacing a conflict — except when the database side won.
        if detection.action != DetectAction::KeepDatabase && merged.file_path != rel {
            merged.file_path = rel.to_string();
        }

        if needs_write(&row, &merged) {
            merged.updated_at = now;
            if dry.is_none() {
                match queries::tasks::update(conn, &merged) {
                    Ok(()) => {}
                    Err(StorageError::ConstraintViolation { message }) => {
                        report.warn(SyncWarning::for_file(rel, message));
                        report.files_skipped += 1;
                        return Ok(());
                    }
                    Err(e) => return Err(e),
                }
            }
            report.tasks_updated += 1;
        } else {
            report.files_skipped += 1;
        }
        Ok(())
    }

    /// Load or create the owning epic and feature, returning the feature
    /// row id. Missing owners are created from the path-inferred keys,
    /// titled from their slugs; dry runs allocate virtual ids instead.
    fn resolve_feature_id(
        &self,
        conn: &Connection,
        mut dry: Option<&mut DryState>,
        owners: &OwnerKeys,
        now: DateTime<Utc>,
    ) -> Result<i64, StorageError> {
        let epic_id = match queries::epics::get_by_key(conn, &owners.epic_key)? {
            Some(epic) => epic.id,
            None => {
                let title = title_case(owners.epic_slug.as_deref().unwrap_or(&owners.epic_key));
                match dry.as_deref_mut() {
                    Some(state) => state.virtual_epic_id(&owners.epic_key),
                    None => queries::epics::insert(conn, &owners.epic_key, &title, now)?,
                }
            }
        };

        match queries::features::get_by_key(conn, &owners.feature_key)? {
            Some(feature) => Ok(feature.id),
            None => {
                let title =
                    title_case(owners.feature_slug.as_deref().unwrap_or(&owners.feature_key));
                match dry {
                    Some(state) => Ok(state.virtual_feature_id(&owners.feature_key)),
                    None => {
                        queries::features::insert(conn, epic_id, &owners.feature_key, &title, now)
                    }
                }
            }
        }
    }

    /// Next unused sequence for a feature. Real runs query inside the
    /// open transaction (prior inserts are visible); dry runs seed a
    /// counter from the database and advance it in memory.
    fn next_sequence(
        &self,
        conn: &Connection,
        dry: Option<&mut DryState>,
        feature_id: i64,
    ) -> Result<i64, StorageError> {
        match dry {
            Some(state) => {
                let entry = match state.sequences.get(&feature_id) {
                    Some(&last) => last,
                    None => {
                        if feature_id > 0 {
                            queries::tasks::max_sequence_for_feature(conn, feature_id)?
                        } else {
                            0
                        }
                    }
                };
                let next = entry + 1;
                state.sequences.insert(feature_id, next);
                Ok(next)
            }
            None => Ok(queries::tasks::max_sequence_for_feature(conn, feature_id)? + 1),
        }
    }

    fn record_history(
        &self,
        db: &Database,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        report: &SyncReport,
        error: Option<&str>,
    ) {
        let status = match report.status {
            SyncStatus::Committed => "committed",
            SyncStatus::NoChanges => "no_changes",
            SyncStatus::RolledBack => "rolled_back",
        };
        let result = queries::sync_history::insert_start(db.conn(), started_at).and_then(|id| {
            queries::sync_history::update_complete(
                db.conn(),
                id,
                completed_at,
                report.files_scanned as i64,
                report.files_filtered as i64,
                report.files_skipped as i64,
                report.tasks_imported as i64,
                report.tasks_updated as i64,
                report.conflicts_detected as i64,
                report.conflicts_resolved as i64,
                status,
                error,
            )
        });
        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to record sync history");
        }
    }

    fn guard(&self, started: &Instant) -> Result<(), SyncError> {
        self.options.cancel.check()?;
        let elapsed = started.elapsed();
        if elapsed > self.options.timeout {
            return Err(SyncError::Timeout {
                elapsed_ms: elapsed.as_millis() as u64,
            });
        }
        Ok(())
    }
}

/// Decide whether a scanned descriptor is a task file. Epic and feature
/// documents are skipped silently; anything else that matches no pattern
/// warns.
fn classify_task_file(
    registry: &PatternRegistry,
    descriptor: &FileDescriptor,
    report: &mut SyncReport,
) -> Option<PatternMatch> {
    match descriptor.kind_hint {
        FileKindHint::EpicDoc | FileKindHint::FeatureDoc => return None,
        FileKindHint::Task | FileKindHint::Other => {}
    }

    let name = descriptor.file_name();
    match registry.classify(name, PatternKind::Task, PatternSlot::File) {
        Ok(Some(m)) => return Some(m),
        Ok(None) => {}
        Err(e) => {
            report.warn(SyncWarning::for_file(
                descriptor.rel_path.clone(),
                format!("{e}; file skipped"),
            ));
            return None;
        }
    }

    if descriptor.kind_hint == FileKindHint::Task {
        report.warn(SyncWarning::for_file(
            descriptor.rel_path.clone(),
            "matches no task pattern",
        ));
        return None;
    }

    // Outside a task container: a feature or epic document match means
    // the file simply is not a task.
    for (kind, slot) in [
        (PatternKind::Feature, PatternSlot::File),
        (PatternKind::Epic, PatternSlot::File),
    ] {
        if matches!(registry.classify(name, kind, slot), Ok(Some(_))) {
            return None;
        }
    }

    report.warn(SyncWarning::for_file(
        descriptor.rel_path.clone(),
        "matches no pattern",
    ));
    None
}

/// New row from parsed metadata, with lifecycle markers stamped for
/// statuses that imply one.
fn new_task_record(
    metadata: &TaskMetadata,
    task_key: &str,
    feature_id: i64,
    rel: &str,
    now: DateTime<Utc>,
) -> TaskRecord {
    let (started_at, completed_at, blocked_at) = match metadata.status {
        TaskStatus::Todo => (None, None, None),
        TaskStatus::InProgress | TaskStatus::Review => (Some(now), None, None),
        TaskStatus::Blocked => (None, None, Some(now)),
        TaskStatus::Done => (None, Some(now), None),
    };

    TaskRecord {
        id: 0,
        feature_id,
        task_key: task_key.to_string(),
        title: metadata.title.clone(),
        description: none_if_empty(&metadata.description),
        status: metadata.status,
        agent_type: metadata.agent_type.clone(),
        priority: metadata.priority,
        assigned_agent: metadata.assigned_agent.clone(),
        file_path: rel.to_string(),
        blocked_reason: metadata.blocked_reason.clone(),
        depends_on: metadata.depends_on.clone(),
        created_at: now,
        updated_at: now,
        started_at,
        completed_at,
        blocked_at,
    }
}

/// Merge for the file-as-source path: file-owned fields from the file,
/// database-owned fields untouched.
fn apply_file_fields(row: &TaskRecord, metadata: &TaskMetadata) -> TaskRecord {
    let mut merged = row.clone();
    if !metadata.title.trim().is_empty() {
        merged.title = metadata.title.clone();
    }
    if !metadata.description.is_empty() {
        merged.description = Some(metadata.description.clone());
    }
    merged
}

fn needs_write(row: &TaskRecord, merged: &TaskRecord) -> bool {
    row.title != merged.title
        || row.description != merged.description
        || row.file_path != merged.file_path
}

fn none_if_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}
