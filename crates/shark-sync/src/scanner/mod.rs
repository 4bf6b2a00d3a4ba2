//! Documentation-root scanner.
//!
//! Walks the docs root in stable lexicographic order, yielding one
//! descriptor per candidate Markdown file. Stat only — file contents are
//! never read here. Symlinks are rejected rather than followed.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use shark_core::types::report::SyncWarning;

/// Per-file size ceiling. Oversized files warn and are skipped.
pub const MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Directory names that contain task files.
pub const TASK_CONTAINER_DIRS: &[&str] = &["tasks", "prps"];

/// Path-derived guess at what a file is, refined later by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKindHint {
    /// Sits inside a `tasks/` or `prps/` directory.
    Task,
    /// Named `epic.md`.
    EpicDoc,
    /// Named `prd.md`.
    FeatureDoc,
    Other,
}

/// One candidate file, as discovered on disk.
#[derive(Debug, Clone)]
pub struct FileDescriptor {
    pub abs_path: PathBuf,
    /// Project-relative path with forward-slash separators, stable across
    /// platforms; this is the identity stored in the database.
    pub rel_path: String,
    pub mtime: DateTime<Utc>,
    pub size: u64,
    pub kind_hint: FileKindHint,
}

impl FileDescriptor {
    pub fn file_name(&self) -> &str {
        self.rel_path.rsplit('/').next().unwrap_or(&self.rel_path)
    }
}

/// Scan output: descriptors in stable order plus per-file warnings.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub files: Vec<FileDescriptor>,
    pub warnings: Vec<SyncWarning>,
}

/// Walk `docs_root`, yielding descriptors for every `.md` file.
///
/// Paths in descriptors are relative to `project_root`. Ordering is
/// lexicographic by path so output is deterministic for a given tree.
pub fn scan(project_root: &Path, docs_root: &Path) -> ScanOutcome {
    let mut outcome = ScanOutcome::default();

    let mut builder = ignore::WalkBuilder::new(docs_root);
    builder
        .standard_filters(false)
        .hidden(true)
        .follow_links(false)
        .sort_by_file_path(|a, b| a.cmp(b));

    for entry in builder.build() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                outcome
                    .warnings
                    .push(SyncWarning::general(format!("scan error: {e}")));
                continue;
            }
        };

        let Some(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_symlink() {
            outcome.warnings.push(SyncWarning::for_file(
                relative_slash_path(project_root, entry.path()),
                "symlink skipped",
            ));
            continue;
        }
        if !file_type.is_file() {
            continue;
        }

        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                outcome.warnings.push(SyncWarning::for_file(
                    relative_slash_path(project_root, path),
                    format!("stat failed: {e}"),
                ));
                continue;
            }
        };

        let rel_path = relative_slash_path(project_root, path);
        if metadata.len() > MAX_FILE_SIZE {
            outcome.warnings.push(SyncWarning::for_file(
                rel_path,
                format!("file exceeds {MAX_FILE_SIZE} byte ceiling, skipped"),
            ));
            continue;
        }

        let mtime = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        outcome.files.push(FileDescriptor {
            abs_path: path.to_path_buf(),
            kind_hint: kind_hint(path),
            rel_path,
            mtime,
            size: metadata.len(),
        });
    }

    outcome
}

fn kind_hint(path: &Path) -> FileKindHint {
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    if file_name == "epic.md" {
        return FileKindHint::EpicDoc;
    }
    if file_name == "prd.md" {
        return FileKindHint::FeatureDoc;
    }

    let parent_name = path
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or("");
    if TASK_CONTAINER_DIRS.contains(&parent_name) {
        FileKindHint::Task
    } else {
        FileKindHint::Other
    }
}

/// Path relative to the project root, forward-slash separated.
pub fn relative_slash_path(project_root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(project_root).unwrap_or(path);
    let mut out = String::new();
    for component in rel.components() {
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(&component.as_os_str().to_string_lossy());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn scan_is_lexicographic_and_md_only() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "docs/plan/b/tasks/02-b.md", "x");
        write(root, "docs/plan/a/tasks/01-a.md", "x");
        write(root, "docs/plan/a/notes.txt", "not markdown");

        let outcome = scan(root, &root.join("docs/plan"));
        let paths: Vec<_> = outcome.files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["docs/plan/a/tasks/01-a.md", "docs/plan/b/tasks/02-b.md"]
        );
    }

    #[test]
    fn kind_hints_follow_path_shape() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "docs/plan/E01-x/epic.md", "e");
        write(root, "docs/plan/E01-x/E01-F01-y/prd.md", "p");
        write(root, "docs/plan/E01-x/E01-F01-y/tasks/01-t.md", "t");

        let outcome = scan(root, &root.join("docs/plan"));
        let hints: Vec<_> = outcome.files.iter().map(|f| f.kind_hint).collect();
        assert_eq!(
            hints,
            vec![FileKindHint::EpicDoc, FileKindHint::FeatureDoc, FileKindHint::Task]
        );
    }

    #[test]
    fn oversized_files_warn_and_skip() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let big = "x".repeat((MAX_FILE_SIZE + 1) as usize);
        write(root, "docs/plan/e/tasks/01-big.md", &big);

        let outcome = scan(root, &root.join("docs/plan"));
        assert!(outcome.files.is_empty());
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].message.contains("ceiling"));
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_rejected() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "docs/plan/e/tasks/01-real.md", "x");
        std::os::unix::fs::symlink(
            root.join("docs/plan/e/tasks/01-real.md"),
            root.join("docs/plan/e/tasks/02-link.md"),
        )
        .unwrap();

        let outcome = scan(root, &root.join("docs/plan"));
        assert_eq!(outcome.files.len(), 1);
        assert!(outcome
            .warnings
            .iter()
            .any(|w| w.message.contains("symlink")));
    }
}
