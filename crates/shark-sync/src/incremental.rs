//! Incremental filter — reduce the scanned set to files that must be
//! re-parsed, based on the watermark and a symmetric clock-skew buffer.

use chrono::{DateTime, Duration, Utc};
use shark_core::types::report::SyncWarning;
use shark_core::FxHashSet;

use crate::scanner::FileDescriptor;

/// Tolerance applied symmetrically around the watermark, and added to
/// "now" when detecting future mtimes.
pub const CLOCK_SKEW_BUFFER_SECS: i64 = 60;

/// Filter output.
#[derive(Debug, Default)]
pub struct FilterOutcome {
    /// Files that must be re-parsed, in scan order.
    pub kept: Vec<FileDescriptor>,
    /// Count of files excluded as unchanged.
    pub skipped: usize,
    pub warnings: Vec<SyncWarning>,
}

/// Reduce `descriptors` to the set needing re-parse.
///
/// A descriptor is kept when any of: its path is unknown to the database,
/// the project has never synced, or its mtime exceeds
/// `watermark - CLOCK_SKEW_BUFFER`. `force_full` keeps everything.
pub fn filter_changed(
    descriptors: Vec<FileDescriptor>,
    known_paths: &FxHashSet<String>,
    watermark: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    force_full: bool,
) -> FilterOutcome {
    let buffer = Duration::seconds(CLOCK_SKEW_BUFFER_SECS);
    let mut outcome = FilterOutcome::default();

    for descriptor in descriptors {
        if descriptor.mtime > now + buffer {
            outcome.warnings.push(SyncWarning::for_file(
                descriptor.rel_path.clone(),
                "file mtime in the future — possible clock skew",
            ));
            outcome.kept.push(descriptor);
            continue;
        }

        if force_full {
            outcome.kept.push(descriptor);
            continue;
        }

        let is_new = !known_paths.contains(&descriptor.rel_path);
        let changed = match watermark {
            None => true,
            Some(mark) => descriptor.mtime > mark - buffer,
        };

        if is_new || changed {
            outcome.kept.push(descriptor);
        } else {
            outcome.skipped += 1;
        }
    }

    outcome
}
