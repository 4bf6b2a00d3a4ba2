//! Pattern registry validation errors.
//!
//! Any of these aborts the sync before a single file is scanned.

/// Maximum regex source length accepted by the registry.
pub const MAX_PATTERN_LENGTH: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    #[error("Pattern '{name}' failed to compile: {message} (regex: {pattern})")]
    Compile {
        name: String,
        pattern: String,
        message: String,
    },

    #[error("Pattern '{name}' is {len} characters, maximum is {MAX_PATTERN_LENGTH} (regex: {pattern})")]
    TooLong {
        name: String,
        pattern: String,
        len: usize,
    },

    #[error("Pattern '{name}' contains a catastrophic construct '{construct}' (regex: {pattern})")]
    CatastrophicConstruct {
        name: String,
        pattern: String,
        construct: String,
    },

    #[error("Pattern '{name}' for {kind} files is missing a required capture group; expected {expected} (regex: {pattern})")]
    MissingCaptureGroup {
        name: String,
        pattern: String,
        kind: String,
        expected: String,
    },
}
