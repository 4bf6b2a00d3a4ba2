//! Filename pattern matching: registry, validation, and generation formats.

pub mod generation;
pub mod registry;
pub mod validate;

use shark_core::FxHashMap;

/// Entity kind a pattern recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternKind {
    Epic,
    Feature,
    Task,
}

impl PatternKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Epic => "epic",
            Self::Feature => "feature",
            Self::Task => "task",
        }
    }
}

/// Whether a pattern matches directory names or file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternSlot {
    Folder,
    File,
}

impl PatternSlot {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Folder => "folder",
            Self::File => "file",
        }
    }
}

/// A successful classification: the winning pattern and its named captures.
#[derive(Debug, Clone)]
pub struct PatternMatch {
    pub pattern_name: String,
    pub captures: FxHashMap<String, String>,
}

impl PatternMatch {
    pub fn capture(&self, name: &str) -> Option<&str> {
        self.captures.get(name).map(String::as_str)
    }

    /// A numeric capture, e.g. `epic_num` from `E04`.
    pub fn capture_num(&self, name: &str) -> Option<i64> {
        self.capture(name).and_then(|v| v.parse().ok())
    }
}
