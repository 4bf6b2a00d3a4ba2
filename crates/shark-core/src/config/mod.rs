//! Project configuration model (`.sharkconfig.json`).

pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use store::ConfigStore;

/// Default documentation root, relative to the project root.
pub const DEFAULT_DOCS_ROOT: &str = "docs/plan";

/// Storage driver selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `local` or a cloud replica identifier.
    pub backend: String,
    /// Driver-specific connection string. For `local` this is the
    /// database file path, relative to the project root.
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: "local".to_string(),
            url: ".shark/shark.db".to_string(),
        }
    }
}

/// One configured matching pattern.
///
/// The config accepts either a bare regex string or a detailed object
/// with a name, an enabled flag, and a description.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum PatternEntry {
    Plain(String),
    Detailed {
        name: String,
        pattern: String,
        #[serde(default = "default_true")]
        enabled: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
}

fn default_true() -> bool {
    true
}

impl PatternEntry {
    pub fn pattern(&self) -> &str {
        match self {
            Self::Plain(p) => p,
            Self::Detailed { pattern, .. } => pattern,
        }
    }

    pub fn enabled(&self) -> bool {
        match self {
            Self::Plain(_) => true,
            Self::Detailed { enabled, .. } => *enabled,
        }
    }
}

/// Patterns for one entity kind: folder alternatives, file alternatives,
/// and the generation template for producing new filenames.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct KindPatternConfig {
    pub folder: Vec<PatternEntry>,
    pub file: Vec<PatternEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PatternsConfig {
    pub epic: KindPatternConfig,
    pub feature: KindPatternConfig,
    pub task: KindPatternConfig,
}

/// The per-project configuration object.
///
/// Every field has a default so a missing or malformed config file never
/// blocks a sync. Unknown top-level keys round-trip through `extra`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SharkConfig {
    pub docs_root: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_epic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_agent: Option<String>,
    pub color_enabled: bool,
    pub json_output: bool,
    pub database: DatabaseConfig,
    pub patterns: PatternsConfig,
    /// Watermark: start time of the most recent successfully committed
    /// sync, RFC 3339. Absent means "never synced".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Unrecognized top-level keys, preserved on save.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for SharkConfig {
    fn default() -> Self {
        Self {
            docs_root: DEFAULT_DOCS_ROOT.to_string(),
            default_epic: None,
            default_agent: None,
            color_enabled: true,
            json_output: false,
            database: DatabaseConfig::default(),
            patterns: PatternsConfig::default(),
            last_sync_time: None,
            extra: serde_json::Map::new(),
        }
    }
}
