//! YAML frontmatter parsing and task-key write-back.
//!
//! A task file is optional leading YAML frontmatter (between `---` lines)
//! followed by a Markdown body. Recognized fields are lifted into
//! `TaskMetadata`; everything else is preserved verbatim. Invalid YAML
//! degrades to the filename/body fallback chain — a file is never skipped
//! for a parse error.

use std::io::Write;
use std::path::Path;

use shark_core::types::metadata::{TaskMetadata, DEFAULT_PRIORITY};
use shark_core::types::report::SyncWarning;
use shark_core::types::status::TaskStatus;

use crate::patterns::PatternMatch;
use crate::scanner::FileDescriptor;

/// Maximum description length taken from the body.
pub const MAX_DESCRIPTION_LEN: usize = 500;

/// Title used when every extraction fallback comes up empty.
pub const UNTITLED: &str = "Untitled Task";

/// Parser output for one task file.
#[derive(Debug)]
pub struct ParsedTaskFile {
    pub metadata: TaskMetadata,
    pub warnings: Vec<SyncWarning>,
}

/// Parse a task file's content into structured metadata.
///
/// Title fallback order: frontmatter, filename slug from the matched
/// pattern, first H1 heading, `Untitled Task`. Description fallback:
/// frontmatter, first paragraph after the first H1.
pub fn parse_task_file(
    content: &str,
    descriptor: &FileDescriptor,
    pattern_match: Option<&PatternMatch>,
) -> ParsedTaskFile {
    let mut warnings = Vec::new();
    let mut metadata = TaskMetadata::new();
    metadata.modified_at = Some(descriptor.mtime);

    let (frontmatter, body) = split_frontmatter(content);

    if let Some(raw) = frontmatter {
        match serde_yaml::from_str::<serde_yaml::Mapping>(raw) {
            Ok(mapping) => lift_fields(mapping, &mut metadata, descriptor, &mut warnings),
            Err(e) => warnings.push(SyncWarning::for_file(
                descriptor.rel_path.clone(),
                format!("invalid YAML frontmatter: {e}"),
            )),
        }
    }

    if metadata.title.trim().is_empty() {
        metadata.title = fallback_title(body, descriptor, pattern_match, &mut warnings);
    }
    if metadata.description.is_empty() {
        metadata.description = first_paragraph(body);
    }

    ParsedTaskFile { metadata, warnings }
}

/// Split content into `(frontmatter, body)`. The frontmatter is the text
/// between a leading `---` line and the next `---` line; an unterminated
/// block is treated as body.
pub fn split_frontmatter(content: &str) -> (Option<&str>, &str) {
    let mut lines = content.split_inclusive('\n');
    let Some(first) = lines.next() else {
        return (None, content);
    };
    if first.trim_end() != "---" {
        return (None, content);
    }

    let mut offset = first.len();
    for line in lines {
        if line.trim_end() == "---" {
            let frontmatter = &content[first.len()..offset];
            let body = &content[offset + line.len()..];
            return (Some(frontmatter), body);
        }
        offset += line.len();
    }
    (None, content)
}

fn lift_fields(
    mapping: serde_yaml::Mapping,
    metadata: &mut TaskMetadata,
    descriptor: &FileDescriptor,
    warnings: &mut Vec<SyncWarning>,
) {
    for (key, value) in mapping {
        let Some(key_str) = key.as_str().map(str::to_string) else {
            metadata.extra.insert(key, value);
            continue;
        };

        match key_str.as_str() {
            "task_key" => metadata.task_key = scalar_string(&value).filter(|s| !s.is_empty()),
            "title" => {
                metadata.title = scalar_string(&value).unwrap_or_default();
            }
            "description" => {
                metadata.description = scalar_string(&value).unwrap_or_default();
            }
            "status" => {
                let raw = scalar_string(&value).unwrap_or_default();
                match TaskStatus::parse(&raw) {
                    Some(status) => metadata.status = status,
                    None => warnings.push(SyncWarning::for_file(
                        descriptor.rel_path.clone(),
                        format!("unknown status '{raw}', defaulting to todo"),
                    )),
                }
            }
            "agent_type" => metadata.agent_type = scalar_string(&value),
            "priority" => match value.as_i64() {
                Some(p) => metadata.priority = p,
                None => {
                    warnings.push(SyncWarning::for_file(
                        descriptor.rel_path.clone(),
                        format!("priority must be an integer, defaulting to {DEFAULT_PRIORITY}"),
                    ));
                }
            },
            "assigned_agent" => metadata.assigned_agent = scalar_string(&value),
            "blocked_reason" => metadata.blocked_reason = scalar_string(&value),
            "depends_on" => match value.as_sequence() {
                Some(seq) => {
                    metadata.depends_on = seq
                        .iter()
                        .filter_map(scalar_string)
                        .collect();
                }
                None => warnings.push(SyncWarning::for_file(
                    descriptor.rel_path.clone(),
                    "depends_on must be a list of task keys",
                )),
            },
            _ => {
                metadata.extra.insert(key, value);
            }
        }
    }
}

fn scalar_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.trim().to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn fallback_title(
    body: &str,
    descriptor: &FileDescriptor,
    pattern_match: Option<&PatternMatch>,
    warnings: &mut Vec<SyncWarning>,
) -> String {
    // Descriptive tail captured by the matching pattern.
    if let Some(m) = pattern_match {
        for group in ["task_slug", "slug", "feature_slug", "epic_slug"] {
            if let Some(slug) = m.capture(group).filter(|s| !s.is_empty()) {
                return title_case(slug);
            }
        }
    }

    if let Some(h1) = first_h1(body) {
        let stripped = strip_title_prefix(&h1);
        if !stripped.is_empty() {
            return stripped;
        }
    }

    warnings.push(SyncWarning::for_file(
        descriptor.rel_path.clone(),
        format!("no title found, using '{UNTITLED}'"),
    ));
    UNTITLED.to_string()
}

fn first_h1(body: &str) -> Option<String> {
    body.lines()
        .map(str::trim_end)
        .find_map(|line| line.strip_prefix("# ").map(|rest| rest.trim().to_string()))
}

/// Strip a leading `Task:`, `PRP:`, `TODO:`, or `WIP:` marker, case-insensitive.
fn strip_title_prefix(title: &str) -> String {
    let lower = title.to_lowercase();
    for prefix in ["task:", "prp:", "todo:", "wip:"] {
        if lower.starts_with(prefix) {
            return title[prefix.len()..].trim().to_string();
        }
    }
    title.trim().to_string()
}

/// First paragraph after the first H1 (or from the top when there is no
/// H1), bounded at a blank line or the next heading, truncated to
/// `MAX_DESCRIPTION_LEN` characters.
fn first_paragraph(body: &str) -> String {
    let has_h1 = body.lines().any(|line| line.trim_end().starts_with("# "));

    let mut collected: Vec<&str> = Vec::new();
    let mut past_h1 = !has_h1;
    let mut started = false;
    for line in body.lines().map(str::trim_end) {
        if !past_h1 {
            if line.starts_with("# ") {
                past_h1 = true;
            }
            continue;
        }
        if !started {
            if line.trim().is_empty() {
                continue;
            }
            if line.starts_with('#') {
                // A heading before any prose: there is no paragraph.
                break;
            }
            started = true;
            collected.push(line.trim());
            continue;
        }
        if line.trim().is_empty() || line.starts_with('#') {
            break;
        }
        collected.push(line.trim());
    }

    truncate_chars(&collected.join(" "), MAX_DESCRIPTION_LEN)
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

/// `setup-cli` → `Setup Cli`.
pub fn title_case(slug: &str) -> String {
    slug.split(['-', '_', ' '])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Return `content` with `task_key` present in the frontmatter, creating
/// the block when the file has none. Everything else is preserved byte
/// for byte.
pub fn inject_task_key(content: &str, task_key: &str) -> String {
    let (frontmatter, _) = split_frontmatter(content);

    match frontmatter {
        Some(raw) => {
            let has_key = raw
                .lines()
                .any(|line| line.trim_start().starts_with("task_key:"));
            let mut out = String::with_capacity(content.len() + task_key.len() + 16);
            if has_key {
                // Replace the existing line in place. Only the leading
                // frontmatter block is rewritten; `---` rules in the body
                // are left alone.
                let mut delimiters_seen = 0;
                for line in content.split_inclusive('\n') {
                    if delimiters_seen < 2 && line.trim_end() == "---" {
                        delimiters_seen += 1;
                        out.push_str(line);
                        continue;
                    }
                    if delimiters_seen == 1 && line.trim_start().starts_with("task_key:") {
                        out.push_str(&format!("task_key: {task_key}\n"));
                    } else {
                        out.push_str(line);
                    }
                }
            } else {
                // Insert directly after the opening delimiter.
                let mut inserted = false;
                for line in content.split_inclusive('\n') {
                    out.push_str(line);
                    if !inserted && line.trim_end() == "---" {
                        out.push_str(&format!("task_key: {task_key}\n"));
                        inserted = true;
                    }
                }
            }
            out
        }
        None => format!("---\ntask_key: {task_key}\n---\n\n{content}"),
    }
}

/// Atomically rewrite `path` with `content`: sibling temp file, fsync,
/// rename over the target, preserving mode bits. The temp file is removed
/// on any failure.
pub fn atomic_write(path: &Path, content: &str) -> std::io::Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("task.md");
    let tmp = path.with_file_name(format!(".{file_name}.{}.tmp", std::process::id()));
    let permissions = std::fs::metadata(path).ok().map(|m| m.permissions());

    let result = (|| {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        drop(file);
        if let Some(perms) = permissions {
            std::fs::set_permissions(&tmp, perms)?;
        }
        std::fs::rename(&tmp, path)
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}
