//! Task, template and search models

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Template used when task creation names none
pub const DEFAULT_TEMPLATE: &str = "default";

/// Main task file; its front matter carries the task status
pub const TASK_FILENAME: &str = "task.md";

/// Placeholders substituted when a task is created with a title
pub const TEMPLATE_VARIABLES: [(&str, &str); 3] = [
    ("title", "Task title"),
    ("created_at", "Creation time (ISO 8601)"),
    ("updated_at", "Update time (ISO 8601)"),
];

pub const DEFAULT_TEMPLATE_CONTENT: &str = "\
---
status: todo
created: {{created_at}}
updated: {{updated_at}}
---

# {{title}}

## Summary


## Tasks

- [ ]

## Notes

";

/// Maximum matching lines reported per search hit
pub const MAX_MATCHED_LINES: usize = 5;

/// Substitute `{{title}}`, `{{created_at}}` and `{{updated_at}}`
pub fn render_template(content: &str, title: &str, now: DateTime<Local>) -> String {
    let timestamp = now.format("%Y-%m-%dT%H:%M:%S").to_string();
    content
        .replace("{{title}}", title)
        .replace("{{created_at}}", &timestamp)
        .replace("{{updated_at}}", &timestamp)
}

/// Read `status:` from a `---` delimited front matter block
pub fn parse_status(content: &str) -> Option<String> {
    let mut lines = content.lines();
    if lines.next()?.trim() != "---" {
        return None;
    }
    for line in lines {
        let line = line.trim();
        if line == "---" {
            break;
        }
        if let Some(value) = line.strip_prefix("status:") {
            return Some(value.trim().to_string());
        }
    }
    None
}

/// Human-readable byte size (B / KB / MB)
pub fn format_size(total_bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    if total_bytes < KB {
        format!("{} B", total_bytes)
    } else if total_bytes < MB {
        format!("{:.1} KB", total_bytes as f64 / KB as f64)
    } else {
        format!("{:.1} MB", total_bytes as f64 / MB as f64)
    }
}

/// A task as listed within a project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub name: String,
    /// Front matter status of `task.md`, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Result of instantiating a template into a new task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedTask {
    pub path: std::path::PathBuf,
    pub files: Vec<String>,
}

/// Result of overwriting a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatedFile {
    pub path: std::path::PathBuf,
    /// Location of the preserved pre-update content, for stores that have one
    pub snapshot_path: Option<std::path::PathBuf>,
}

/// One file whose content matched a search query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub project: String,
    pub task: String,
    pub file: String,
    pub matched_lines: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_render_template() {
        let now = Local.with_ymd_and_hms(2026, 2, 9, 10, 30, 0).unwrap();
        let rendered = render_template(DEFAULT_TEMPLATE_CONTENT, "Fix login bug", now);

        assert!(rendered.contains("# Fix login bug\n"));
        assert!(rendered.contains("created: 2026-02-09T10:30:00\n"));
        assert!(rendered.contains("updated: 2026-02-09T10:30:00\n"));
        assert!(!rendered.contains("{{"));
        for (name, _) in TEMPLATE_VARIABLES {
            assert!(DEFAULT_TEMPLATE_CONTENT.contains(&format!("{{{{{}}}}}", name)));
        }
    }

    #[test]
    fn test_parse_status() {
        assert_eq!(
            parse_status(DEFAULT_TEMPLATE_CONTENT),
            Some("todo".to_string())
        );
        assert_eq!(
            parse_status("---\ntitle: x\nstatus:  in_progress \n---\n"),
            Some("in_progress".to_string())
        );
        // status after the closing fence is body text, not front matter
        assert_eq!(parse_status("---\ntitle: x\n---\nstatus: done\n"), None);
        assert_eq!(parse_status("# No front matter\nstatus: done\n"), None);
        assert_eq!(parse_status(""), None);
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }
}
