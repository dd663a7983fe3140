//! Path resolution for the taskmark base directory
//!
//! All methods are pure computations with no I/O. Layout:
//! `<root>/templates/<template>/<file>`, `<root>/projects/<project>/<task>/<file>`,
//! `<root>/.tmp/` for preserved snapshots.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

pub const TEMPLATES_DIR: &str = "templates";
pub const PROJECTS_DIR: &str = "projects";
pub const SNAPSHOTS_DIR: &str = ".tmp";
pub const RULES_FILENAME: &str = "RULES.md";
/// Per-project directory holding archived tasks; never a task name itself
pub const ARCHIVE_DIR: &str = "_archive";

/// Check that `raw` is usable as a single path segment
///
/// Rejects empty names, `.`/`..`, separators, NUL, and names starting with `.`
/// (those are reserved for staging and temp files).
pub fn validate_segment<'a>(kind: &'static str, raw: &'a str) -> Result<&'a str> {
    let invalid = |reason| StoreError::InvalidIdentifier {
        kind,
        value: raw.to_string(),
        reason,
    };

    if raw.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if raw == "." || raw == ".." {
        return Err(invalid("must not be '.' or '..'"));
    }
    if raw.contains('/') || raw.contains('\\') {
        return Err(invalid("must not contain path separators"));
    }
    if raw.contains('\0') {
        return Err(invalid("must not contain NUL"));
    }
    if raw.starts_with('.') {
        return Err(invalid("must not start with '.'"));
    }
    if raw.trim() != raw {
        return Err(invalid("must not have leading or trailing whitespace"));
    }
    Ok(raw)
}

/// [`validate_segment`] for task names, which also may not shadow the archive
pub fn validate_task(raw: &str) -> Result<&str> {
    let task = validate_segment("task", raw)?;
    if task == ARCHIVE_DIR {
        return Err(StoreError::InvalidIdentifier {
            kind: "task",
            value: raw.to_string(),
            reason: "reserved for archived tasks",
        });
    }
    Ok(task)
}

/// Logical identity of one task file: `(project, task, filename)`
///
/// Construction validates every segment, so a `FileIdentity` always maps to a
/// location inside the base directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileIdentity {
    project: String,
    task: String,
    filename: String,
}

impl FileIdentity {
    pub fn new(project: &str, task: &str, filename: &str) -> Result<Self> {
        Ok(Self {
            project: validate_segment("project", project)?.to_string(),
            task: validate_task(task)?.to_string(),
            filename: validate_segment("filename", filename)?.to_string(),
        })
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Canonical relative key `<project>/<task>/<filename>`
    pub fn relative_path(&self) -> PathBuf {
        Path::new(&self.project)
            .join(&self.task)
            .join(&self.filename)
    }

    /// Whether this identity lives under `project` (and `task`, if given)
    pub fn is_within(&self, project: &str, task: Option<&str>) -> bool {
        self.project == project && task.map_or(true, |t| self.task == t)
    }
}

impl fmt::Display for FileIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.project, self.task, self.filename)
    }
}

/// Maps logical names to locations under a fixed base root
#[derive(Debug, Clone)]
pub struct Resolver {
    root: PathBuf,
}

impl Resolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn templates_dir(&self) -> PathBuf {
        self.root.join(TEMPLATES_DIR)
    }

    pub fn projects_dir(&self) -> PathBuf {
        self.root.join(PROJECTS_DIR)
    }

    pub fn snapshots_dir(&self) -> PathBuf {
        self.root.join(SNAPSHOTS_DIR)
    }

    pub fn global_rules_file(&self) -> PathBuf {
        self.root.join(RULES_FILENAME)
    }

    pub fn template_dir(&self, template: &str) -> Result<PathBuf> {
        let template = validate_segment("template", template)?;
        self.contained(self.templates_dir().join(template))
    }

    pub fn template_file(&self, template: &str, filename: &str) -> Result<PathBuf> {
        let filename = validate_segment("filename", filename)?;
        self.contained(self.template_dir(template)?.join(filename))
    }

    pub fn project_dir(&self, project: &str) -> Result<PathBuf> {
        let project = validate_segment("project", project)?;
        self.contained(self.projects_dir().join(project))
    }

    pub fn task_dir(&self, project: &str, task: &str) -> Result<PathBuf> {
        let task = validate_task(task)?;
        self.contained(self.project_dir(project)?.join(task))
    }

    pub fn archive_dir(&self, project: &str) -> Result<PathBuf> {
        Ok(self.project_dir(project)?.join(ARCHIVE_DIR))
    }

    pub fn archived_task_dir(&self, project: &str, task: &str) -> Result<PathBuf> {
        let task = validate_task(task)?;
        self.contained(self.archive_dir(project)?.join(task))
    }

    pub fn file_path(&self, identity: &FileIdentity) -> PathBuf {
        self.projects_dir().join(identity.relative_path())
    }

    /// Resolve an optional `(project, task, filename)` triple
    ///
    /// A task requires a project and a filename requires a task. With nothing
    /// given this is the projects area itself.
    pub fn resolve(
        &self,
        project: Option<&str>,
        task: Option<&str>,
        filename: Option<&str>,
    ) -> Result<PathBuf> {
        match (project, task, filename) {
            (None, None, None) => Ok(self.projects_dir()),
            (Some(p), None, None) => self.project_dir(p),
            (Some(p), Some(t), None) => self.task_dir(p, t),
            (Some(p), Some(t), Some(f)) => Ok(self.file_path(&FileIdentity::new(p, t, f)?)),
            (None, Some(t), _) => Err(StoreError::InvalidIdentifier {
                kind: "task",
                value: t.to_string(),
                reason: "a task requires a project",
            }),
            (_, None, Some(f)) => Err(StoreError::InvalidIdentifier {
                kind: "filename",
                value: f.to_string(),
                reason: "a file requires a project and a task",
            }),
        }
    }

    /// Lexical guard that a joined path never leaves the root
    fn contained(&self, path: PathBuf) -> Result<PathBuf> {
        let escapes = path
            .strip_prefix(&self.root)
            .map(|rel| {
                rel.components()
                    .any(|c| !matches!(c, Component::Normal(_)))
            })
            .unwrap_or(true);
        if escapes {
            return Err(StoreError::InvalidIdentifier {
                kind: "path",
                value: path.display().to_string(),
                reason: "resolves outside the base directory",
            });
        }
        Ok(path)
    }
}
