// Layered RULES.md: global, per project and per task
// Task rules are an ordinary task file, so writes to them are snapshotted like any update

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::files::FileAccessor;
use super::paths::{Resolver, RULES_FILENAME};
use super::persistence::atomic_write;
use crate::error::{Entity, IoResultExt, Result, StoreError};

#[derive(Debug, Clone)]
pub struct RulesStore {
    paths: Resolver,
    files: FileAccessor,
}

impl RulesStore {
    pub fn new(paths: Resolver, files: FileAccessor) -> Self {
        Self { paths, files }
    }

    /// Combined rules for a location, global first
    ///
    /// Levels whose file is missing or blank are skipped; with no rules at
    /// all the result is empty.
    pub fn get_rules(&self, project: Option<&str>, task: Option<&str>) -> Result<String> {
        let levels = self.levels(project, task)?;

        let mut sections = Vec::new();
        for (header, path) in levels {
            if let Some(content) = read_trimmed(&path)? {
                sections.push(format!("=== {} ===\n{}", header, content));
            }
        }
        Ok(sections.join("\n\n"))
    }

    /// Write the rules for exactly one level
    ///
    /// No project means global rules; a project alone means project rules; a
    /// project and task means task rules. A task without a project is
    /// rejected.
    pub fn set_rules(&self, content: &str, project: Option<&str>, task: Option<&str>) -> Result<PathBuf> {
        let path = match (project, task) {
            (Some(project), Some(task)) => {
                return self.files.upsert_file(project, task, RULES_FILENAME, content);
            }
            (Some(project), None) => {
                let dir = self.paths.project_dir(project)?;
                if !dir.is_dir() {
                    return Err(StoreError::NotFound(Entity::Project(project.to_string())));
                }
                dir.join(RULES_FILENAME)
            }
            (None, Some(task)) => return Err(task_without_project(task)),
            (None, None) => {
                let root = self.paths.root();
                fs::create_dir_all(root).at(root)?;
                self.paths.global_rules_file()
            }
        };

        atomic_write(&path, content.as_bytes()).at(&path)?;
        tracing::debug!(path = %path.display(), "Wrote rules");
        Ok(path)
    }

    fn levels(&self, project: Option<&str>, task: Option<&str>) -> Result<Vec<(String, PathBuf)>> {
        let mut levels = vec![("Global rules".to_string(), self.paths.global_rules_file())];
        match (project, task) {
            (None, None) => {}
            (None, Some(task)) => return Err(task_without_project(task)),
            (Some(project), task) => {
                levels.push((
                    format!("Project rules ({})", project),
                    self.paths.project_dir(project)?.join(RULES_FILENAME),
                ));
                if let Some(task) = task {
                    levels.push((
                        "Task rules".to_string(),
                        self.paths.task_dir(project, task)?.join(RULES_FILENAME),
                    ));
                }
            }
        }
        Ok(levels)
    }
}

fn task_without_project(task: &str) -> StoreError {
    StoreError::InvalidIdentifier {
        kind: "task",
        value: task.to_string(),
        reason: "a task requires a project",
    }
}

fn read_trimmed(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => {
            let content = content.trim();
            Ok((!content.is_empty()).then(|| content.to_string()))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::io(path, e)),
    }
}
