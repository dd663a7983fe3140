// Task store: the project -> task hierarchy
// Deletes discard the snapshot of every file identity in scope before removing directories

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;

use super::models::{parse_status, render_template, CreatedTask, TaskSummary, TASK_FILENAME};
use super::paths::{FileIdentity, Resolver, ARCHIVE_DIR};
use super::persistence::{atomic_write, temp_name};
use super::templates::{list_dir_names, EntryType, TemplateStore};
use crate::error::{Entity, IoResultExt, Result, StoreError};
use crate::snapshot::{discard_scope, IdentityLocks, SnapshotScope, SnapshotStore};

#[derive(Debug, Clone)]
pub struct TaskStore {
    paths: Resolver,
    templates: TemplateStore,
    snapshots: Arc<dyn SnapshotStore>,
    locks: Arc<IdentityLocks>,
}

impl TaskStore {
    pub fn new(
        paths: Resolver,
        templates: TemplateStore,
        snapshots: Arc<dyn SnapshotStore>,
        locks: Arc<IdentityLocks>,
    ) -> Self {
        Self {
            paths,
            templates,
            snapshots,
            locks,
        }
    }

    // --- projects ---

    pub fn list_projects(&self) -> Result<Vec<String>> {
        list_dir_names(&self.paths.projects_dir(), EntryType::Dir)
    }

    pub fn create_project(&self, name: &str) -> Result<PathBuf> {
        let dir = self.paths.project_dir(name)?;
        let parent = self.paths.projects_dir();
        fs::create_dir_all(&parent).at(&parent)?;

        match fs::create_dir(&dir) {
            Ok(()) => {
                tracing::debug!(project = name, "Created project");
                Ok(dir)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(StoreError::AlreadyExists(Entity::Project(name.to_string())))
            }
            Err(e) => Err(StoreError::io(dir, e)),
        }
    }

    /// Delete a project, its tasks, their files and any pending snapshots
    pub fn delete_project(&self, name: &str) -> Result<()> {
        let dir = self.existing_project(name)?;
        let mut live = Vec::new();
        for task in self.list_tasks(name)? {
            live.extend(self.file_identities(name, &task)?);
        }
        let discarded = discard_scope(
            self.snapshots.as_ref(),
            &self.locks,
            SnapshotScope::Project(name),
            live,
        )?;

        fs::remove_dir_all(&dir).at(&dir)?;
        tracing::info!(project = name, discarded, "Deleted project");
        Ok(())
    }

    // --- tasks ---

    pub fn list_tasks(&self, project: &str) -> Result<Vec<String>> {
        let dir = self.existing_project(project)?;
        let mut names = list_dir_names(&dir, EntryType::Dir)?;
        names.retain(|name| name != ARCHIVE_DIR);
        Ok(names)
    }

    /// Tasks with the status parsed from their `task.md` front matter
    pub fn list_task_summaries(&self, project: &str) -> Result<Vec<TaskSummary>> {
        let dir = self.existing_project(project)?;
        Ok(summarize(&dir, self.list_tasks(project)?))
    }

    pub fn list_tasks_by_status(&self, project: &str, status: &str) -> Result<Vec<TaskSummary>> {
        let mut tasks = self.list_task_summaries(project)?;
        tasks.retain(|t| t.status.as_deref() == Some(status));
        Ok(tasks)
    }

    /// Instantiate `template` (or the default) as a new task
    ///
    /// Files are copied into a hidden staging directory which is renamed into
    /// place once complete; on any failure the staging directory is removed
    /// and no task exists. With a `title`, template placeholders are rendered;
    /// without one, files are copied byte-for-byte.
    pub fn create_task(
        &self,
        project: &str,
        task: &str,
        template: Option<&str>,
        title: Option<&str>,
    ) -> Result<CreatedTask> {
        let template = template.unwrap_or(super::models::DEFAULT_TEMPLATE);
        let task_dir = self.paths.task_dir(project, task)?;
        let project_dir = self.existing_project(project)?;

        if task_dir.exists() {
            return Err(StoreError::AlreadyExists(Entity::task(project, task)));
        }
        let files = self.templates.get_template_files(template)?;

        // Unique per call, so a concurrent create never touches our staging dir
        let staging = project_dir.join(temp_name(task));
        fs::create_dir(&staging).at(&staging)?;

        let committed = write_files(&staging, &files, title).and_then(|()| {
            fs::rename(&staging, &task_dir).map_err(|e| {
                if task_dir.exists() {
                    StoreError::AlreadyExists(Entity::task(project, task))
                } else {
                    StoreError::io(&task_dir, e)
                }
            })
        });
        if let Err(e) = committed {
            if let Err(cleanup) = fs::remove_dir_all(&staging) {
                tracing::warn!(
                    staging = %staging.display(),
                    error = %cleanup,
                    "Failed to remove task staging directory"
                );
            }
            return Err(e);
        }

        tracing::debug!(project, task, template, files = files.len(), "Created task");
        Ok(CreatedTask {
            path: task_dir,
            files: files.into_keys().collect(),
        })
    }

    /// Delete a task, its files and any pending snapshots
    pub fn delete_task(&self, project: &str, task: &str) -> Result<()> {
        let dir = self.existing_task(project, task)?;
        let discarded = discard_scope(
            self.snapshots.as_ref(),
            &self.locks,
            SnapshotScope::Task { project, task },
            self.file_identities(project, task)?,
        )?;

        fs::remove_dir_all(&dir).at(&dir)?;
        tracing::info!(project, task, discarded, "Deleted task");
        Ok(())
    }

    // --- archive ---

    /// Move a task under `<project>/_archive/`
    ///
    /// Pending snapshots are discarded as for a delete; an unarchived task
    /// starts without any.
    pub fn archive_task(&self, project: &str, task: &str) -> Result<PathBuf> {
        let source = self.existing_task(project, task)?;
        let dest = self.paths.archived_task_dir(project, task)?;
        if dest.exists() {
            return Err(StoreError::AlreadyExists(Entity::archived_task(project, task)));
        }
        let archive = self.paths.archive_dir(project)?;
        fs::create_dir_all(&archive).at(&archive)?;

        let discarded = discard_scope(
            self.snapshots.as_ref(),
            &self.locks,
            SnapshotScope::Task { project, task },
            self.file_identities(project, task)?,
        )?;
        fs::rename(&source, &dest).at(&dest)?;

        tracing::info!(project, task, discarded, "Archived task");
        Ok(dest)
    }

    /// Move an archived task back into the project
    pub fn unarchive_task(&self, project: &str, task: &str) -> Result<PathBuf> {
        let dest = self.paths.task_dir(project, task)?;
        let source = self.paths.archived_task_dir(project, task)?;
        self.existing_project(project)?;
        if !source.is_dir() {
            return Err(StoreError::NotFound(Entity::archived_task(project, task)));
        }
        if dest.exists() {
            return Err(StoreError::AlreadyExists(Entity::task(project, task)));
        }

        fs::rename(&source, &dest).at(&dest)?;
        tracing::info!(project, task, "Unarchived task");
        Ok(dest)
    }

    /// Archived tasks with their status, sorted by name
    pub fn list_archived_tasks(&self, project: &str) -> Result<Vec<TaskSummary>> {
        self.existing_project(project)?;
        let archive = self.paths.archive_dir(project)?;
        let names = list_dir_names(&archive, EntryType::Dir)?;
        Ok(summarize(&archive, names))
    }

    pub(crate) fn existing_project(&self, project: &str) -> Result<PathBuf> {
        let dir = self.paths.project_dir(project)?;
        if !dir.is_dir() {
            return Err(StoreError::NotFound(Entity::Project(project.to_string())));
        }
        Ok(dir)
    }

    pub(crate) fn existing_task(&self, project: &str, task: &str) -> Result<PathBuf> {
        let dir = self.paths.task_dir(project, task)?;
        self.existing_project(project)?;
        if !dir.is_dir() {
            return Err(StoreError::NotFound(Entity::task(project, task)));
        }
        Ok(dir)
    }

    fn file_identities(&self, project: &str, task: &str) -> Result<Vec<FileIdentity>> {
        let dir = self.paths.task_dir(project, task)?;
        list_dir_names(&dir, EntryType::File)?
            .iter()
            .map(|filename| FileIdentity::new(project, task, filename))
            .collect()
    }
}

fn write_files(
    dir: &Path,
    files: &BTreeMap<String, Vec<u8>>,
    title: Option<&str>,
) -> Result<()> {
    let now = Local::now();
    for (filename, content) in files {
        let path = dir.join(filename);
        match title {
            Some(title) => {
                let text = std::str::from_utf8(content)
                    .map_err(|e| StoreError::io(&path, io::Error::new(io::ErrorKind::InvalidData, e)))?;
                let rendered = render_template(text, title, now);
                atomic_write(&path, rendered.as_bytes()).at(&path)?;
            }
            None => atomic_write(&path, content).at(&path)?,
        }
    }
    Ok(())
}

fn summarize(dir: &Path, names: Vec<String>) -> Vec<TaskSummary> {
    names
        .into_iter()
        .map(|name| {
            let status = read_status(&dir.join(&name));
            TaskSummary { name, status }
        })
        .collect()
}

fn read_status(task_dir: &Path) -> Option<String> {
    fs::read_to_string(task_dir.join(TASK_FILENAME))
        .ok()
        .and_then(|content| parse_status(&content))
}
