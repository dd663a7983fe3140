// File accessor: content operations on files inside a task
// Update and delete preserve the current content first; create never does
// A failed mutation puts the earlier snapshot back, so errors leave no trace

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use super::models::UpdatedFile;
use super::paths::{FileIdentity, Resolver};
use super::persistence::atomic_write;
use super::templates::{list_dir_names, EntryType};
use crate::error::{Entity, IoResultExt, Result, StoreError};
use crate::snapshot::{self, IdentityLocks, SnapshotStore};

#[derive(Debug, Clone)]
pub struct FileAccessor {
    paths: Resolver,
    snapshots: Arc<dyn SnapshotStore>,
    locks: Arc<IdentityLocks>,
}

impl FileAccessor {
    pub fn new(paths: Resolver, snapshots: Arc<dyn SnapshotStore>, locks: Arc<IdentityLocks>) -> Self {
        Self {
            paths,
            snapshots,
            locks,
        }
    }

    /// Visible files in a task, sorted
    pub fn list_files(&self, project: &str, task: &str) -> Result<Vec<String>> {
        let dir = self.existing_task(project, task)?;
        list_dir_names(&dir, EntryType::File)
    }

    pub fn get_file(&self, project: &str, task: &str, filename: &str) -> Result<String> {
        let identity = FileIdentity::new(project, task, filename)?;
        self.existing_task(project, task)?;
        self.read_current(&identity)?
            .ok_or(StoreError::NotFound(Entity::File(identity)))
    }

    /// Create a new file; fails if it already exists
    pub fn create_file(
        &self,
        project: &str,
        task: &str,
        filename: &str,
        content: &str,
    ) -> Result<PathBuf> {
        let identity = FileIdentity::new(project, task, filename)?;
        self.existing_task(project, task)?;
        let path = self.paths.file_path(&identity);

        self.locks.with_lock(&identity, || {
            if path.exists() {
                return Err(StoreError::AlreadyExists(Entity::File(identity.clone())));
            }
            atomic_write(&path, content.as_bytes()).at(&path)
        })?;

        tracing::debug!(%identity, bytes = content.len(), "Created file");
        Ok(path)
    }

    /// Overwrite an existing file, preserving its previous content
    pub fn update_file(
        &self,
        project: &str,
        task: &str,
        filename: &str,
        content: &str,
    ) -> Result<UpdatedFile> {
        let identity = FileIdentity::new(project, task, filename)?;
        self.existing_task(project, task)?;
        let path = self.paths.file_path(&identity);

        self.locks.with_lock(&identity, || {
            let previous = self
                .read_current(&identity)?
                .ok_or_else(|| StoreError::NotFound(Entity::File(identity.clone())))?;
            self.preserve_then(&identity, &previous, || {
                atomic_write(&path, content.as_bytes()).at(&path)
            })
        })?;

        tracing::debug!(%identity, bytes = content.len(), "Updated file");
        Ok(UpdatedFile {
            snapshot_path: self.snapshots.location(&identity),
            path,
        })
    }

    /// Remove a file, preserving its content so the delete can be reverted
    pub fn delete_file(&self, project: &str, task: &str, filename: &str) -> Result<()> {
        let identity = FileIdentity::new(project, task, filename)?;
        self.existing_task(project, task)?;
        let path = self.paths.file_path(&identity);

        self.locks.with_lock(&identity, || {
            let previous = self
                .read_current(&identity)?
                .ok_or_else(|| StoreError::NotFound(Entity::File(identity.clone())))?;
            self.preserve_then(&identity, &previous, || fs::remove_file(&path).at(&path))
        })?;

        tracing::debug!(%identity, "Deleted file");
        Ok(())
    }

    /// Restore the preserved content and consume the snapshot
    ///
    /// Works after a delete too: the file is recreated as long as its task
    /// still exists.
    pub fn revert_file(&self, project: &str, task: &str, filename: &str) -> Result<String> {
        let identity = FileIdentity::new(project, task, filename)?;
        let path = self.paths.file_path(&identity);

        self.locks.with_lock(&identity, || {
            snapshot::revert(self.snapshots.as_ref(), &identity, |content| {
                self.existing_task(project, task)?;
                atomic_write(&path, content.as_bytes()).at(&path)
            })
        })
    }

    /// Create or update, preserving only when a previous version existed
    pub(crate) fn upsert_file(
        &self,
        project: &str,
        task: &str,
        filename: &str,
        content: &str,
    ) -> Result<PathBuf> {
        let identity = FileIdentity::new(project, task, filename)?;
        self.existing_task(project, task)?;
        let path = self.paths.file_path(&identity);

        self.locks.with_lock(&identity, || {
            let write = || atomic_write(&path, content.as_bytes()).at(&path);
            match self.read_current(&identity)? {
                Some(previous) => self.preserve_then(&identity, &previous, write),
                None => write(),
            }
        })?;
        Ok(path)
    }

    /// Preserve `previous`, then run `mutate`; undo the preserve if it fails
    ///
    /// Caller must hold the identity lock.
    fn preserve_then(
        &self,
        identity: &FileIdentity,
        previous: &str,
        mutate: impl FnOnce() -> Result<()>,
    ) -> Result<()> {
        let earlier = self.snapshots.load(identity)?;
        self.snapshots.preserve(identity, previous)?;

        let Err(err) = mutate() else {
            return Ok(());
        };
        let restored = match &earlier {
            Some(content) => self.snapshots.preserve(identity, content),
            None => self.snapshots.discard(identity).map(|_| ()),
        };
        if let Err(e) = restored {
            tracing::warn!(%identity, error = %e, "Failed to roll back snapshot after failed write");
        }
        Err(err)
    }

    fn read_current(&self, identity: &FileIdentity) -> Result<Option<String>> {
        let path = self.paths.file_path(identity);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    fn existing_task(&self, project: &str, task: &str) -> Result<PathBuf> {
        let project_dir = self.paths.project_dir(project)?;
        let task_dir = self.paths.task_dir(project, task)?;
        if !project_dir.is_dir() {
            return Err(StoreError::NotFound(Entity::Project(project.to_string())));
        }
        if !task_dir.is_dir() {
            return Err(StoreError::NotFound(Entity::task(project, task)));
        }
        Ok(task_dir)
    }
}
