//! Disk snapshot store: paths, atomic writes, enumeration, clearing
//!
//! Snapshots live under `<root>/.tmp/<project>/<task>/<filename>` holding the
//! raw pre-update content. The layout mirrors the identity 1:1, so there are
//! no collisions between identities and no index file to keep in sync.
//! - Atomic writes (temp file + fsync + rename)
//! - Strict permissions on Unix (0600 files, 0700 dirs)
//! - Availability flag with graceful degradation

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::{SnapshotScope, SnapshotStats, SnapshotStore};
use crate::error::{IoResultExt, Result, StoreError};
use crate::workspace::paths::FileIdentity;
use crate::workspace::persistence::{atomic_write, is_temp_name};

/// Depth of a snapshot file below the base dir: `<project>/<task>/<file>`
const SNAPSHOT_DEPTH: usize = 3;

#[derive(Debug, Clone)]
pub struct DiskSnapshotStore {
    /// Base directory: <root>/.tmp/
    base_dir: PathBuf,
    /// Whether the store is available (base dir successfully created)
    available: bool,
}

impl DiskSnapshotStore {
    /// Create a store rooted at `base_dir`
    ///
    /// If the directory cannot be created the store is marked unavailable and
    /// every mutating operation fails, so updates never proceed without a
    /// preserved snapshot.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let available = Self::ensure_base_dir(&base_dir);
        Self {
            base_dir,
            available,
        }
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn ensure_base_dir(dir: &Path) -> bool {
        match fs::create_dir_all(dir) {
            Ok(()) => {
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    if let Err(e) = fs::set_permissions(dir, fs::Permissions::from_mode(0o700)) {
                        tracing::warn!(
                            dir = %dir.display(),
                            error = %e,
                            "Failed to set permissions on snapshot directory"
                        );
                        return false;
                    }
                }
                true
            }
            Err(e) => {
                tracing::error!(
                    dir = %dir.display(),
                    error = %e,
                    "Failed to create snapshot base directory"
                );
                false
            }
        }
    }

    fn unavailable(&self) -> StoreError {
        StoreError::io(
            &self.base_dir,
            io::Error::new(
                io::ErrorKind::Other,
                "Snapshot store is unavailable (base directory creation failed)",
            ),
        )
    }

    fn snapshot_path(&self, identity: &FileIdentity) -> PathBuf {
        self.base_dir.join(identity.relative_path())
    }

    fn scope_dir(&self, scope: SnapshotScope<'_>) -> PathBuf {
        match scope {
            SnapshotScope::All => self.base_dir.clone(),
            SnapshotScope::Project(project) => self.base_dir.join(project),
            SnapshotScope::Task { project, task } => self.base_dir.join(project).join(task),
        }
    }

    /// Ensure `<project>/<task>` exists under the base dir with strict permissions
    fn ensure_task_dir(&self, identity: &FileIdentity) -> Result<PathBuf> {
        if !self.available {
            return Err(self.unavailable());
        }

        let project_dir = self.base_dir.join(identity.project());
        let task_dir = project_dir.join(identity.task());
        fs::create_dir_all(&task_dir).at(&task_dir)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            for dir in [&project_dir, &task_dir] {
                fs::set_permissions(dir, fs::Permissions::from_mode(0o700)).at(dir)?;
            }
        }

        Ok(task_dir)
    }

    /// Recover an identity from a snapshot file path, skipping temp files
    fn identity_for(&self, path: &Path) -> Option<FileIdentity> {
        let rel = path.strip_prefix(&self.base_dir).ok()?;
        let parts: Vec<&str> = rel.iter().map(|p| p.to_str()).collect::<Option<_>>()?;
        match parts.as_slice() {
            [project, task, filename] if !is_temp_name(filename) => {
                FileIdentity::new(project, task, filename).ok()
            }
            _ => None,
        }
    }

    /// Snapshot files under `dir`, paired with their identities
    fn walk(&self, dir: &Path) -> impl Iterator<Item = (FileIdentity, walkdir::DirEntry)> + '_ {
        let below_base = dir
            .strip_prefix(&self.base_dir)
            .map(|rel| rel.iter().count())
            .unwrap_or(0);
        let depth = SNAPSHOT_DEPTH.saturating_sub(below_base);
        walkdir::WalkDir::new(dir)
            .min_depth(depth)
            .max_depth(depth)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(move |e| self.identity_for(e.path()).map(|id| (id, e)))
    }

    /// Remove now-empty task and project directories left behind by a discard
    fn prune_empty_dirs(&self, identity: &FileIdentity) {
        let project_dir = self.base_dir.join(identity.project());
        if fs::remove_dir(project_dir.join(identity.task())).is_ok() {
            let _ = fs::remove_dir(&project_dir);
        }
    }
}

impl SnapshotStore for DiskSnapshotStore {
    fn preserve(&self, identity: &FileIdentity, content: &str) -> Result<()> {
        self.ensure_task_dir(identity)?;
        let path = self.snapshot_path(identity);
        atomic_write(&path, content.as_bytes()).at(&path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).at(&path)?;
        }

        tracing::debug!(%identity, bytes = content.len(), "Preserved snapshot");
        Ok(())
    }

    fn load(&self, identity: &FileIdentity) -> Result<Option<String>> {
        if !self.available {
            return Err(self.unavailable());
        }

        let path = self.snapshot_path(identity);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    fn discard(&self, identity: &FileIdentity) -> Result<bool> {
        let path = self.snapshot_path(identity);
        match fs::remove_file(&path) {
            Ok(()) => {
                self.prune_empty_dirs(identity);
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    fn identities(&self, scope: SnapshotScope<'_>) -> Result<Vec<FileIdentity>> {
        let dir = self.scope_dir(scope);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut identities: Vec<FileIdentity> = self.walk(&dir).map(|(id, _)| id).collect();
        identities.sort();
        Ok(identities)
    }

    fn stats(&self) -> SnapshotStats {
        self.walk(&self.base_dir)
            .fold(SnapshotStats::default(), |mut stats, (_, entry)| {
                stats.count += 1;
                stats.total_bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
                stats
            })
    }

    fn clear_all(&self) -> usize {
        let mut deleted = 0;
        let entries: Vec<_> = self.walk(&self.base_dir).collect();
        for (identity, entry) in entries {
            match fs::remove_file(entry.path()) {
                Ok(()) => {
                    deleted += 1;
                    self.prune_empty_dirs(&identity);
                }
                Err(e) => tracing::warn!(
                    %identity,
                    error = %e,
                    "Failed to delete snapshot"
                ),
            }
        }

        if deleted > 0 {
            tracing::info!(deleted, "Cleared snapshot storage");
        }
        deleted
    }

    fn location(&self, identity: &FileIdentity) -> Option<PathBuf> {
        let path = self.snapshot_path(identity);
        path.is_file().then_some(path)
    }
}
