//! Workspace: the on-disk task hierarchy under one base root
//!
//! ```text
//! <root>/templates/<template>/<file>
//! <root>/projects/<project>/<task>/<file>
//! <root>/projects/<project>/RULES.md
//! <root>/RULES.md
//! <root>/.tmp/<project>/<task>/<file>    snapshots
//! ```
//!
//! The root is always injected. Every component shares one snapshot store and
//! one set of identity locks, so a file's preserve-then-mutate sequence is
//! serialized no matter which component performs it.

pub mod files;
pub mod git;
pub mod models;
pub mod paths;
pub mod persistence;
pub mod rules;
pub mod search;
pub mod tasks;
pub mod templates;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{IoResultExt, Result};
use crate::snapshot::{DiskSnapshotStore, IdentityLocks, SnapshotStats, SnapshotStore};

pub use files::FileAccessor;
pub use git::GitRepo;
pub use models::{CreatedTask, SearchHit, TaskSummary, UpdatedFile};
pub use paths::{FileIdentity, Resolver};
pub use rules::RulesStore;
pub use tasks::TaskStore;
pub use templates::TemplateStore;

/// Directory depth scanned for stale temps: projects/<project>/<task>/<file>
const CLEANUP_MAX_DEPTH: usize = 4;

#[derive(Debug, Clone)]
pub struct Workspace {
    paths: Resolver,
    templates: TemplateStore,
    tasks: TaskStore,
    files: FileAccessor,
    rules: RulesStore,
    git: GitRepo,
    snapshots: Arc<dyn SnapshotStore>,
}

impl Workspace {
    /// Open (creating if needed) a workspace with on-disk snapshots
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let paths = Resolver::new(root);
        let snapshots = Arc::new(DiskSnapshotStore::new(paths.snapshots_dir()));
        if !snapshots.is_available() {
            tracing::warn!(
                dir = %paths.snapshots_dir().display(),
                "Snapshot store unavailable; updates and deletes will fail"
            );
        }
        Self::with_snapshot_store(paths.root().to_path_buf(), snapshots)
    }

    /// Open a workspace backed by a caller-supplied snapshot store
    pub fn with_snapshot_store(
        root: impl Into<PathBuf>,
        snapshots: Arc<dyn SnapshotStore>,
    ) -> Result<Self> {
        let paths = Resolver::new(root);
        for dir in [paths.root().to_path_buf(), paths.projects_dir()] {
            fs::create_dir_all(&dir).at(&dir)?;
        }

        let templates = TemplateStore::new(paths.clone());
        templates.ensure_default()?;

        let locks = Arc::new(IdentityLocks::new());
        let files = FileAccessor::new(paths.clone(), Arc::clone(&snapshots), Arc::clone(&locks));
        let tasks = TaskStore::new(
            paths.clone(),
            templates.clone(),
            Arc::clone(&snapshots),
            locks,
        );
        let rules = RulesStore::new(paths.clone(), files.clone());
        let git = GitRepo::new(paths.clone());

        tracing::debug!(root = %paths.root().display(), "Opened workspace");
        Ok(Self {
            paths,
            templates,
            tasks,
            files,
            rules,
            git,
            snapshots,
        })
    }

    pub fn root(&self) -> &Path {
        self.paths.root()
    }

    pub fn paths(&self) -> &Resolver {
        &self.paths
    }

    pub fn templates(&self) -> &TemplateStore {
        &self.templates
    }

    pub fn tasks(&self) -> &TaskStore {
        &self.tasks
    }

    pub fn files(&self) -> &FileAccessor {
        &self.files
    }

    pub fn rules(&self) -> &RulesStore {
        &self.rules
    }

    pub fn git(&self) -> &GitRepo {
        &self.git
    }

    pub fn snapshots(&self) -> &dyn SnapshotStore {
        self.snapshots.as_ref()
    }

    pub fn search(&self, query: &str, project: Option<&str>) -> Result<Vec<SearchHit>> {
        search::search(&self.paths, query, project)
    }

    pub fn tmp_stats(&self) -> SnapshotStats {
        self.snapshots.stats()
    }

    /// Drop every snapshot; returns how many were removed
    pub fn clear_tmp(&self) -> usize {
        self.snapshots.clear_all()
    }

    /// Remove temp files and staging dirs left behind by crashed writers
    pub fn cleanup_stale_temps(&self) -> usize {
        let mut total = 0;
        for dir in [
            self.paths.projects_dir(),
            self.paths.templates_dir(),
            self.paths.snapshots_dir(),
        ] {
            match persistence::cleanup_stale_temps(
                &dir,
                CLEANUP_MAX_DEPTH,
                persistence::CLEANUP_AGE_THRESHOLD,
            ) {
                Ok((deleted, scanned, _)) => {
                    if deleted > 0 {
                        tracing::info!(dir = %dir.display(), deleted, scanned, "Cleaned up stale temp files");
                    }
                    total += deleted;
                }
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), error = %e, "Temp cleanup failed");
                }
            }
        }
        total
    }
}
