//! Error types for taskmark storage operations
//!
//! Every public operation either succeeds or fails with exactly one of these
//! kinds. Errors carry the identity they refer to so callers can render a
//! useful message without extra context.

use std::fmt;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::workspace::paths::FileIdentity;

/// Result type alias for taskmark storage operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// The thing an error refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entity {
    Project(String),
    Task { project: String, task: String },
    ArchivedTask { project: String, task: String },
    File(FileIdentity),
    Template(String),
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Project(name) => write!(f, "project '{}'", name),
            Entity::Task { project, task } => write!(f, "task '{}/{}'", project, task),
            Entity::ArchivedTask { project, task } => {
                write!(f, "archived task '{}/{}'", project, task)
            }
            Entity::File(identity) => write!(f, "file '{}'", identity),
            Entity::Template(name) => write!(f, "template '{}'", name),
        }
    }
}

impl Entity {
    pub fn task(project: &str, task: &str) -> Self {
        Entity::Task {
            project: project.to_string(),
            task: task.to_string(),
        }
    }

    pub fn archived_task(project: &str, task: &str) -> Self {
        Entity::ArchivedTask {
            project: project.to_string(),
            task: task.to_string(),
        }
    }
}

/// Main error type for workspace, template, task and snapshot operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid {kind} {value:?}: {reason}")]
    InvalidIdentifier {
        kind: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("{0} not found")]
    NotFound(Entity),

    #[error("{0} already exists")]
    AlreadyExists(Entity),

    #[error("No snapshot available for file '{0}'")]
    NoSnapshotAvailable(FileIdentity),

    #[error("Storage error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("git {command} failed: {message}")]
    Git { command: String, message: String },
}

/// Coarse classification of a [`StoreError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidIdentifier,
    NotFound,
    AlreadyExists,
    NoSnapshotAvailable,
    Io,
    Git,
}

impl StoreError {
    /// Wrap an I/O error with the path it happened at
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::InvalidIdentifier { .. } => ErrorKind::InvalidIdentifier,
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            StoreError::NoSnapshotAvailable(_) => ErrorKind::NoSnapshotAvailable,
            StoreError::Io { .. } => ErrorKind::Io,
            StoreError::Git { .. } => ErrorKind::Git,
        }
    }
}

/// Attach a path to a bare `io::Result`
pub(crate) trait IoResultExt<T> {
    fn at(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn at(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| StoreError::io(path, e))
    }
}
