// Daemon protocol - shared structs for daemon <-> CLI communication
// One JSON message per line over a Unix socket; both enums are tagged by "type"

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, StoreError};
use crate::snapshot::SnapshotStats;
use crate::workspace::{SearchHit, TaskSummary};

/// Bumped on any incompatible change to the message shapes
pub const PROTOCOL_VERSION: u32 = 1;

/// Largest request line the daemon will parse (4 MiB)
pub const MAX_REQUEST_FRAME_SIZE: usize = 4 * 1024 * 1024;

/// Largest response line the client will parse (16 MiB)
pub const MAX_RESPONSE_FRAME_SIZE: usize = 16 * 1024 * 1024;

// ============================================================================
// Client -> Daemon requests
// ============================================================================

/// Request message from CLI to daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DaemonRequest {
    /// Must be the first message on every connection; the daemon refuses
    /// everything else until a handshake succeeds
    Handshake { client_version: u32 },
    /// Ping to check if daemon is alive
    Ping,
    /// Request daemon to shut down gracefully
    Shutdown,

    ListProjects,
    CreateProject { project: String },
    DeleteProject { project: String },

    /// List tasks, optionally only those whose front matter status matches
    ListTasks {
        project: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<String>,
    },
    CreateTask {
        project: String,
        task: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        template: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    DeleteTask { project: String, task: String },
    ArchiveTask { project: String, task: String },
    UnarchiveTask { project: String, task: String },
    ListArchivedTasks { project: String },

    ListFiles { project: String, task: String },
    GetFile { project: String, task: String, filename: String },
    CreateFile {
        project: String,
        task: String,
        filename: String,
        content: String,
    },
    UpdateFile {
        project: String,
        task: String,
        filename: String,
        content: String,
    },
    DeleteFile { project: String, task: String, filename: String },
    RevertFile { project: String, task: String, filename: String },

    TmpStats,
    ClearTmp,

    ListTemplates,
    CreateTemplate { template: String },
    AddTemplateFile {
        template: String,
        filename: String,
        content: String,
    },

    GetRules {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        project: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task: Option<String>,
    },
    SetRules {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        project: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task: Option<String>,
    },

    Search {
        query: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        project: Option<String>,
    },

    GitStatus,
    /// Commit everything, or only one project or task
    GitCommit {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        project: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task: Option<String>,
    },
}

// ============================================================================
// Daemon -> Client responses
// ============================================================================

/// Response message from daemon to CLI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DaemonResponse {
    Handshake { protocol_version: u32 },
    Pong,
    ShuttingDown,

    /// Sorted names (projects, files, templates)
    Names { names: Vec<String> },
    Tasks { tasks: Vec<TaskSummary> },

    /// A project, task, file or template was created
    Created {
        path: String,
        /// Files copied into a new task
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        files: Vec<String>,
        /// Rules that apply to a newly created file
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rules: Option<String>,
    },
    Deleted,
    /// A task moved into or out of the archive
    Moved { path: String },

    File {
        path: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rules: Option<String>,
    },
    Updated {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        snapshot_path: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rules: Option<String>,
    },
    Reverted { path: String, content: String },

    TmpStats { count: usize, total_bytes: u64 },
    Cleared { deleted_count: usize },

    /// Combined rules text; empty when no level has rules
    Rules { rules: String },
    RulesSet { path: String },

    SearchResults { hits: Vec<SearchHit> },

    /// `git status --short` output; empty when clean
    GitStatus { changes: String },
    /// Commit summary, or `None` when there was nothing to commit
    Committed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
    },

    Error { code: DaemonErrorCode, message: String },
}

impl From<SnapshotStats> for DaemonResponse {
    fn from(stats: SnapshotStats) -> Self {
        DaemonResponse::TmpStats {
            count: stats.count,
            total_bytes: stats.total_bytes,
        }
    }
}

impl From<StoreError> for DaemonResponse {
    fn from(err: StoreError) -> Self {
        DaemonResponse::Error {
            code: DaemonErrorCode::from(err.kind()),
            message: err.to_string(),
        }
    }
}

/// Machine-readable error classification carried by [`DaemonResponse::Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DaemonErrorCode {
    InvalidIdentifier,
    NotFound,
    AlreadyExists,
    NoSnapshotAvailable,
    /// Malformed, oversized or out-of-order request
    InvalidRequest,
    VersionMismatch,
    Internal,
}

impl From<ErrorKind> for DaemonErrorCode {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::InvalidIdentifier => DaemonErrorCode::InvalidIdentifier,
            ErrorKind::NotFound => DaemonErrorCode::NotFound,
            ErrorKind::AlreadyExists => DaemonErrorCode::AlreadyExists,
            ErrorKind::NoSnapshotAvailable => DaemonErrorCode::NoSnapshotAvailable,
            ErrorKind::Io | ErrorKind::Git => DaemonErrorCode::Internal,
        }
    }
}

impl std::fmt::Display for DaemonErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DaemonErrorCode::InvalidIdentifier => "invalid_identifier",
            DaemonErrorCode::NotFound => "not_found",
            DaemonErrorCode::AlreadyExists => "already_exists",
            DaemonErrorCode::NoSnapshotAvailable => "no_snapshot_available",
            DaemonErrorCode::InvalidRequest => "invalid_request",
            DaemonErrorCode::VersionMismatch => "version_mismatch",
            DaemonErrorCode::Internal => "internal",
        };
        f.write_str(s)
    }
}

// ============================================================================
// Helpers for message framing
// ============================================================================

/// Serialize a message to JSON bytes with newline delimiter
pub fn serialize_message<T: Serialize>(msg: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut bytes = serde_json::to_vec(msg)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Deserialize a message from JSON bytes (strips trailing newline)
pub fn deserialize_message<T: for<'de> Deserialize<'de>>(
    bytes: &[u8],
) -> Result<T, serde_json::Error> {
    let trimmed = if bytes.last() == Some(&b'\n') {
        &bytes[..bytes.len() - 1]
    } else {
        bytes
    };
    serde_json::from_slice(trimmed)
}
