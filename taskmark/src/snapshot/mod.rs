//! Snapshot subsystem
//!
//! Preserves the pre-update content of a task file so a single update or
//! delete can be undone. Exactly one snapshot slot exists per file identity:
//! a new `preserve` overwrites whatever was there, and `revert` consumes it.
//!
//! Storage is behind the [`SnapshotStore`] trait so the recovery guarantee does
//! not depend on any particular on-disk naming scheme.

pub mod locks;
pub mod memory;
pub mod store;

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::workspace::paths::FileIdentity;

pub use locks::IdentityLocks;
pub use memory::MemorySnapshotStore;
pub use store::DiskSnapshotStore;

/// Count and total size of the snapshots currently held
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotStats {
    pub count: usize,
    pub total_bytes: u64,
}

/// Which identities to enumerate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotScope<'a> {
    All,
    Project(&'a str),
    Task { project: &'a str, task: &'a str },
}

impl SnapshotScope<'_> {
    pub fn contains(&self, identity: &FileIdentity) -> bool {
        match *self {
            SnapshotScope::All => true,
            SnapshotScope::Project(project) => identity.is_within(project, None),
            SnapshotScope::Task { project, task } => identity.is_within(project, Some(task)),
        }
    }
}

/// Single-slot-per-identity snapshot storage
///
/// Implementations must be safe to share across threads. Callers serialize
/// operations on one identity with [`IdentityLocks`]; the store itself only
/// has to keep distinct identities independent.
pub trait SnapshotStore: Send + Sync + fmt::Debug {
    /// Store `content` as the snapshot for `identity`, replacing any previous one
    fn preserve(&self, identity: &FileIdentity, content: &str) -> Result<()>;

    /// Read the snapshot for `identity` without consuming it
    fn load(&self, identity: &FileIdentity) -> Result<Option<String>>;

    /// Drop the snapshot for `identity`; `Ok(false)` if there was none
    fn discard(&self, identity: &FileIdentity) -> Result<bool>;

    /// Identities that currently hold a snapshot within `scope`, sorted
    fn identities(&self, scope: SnapshotScope<'_>) -> Result<Vec<FileIdentity>>;

    fn stats(&self) -> SnapshotStats;

    /// Drop every snapshot, returning how many were removed
    fn clear_all(&self) -> usize;

    /// Where the snapshot for `identity` lives, for stores that have a location
    fn location(&self, _identity: &FileIdentity) -> Option<PathBuf> {
        None
    }
}

/// One-shot restore of the preserved content for `identity`
///
/// Hands the snapshot to `restore` (which writes it back as the file's current
/// content) and only then discards the slot, so a failed write leaves the
/// snapshot in place. Returns the restored content.
pub fn revert<F>(store: &dyn SnapshotStore, identity: &FileIdentity, restore: F) -> Result<String>
where
    F: FnOnce(&str) -> Result<()>,
{
    let content = store
        .load(identity)?
        .ok_or_else(|| StoreError::NoSnapshotAvailable(identity.clone()))?;

    restore(&content)?;
    store.discard(identity)?;

    tracing::debug!(%identity, bytes = content.len(), "Reverted file from snapshot");
    Ok(content)
}

/// Discard every snapshot within `scope`, returning how many existed
///
/// `live` names the files currently present under the scope; they are
/// discarded together with whatever the store itself reports, so a cascade
/// never depends on how the store enumerates.
pub fn discard_scope(
    store: &dyn SnapshotStore,
    locks: &IdentityLocks,
    scope: SnapshotScope<'_>,
    live: impl IntoIterator<Item = FileIdentity>,
) -> Result<usize> {
    let mut identities: BTreeSet<FileIdentity> = live
        .into_iter()
        .filter(|identity| scope.contains(identity))
        .collect();
    identities.extend(store.identities(scope)?);

    let mut discarded = 0;
    for identity in &identities {
        if locks.with_lock(identity, || store.discard(identity))? {
            discarded += 1;
        }
    }
    Ok(discarded)
}
