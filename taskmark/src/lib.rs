// taskmark: markdown task directories with one-step file recovery
//
// Shared between the daemon and the CLI binaries:
// - workspace: projects, tasks, files, templates, rules and search under one root
// - snapshot: single-slot pre-update copies that make one change undoable
// - daemon: socket protocol, request handling, server and client

pub mod config;
pub mod daemon;
pub mod error;
pub mod snapshot;
pub mod workspace;

pub use error::{Entity, ErrorKind, Result, StoreError};
pub use workspace::Workspace;

use tracing_subscriber::EnvFilter;

/// Install the stderr log subscriber
///
/// The filter comes from `TASKMARK_LOG`, falling back to `default_directive`.
pub fn init_tracing(default_directive: &str) {
    let filter = EnvFilter::try_from_env(config::LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    // A second init (e.g. in tests) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
