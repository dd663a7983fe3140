use super::polling::{wait_for, WaitError};
use std::fmt;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use taskmark_lib::config::Config;

const READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Daemon process that is killed on drop if it is still running.
pub struct DaemonGuard {
    child: Child,
    config: Config,
}

impl DaemonGuard {
    /// Start the compiled daemon with everything under `data_dir`.
    pub fn start(data_dir: &Path) -> Result<Self, DaemonError> {
        let daemon_bin = PathBuf::from(env!("CARGO_BIN_EXE_taskmark-daemon"));

        let config = Config::in_dir(data_dir);
        let child = Command::new(&daemon_bin)
            .envs(config.child_env())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(DaemonError::SpawnFailed)?;

        let guard = Self { child, config };
        guard.wait_for_ready().map_err(DaemonError::ReadyTimeout)?;
        Ok(guard)
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn connect(&self) -> UnixStream {
        UnixStream::connect(&self.config.socket_path).expect("daemon socket should accept")
    }

    /// Wait for the process to exit on its own.
    pub fn wait_for_exit(&mut self, timeout: Duration) -> bool {
        let child = &mut self.child;
        wait_for("daemon exit", timeout, || child.try_wait().ok().flatten()).is_ok()
    }

    fn wait_for_ready(&self) -> Result<(), WaitError> {
        let socket = self.config.socket_path.clone();
        wait_for("daemon socket", READY_TIMEOUT, || {
            UnixStream::connect(&socket).ok().map(|_| ())
        })
    }
}

impl Drop for DaemonGuard {
    fn drop(&mut self) {
        if let Ok(Some(_)) = self.child.try_wait() {
            return;
        }
        if let Err(err) = self.child.kill() {
            eprintln!("Failed to terminate taskmark-daemon pid {}: {}", self.child.id(), err);
            return;
        }
        let _ = self.child.wait();
    }
}

/// Errors that can occur when starting the daemon for tests.
#[derive(Debug)]
pub enum DaemonError {
    SpawnFailed(std::io::Error),
    ReadyTimeout(WaitError),
}

impl fmt::Display for DaemonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SpawnFailed(err) => write!(f, "failed to spawn daemon: {}", err),
            Self::ReadyTimeout(err) => write!(f, "daemon never became ready: {}", err),
        }
    }
}

impl std::error::Error for DaemonError {}
