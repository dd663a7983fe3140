// Environment configuration for the daemon and CLI
// Resolves the workspace root plus platform-specific runtime paths (socket, PID file)

use std::path::{Path, PathBuf};

/// Overrides the workspace root; runtime files follow it unless
/// `TASKMARK_RUNTIME_DIR` is also set
pub const DIR_ENV: &str = "TASKMARK_DIR";

/// Overrides the directory holding the socket and PID file
pub const RUNTIME_DIR_ENV: &str = "TASKMARK_RUNTIME_DIR";

/// Log filter directive for `tracing-subscriber`
pub const LOG_ENV: &str = "TASKMARK_LOG";

/// Configuration for workspace and daemon paths
#[derive(Debug, Clone)]
pub struct Config {
    /// Workspace root (templates, projects, rules, snapshots)
    pub base_dir: PathBuf,
    /// Directory for runtime files (socket, PID)
    pub runtime_dir: PathBuf,
    /// Path to the Unix socket
    pub socket_path: PathBuf,
    /// Path to the daemon PID file
    pub pid_file: PathBuf,
}

impl Config {
    /// Everything under one directory; used for overrides and tests
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self::with_dirs(dir.clone(), dir)
    }

    fn with_dirs(base_dir: PathBuf, runtime_dir: PathBuf) -> Self {
        Self {
            socket_path: runtime_dir.join("daemon.sock"),
            pid_file: runtime_dir.join("daemon.pid"),
            base_dir,
            runtime_dir,
        }
    }

    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| var(key).filter(|d| !d.is_empty());
        let base_override = non_empty(DIR_ENV).map(PathBuf::from);

        let runtime_dir = non_empty(RUNTIME_DIR_ENV).map(PathBuf::from);
        let (base_dir, runtime_dir) = match (base_override, runtime_dir) {
            (Some(base), Some(runtime)) => (base, runtime),
            (Some(base), None) => (base.clone(), base),
            (None, runtime) => {
                let base = dirs::home_dir()
                    .map(|h| h.join(".taskmark"))
                    .unwrap_or_else(|| PathBuf::from("/tmp/taskmark"));
                let runtime = runtime
                    .unwrap_or_else(|| Self::default_runtime_dir(&base, var("XDG_RUNTIME_DIR")));
                (base, runtime)
            }
        };
        Self::with_dirs(base_dir, runtime_dir)
    }

    /// Environment for a spawned daemon so it resolves exactly this config
    pub fn child_env(&self) -> [(&'static str, &Path); 2] {
        [
            (DIR_ENV, self.base_dir.as_path()),
            (RUNTIME_DIR_ENV, self.runtime_dir.as_path()),
        ]
    }

    #[cfg(target_os = "linux")]
    fn default_runtime_dir(base_dir: &Path, xdg_runtime_dir: Option<String>) -> PathBuf {
        match xdg_runtime_dir.filter(|d| !d.is_empty()) {
            Some(dir) => PathBuf::from(dir).join("taskmark"),
            None => base_dir.to_path_buf(),
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn default_runtime_dir(base_dir: &Path, _xdg_runtime_dir: Option<String>) -> PathBuf {
        base_dir.to_path_buf()
    }

    /// Ensure both directories exist; the runtime dir is private on Unix
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(&self.runtime_dir)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.runtime_dir, std::fs::Permissions::from_mode(0o700))?;
        }

        Ok(())
    }

    /// Write the daemon PID to the PID file
    pub fn write_pid(&self) -> std::io::Result<()> {
        self.ensure_dirs()?;
        std::fs::write(&self.pid_file, std::process::id().to_string())
    }

    /// Read the daemon PID from the PID file
    pub fn read_pid(&self) -> Option<u32> {
        std::fs::read_to_string(&self.pid_file)
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }

    pub fn remove_pid(&self) -> std::io::Result<()> {
        if self.pid_file.exists() {
            std::fs::remove_file(&self.pid_file)
        } else {
            Ok(())
        }
    }

    pub fn remove_socket(&self) -> std::io::Result<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)
        } else {
            Ok(())
        }
    }

    /// Check if the daemon socket exists (indicating daemon may be running)
    pub fn socket_exists(&self) -> bool {
        self.socket_path.exists()
    }

    /// Check if a process with the stored PID is still running
    #[cfg(unix)]
    pub fn is_daemon_running(&self) -> bool {
        match self.read_pid().and_then(|pid| i32::try_from(pid).ok()) {
            // Signal 0 only checks that the process exists
            Some(pid) => unsafe { libc::kill(pid, 0) == 0 },
            None => false,
        }
    }

    #[cfg(not(unix))]
    pub fn is_daemon_running(&self) -> bool {
        self.socket_exists()
    }
}
