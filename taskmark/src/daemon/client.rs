// Daemon client for the CLI
// Blocking Unix socket connection; starts the daemon on demand

use std::io::{BufRead, BufReader, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};

use super::protocol::{
    deserialize_message, serialize_message, DaemonErrorCode, DaemonRequest, DaemonResponse,
    MAX_RESPONSE_FRAME_SIZE, PROTOCOL_VERSION,
};
use crate::config::Config;

const DAEMON_NAME: &str = "taskmark-daemon";

/// How long to wait for a freshly spawned daemon to bind its socket
const STARTUP_WAIT: Duration = Duration::from_secs(2);

const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Connect to the daemon, starting it if necessary
pub fn connect_or_start_daemon(config: &Config) -> Result<UnixStream> {
    if let Ok(stream) = UnixStream::connect(&config.socket_path) {
        return Ok(stream);
    }

    tracing::info!("Daemon not running, attempting to start");
    let daemon_path = resolve_daemon_path().ok_or_else(|| {
        anyhow::anyhow!("Could not find the {} binary next to this executable or on PATH", DAEMON_NAME)
    })?;

    Command::new(&daemon_path)
        .envs(config.child_env())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("Failed to start daemon at {}", daemon_path.display()))?;

    let step = Duration::from_millis(100);
    let mut waited = Duration::ZERO;
    while waited < STARTUP_WAIT {
        std::thread::sleep(step);
        waited += step;
        if let Ok(stream) = UnixStream::connect(&config.socket_path) {
            tracing::info!("Daemon started");
            return Ok(stream);
        }
    }

    Err(anyhow::anyhow!(
        "Daemon did not start within {:?} (socket not found at: {})",
        STARTUP_WAIT,
        config.socket_path.display()
    ))
}

/// Connect to an already-running daemon without starting one
pub fn connect(config: &Config) -> Result<UnixStream> {
    UnixStream::connect(&config.socket_path).with_context(|| {
        format!(
            "Daemon is not running (no socket at {})",
            config.socket_path.display()
        )
    })
}

/// Handshake, send one request and read its response
pub fn send_request(stream: UnixStream, request: &DaemonRequest) -> Result<DaemonResponse> {
    stream
        .set_read_timeout(Some(READ_TIMEOUT))
        .context("Failed to set read timeout")?;
    let mut writer = stream.try_clone().context("Failed to clone daemon stream")?;
    let mut reader = BufReader::new(stream);

    write_message(
        &mut writer,
        &DaemonRequest::Handshake {
            client_version: PROTOCOL_VERSION,
        },
    )
    .context("Failed to send handshake")?;
    match read_response(&mut reader).context("Handshake failed")? {
        DaemonResponse::Handshake { .. } => {}
        DaemonResponse::Error { code, message } if code == DaemonErrorCode::VersionMismatch => {
            anyhow::bail!("Protocol version mismatch: {}", message);
        }
        other => anyhow::bail!("Expected handshake response, got: {:?}", other),
    }

    write_message(&mut writer, request).context("Failed to send request to daemon")?;
    read_response(&mut reader).context("Failed to read response from daemon")
}

fn write_message(writer: &mut impl Write, message: &DaemonRequest) -> Result<()> {
    let bytes = serialize_message(message)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Read one response line, enforcing the response frame limit
pub fn read_response(reader: &mut impl BufRead) -> Result<DaemonResponse> {
    let mut line = String::new();
    let read = reader
        .take(MAX_RESPONSE_FRAME_SIZE as u64 + 1)
        .read_line(&mut line)?;

    if read == 0 {
        anyhow::bail!("Daemon closed connection unexpectedly");
    }
    if line.len() > MAX_RESPONSE_FRAME_SIZE {
        anyhow::bail!(
            "Response frame too large: more than {} bytes",
            MAX_RESPONSE_FRAME_SIZE
        );
    }

    deserialize_message(line.as_bytes()).with_context(|| {
        format!("Failed to parse daemon response (line: {})", line.trim())
    })
}

/// Locate the daemon binary: next to the current executable, then on PATH
pub fn resolve_daemon_path() -> Option<PathBuf> {
    let daemon_name = if cfg!(windows) {
        format!("{}.exe", DAEMON_NAME)
    } else {
        DAEMON_NAME.to_string()
    };

    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let candidate = dir.join(&daemon_name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }

    std::env::var_os("PATH").and_then(|path| {
        std::env::split_paths(&path)
            .map(|dir| dir.join(&daemon_name))
            .find(|candidate| candidate.is_file())
    })
}
