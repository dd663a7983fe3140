// Unix socket server: accepts clients and answers newline-framed requests
// Workspace calls run on the blocking pool; connection messages are answered inline

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::signal;
use tokio::sync::mpsc;

use super::handler;
use super::protocol::{
    deserialize_message, serialize_message, DaemonErrorCode, DaemonRequest, DaemonResponse,
    MAX_REQUEST_FRAME_SIZE, PROTOCOL_VERSION,
};
use crate::config::Config;
use crate::workspace::Workspace;

/// Daemon state shared across all client connections
pub struct DaemonState {
    pub config: Config,
    pub workspace: Workspace,
}

/// Run the daemon until shutdown is requested or ctrl-c arrives
pub async fn run(config: Config) -> Result<()> {
    config
        .ensure_dirs()
        .context("Failed to create data directory")?;

    if config.socket_exists() {
        if config.is_daemon_running() {
            anyhow::bail!("Daemon already running (PID: {:?})", config.read_pid());
        }
        tracing::info!(socket = %config.socket_path.display(), "Removing stale socket");
        config
            .remove_socket()
            .context("Failed to remove stale socket")?;
    }

    config.write_pid().context("Failed to write PID file")?;

    let workspace = Workspace::open(&config.base_dir)
        .with_context(|| format!("Failed to open workspace at {}", config.base_dir.display()))?;
    let cleaned = workspace.cleanup_stale_temps();
    if cleaned > 0 {
        tracing::info!(cleaned, "Removed stale temp files from previous runs");
    }
    if let Err(e) = workspace.git().init_if_missing() {
        tracing::warn!(error = %e, "Git repository unavailable; status and commit will fail");
    }

    let listener = UnixListener::bind(&config.socket_path)
        .with_context(|| format!("Failed to bind socket: {}", config.socket_path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&config.socket_path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| {
                format!(
                    "Failed to set socket permissions: {}",
                    config.socket_path.display()
                )
            })?;
    }

    tracing::info!(
        socket = %config.socket_path.display(),
        root = %config.base_dir.display(),
        "Daemon listening"
    );

    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        let _ = signal::ctrl_c().await;
        let _ = signal_tx.send(()).await;
    });

    let state = Arc::new(DaemonState {
        config: config.clone(),
        workspace,
    });
    serve(listener, state, shutdown_tx, shutdown_rx).await;

    config.remove_pid().ok();
    config.remove_socket().ok();
    tracing::info!("Daemon stopped");
    Ok(())
}

/// Accept connections until a shutdown message arrives
pub async fn serve(
    listener: UnixListener,
    state: Arc<DaemonState>,
    shutdown_tx: mpsc::Sender<()>,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let state = Arc::clone(&state);
                        let shutdown_tx = shutdown_tx.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_client(state, stream, shutdown_tx).await {
                                tracing::warn!(error = %e, "Client error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept error");
                    }
                }
            }

            _ = shutdown_rx.recv() => {
                tracing::info!("Shutting down daemon");
                break;
            }
        }
    }
}

/// Handle a single client connection
///
/// The first message must be a successful handshake; anything else before it
/// is answered with `invalid_request` and not executed.
async fn handle_client(
    state: Arc<DaemonState>,
    mut stream: UnixStream,
    shutdown_tx: mpsc::Sender<()>,
) -> Result<()> {
    let (reader, mut writer) = stream.split();
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    let mut handshaken = false;

    loop {
        line.clear();
        // One byte past the limit tells an oversized frame from one that fits exactly
        let read = (&mut reader)
            .take(MAX_REQUEST_FRAME_SIZE as u64 + 1)
            .read_until(b'\n', &mut line)
            .await;

        let (response, close) = match read {
            Ok(0) => break,
            Ok(_) if line.len() > MAX_REQUEST_FRAME_SIZE => {
                // The rest of the frame is unread, so the stream cannot be resynced
                let response = invalid_request(format!(
                    "Request frame too large: more than {} bytes",
                    MAX_REQUEST_FRAME_SIZE
                ));
                (response, true)
            }
            Ok(_) => match deserialize_message::<DaemonRequest>(&line) {
                Ok(request @ DaemonRequest::Handshake { .. }) => {
                    let response = handle_request(&state, request, &shutdown_tx).await;
                    handshaken = matches!(response, DaemonResponse::Handshake { .. });
                    (response, false)
                }
                Ok(_) if !handshaken => (
                    invalid_request("Handshake required before any other request".to_string()),
                    false,
                ),
                Ok(request) => {
                    let response = handle_request(&state, request, &shutdown_tx).await;
                    (response, false)
                }
                Err(e) => (invalid_request(format!("Failed to parse request: {}", e)), false),
            },
            Err(e) => {
                tracing::debug!(error = %e, "Error reading from client");
                break;
            }
        };

        let bytes = serialize_message(&response)?;
        writer.write_all(&bytes).await?;
        writer.flush().await?;
        if close {
            break;
        }
    }

    Ok(())
}

fn invalid_request(message: String) -> DaemonResponse {
    DaemonResponse::Error {
        code: DaemonErrorCode::InvalidRequest,
        message,
    }
}

/// Handle a single request from a client
async fn handle_request(
    state: &Arc<DaemonState>,
    request: DaemonRequest,
    shutdown_tx: &mpsc::Sender<()>,
) -> DaemonResponse {
    match request {
        DaemonRequest::Handshake { client_version } => {
            if client_version != PROTOCOL_VERSION {
                let message = if client_version < PROTOCOL_VERSION {
                    "Daemon is newer than the CLI; please update the CLI.".to_string()
                } else {
                    "Daemon is outdated; please restart the daemon.".to_string()
                };
                return DaemonResponse::Error {
                    code: DaemonErrorCode::VersionMismatch,
                    message,
                };
            }
            DaemonResponse::Handshake {
                protocol_version: PROTOCOL_VERSION,
            }
        }

        DaemonRequest::Ping => DaemonResponse::Pong,

        DaemonRequest::Shutdown => {
            let _ = shutdown_tx.send(()).await;
            DaemonResponse::ShuttingDown
        }

        request => {
            let state = Arc::clone(state);
            tokio::task::spawn_blocking(move || handler::handle(&state.workspace, request))
                .await
                .unwrap_or_else(|e| DaemonResponse::Error {
                    code: DaemonErrorCode::Internal,
                    message: format!("Request handler failed: {}", e),
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Running {
        config: Config,
        _temp: TempDir,
    }

    async fn start() -> Running {
        let temp = TempDir::new().unwrap();
        let config = Config::in_dir(temp.path());
        let listener = UnixListener::bind(&config.socket_path).unwrap();
        let state = Arc::new(DaemonState {
            workspace: Workspace::open(&config.base_dir).unwrap(),
            config: config.clone(),
        });
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(serve(listener, state, tx, rx));
        Running {
            config,
            _temp: temp,
        }
    }

    async fn handshake(stream: &mut UnixStream) {
        let response = exchange(
            stream,
            &DaemonRequest::Handshake {
                client_version: PROTOCOL_VERSION,
            },
        )
        .await;
        assert!(matches!(response, DaemonResponse::Handshake { .. }));
    }

    fn assert_invalid_request(response: DaemonResponse) {
        assert!(
            matches!(
                response,
                DaemonResponse::Error {
                    code: DaemonErrorCode::InvalidRequest,
                    ..
                }
            ),
            "Expected invalid_request, got {:?}",
            response
        );
    }

    async fn exchange(stream: &mut UnixStream, request: &DaemonRequest) -> DaemonResponse {
        let bytes = serialize_message(request).unwrap();
        stream.write_all(&bytes).await.unwrap();
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        deserialize_message(line.as_bytes()).unwrap()
    }

    #[tokio::test]
    async fn test_handshake_and_requests() {
        let daemon = start().await;
        let mut stream = UnixStream::connect(&daemon.config.socket_path).await.unwrap();

        let response = exchange(
            &mut stream,
            &DaemonRequest::Handshake {
                client_version: PROTOCOL_VERSION,
            },
        )
        .await;
        assert_eq!(
            response,
            DaemonResponse::Handshake {
                protocol_version: PROTOCOL_VERSION
            }
        );

        assert_eq!(exchange(&mut stream, &DaemonRequest::Ping).await, DaemonResponse::Pong);

        let response = exchange(
            &mut stream,
            &DaemonRequest::CreateProject {
                project: "app".to_string(),
            },
        )
        .await;
        assert!(matches!(response, DaemonResponse::Created { .. }));
        assert_eq!(
            exchange(&mut stream, &DaemonRequest::ListProjects).await,
            DaemonResponse::Names {
                names: vec!["app".to_string()]
            }
        );
    }

    #[tokio::test]
    async fn test_version_mismatch() {
        let daemon = start().await;
        let mut stream = UnixStream::connect(&daemon.config.socket_path).await.unwrap();

        let response = exchange(
            &mut stream,
            &DaemonRequest::Handshake {
                client_version: PROTOCOL_VERSION + 1,
            },
        )
        .await;
        assert!(matches!(
            response,
            DaemonResponse::Error {
                code: DaemonErrorCode::VersionMismatch,
                ..
            }
        ));
    }

    async fn send_raw(stream: &mut UnixStream, bytes: &[u8]) -> DaemonResponse {
        stream.write_all(bytes).await.unwrap();
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        deserialize_message(line.as_bytes()).unwrap()
    }

    #[tokio::test]
    async fn test_malformed_request_keeps_connection() {
        let daemon = start().await;
        let mut stream = UnixStream::connect(&daemon.config.socket_path).await.unwrap();
        handshake(&mut stream).await;

        assert_invalid_request(send_raw(&mut stream, b"{\"type\":\"nope\"}\n").await);
        assert_eq!(exchange(&mut stream, &DaemonRequest::Ping).await, DaemonResponse::Pong);
    }

    #[tokio::test]
    async fn test_invalid_utf8_gets_a_reply() {
        let daemon = start().await;
        let mut stream = UnixStream::connect(&daemon.config.socket_path).await.unwrap();
        handshake(&mut stream).await;

        assert_invalid_request(send_raw(&mut stream, b"{\"type\":\"ping\xff\"}\n").await);
        assert_eq!(exchange(&mut stream, &DaemonRequest::Ping).await, DaemonResponse::Pong);
    }

    #[tokio::test]
    async fn test_requests_before_handshake_are_refused() {
        let daemon = start().await;
        let mut stream = UnixStream::connect(&daemon.config.socket_path).await.unwrap();

        let create = DaemonRequest::CreateProject {
            project: "app".to_string(),
        };
        assert_invalid_request(exchange(&mut stream, &create).await);
        assert_invalid_request(exchange(&mut stream, &DaemonRequest::Ping).await);
        assert!(!daemon.config.base_dir.join("projects/app").exists());

        // A rejected version does not unlock the connection either
        let response = exchange(
            &mut stream,
            &DaemonRequest::Handshake {
                client_version: PROTOCOL_VERSION + 1,
            },
        )
        .await;
        assert!(matches!(response, DaemonResponse::Error { .. }));
        assert_invalid_request(exchange(&mut stream, &DaemonRequest::Ping).await);

        handshake(&mut stream).await;
        assert!(matches!(
            exchange(&mut stream, &create).await,
            DaemonResponse::Created { .. }
        ));
    }

    #[tokio::test]
    async fn test_oversized_frame_is_rejected() {
        let daemon = start().await;
        let mut stream = UnixStream::connect(&daemon.config.socket_path).await.unwrap();

        let (read_half, mut write_half) = stream.split();
        let payload = vec![b'x'; MAX_REQUEST_FRAME_SIZE + 16];
        let writer = async {
            // The daemon stops reading once it answers, so a broken pipe here is expected
            let _ = write_half.write_all(&payload).await;
        };
        let reader = async {
            let mut reader = BufReader::new(read_half);
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            deserialize_message::<DaemonResponse>(line.as_bytes()).unwrap()
        };
        let (_, response) = tokio::join!(writer, reader);

        match response {
            DaemonResponse::Error { code, message } => {
                assert_eq!(code, DaemonErrorCode::InvalidRequest);
                assert!(message.contains("too large"));
            }
            other => panic!("Expected error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_shutdown_stops_accepting() {
        let temp = TempDir::new().unwrap();
        let config = Config::in_dir(temp.path());
        let listener = UnixListener::bind(&config.socket_path).unwrap();
        let state = Arc::new(DaemonState {
            workspace: Workspace::open(&config.base_dir).unwrap(),
            config: config.clone(),
        });
        let (tx, rx) = mpsc::channel(1);
        let server = tokio::spawn(serve(listener, state, tx, rx));

        let mut stream = UnixStream::connect(&config.socket_path).await.unwrap();
        handshake(&mut stream).await;
        assert_eq!(
            exchange(&mut stream, &DaemonRequest::Shutdown).await,
            DaemonResponse::ShuttingDown
        );
        tokio::time::timeout(std::time::Duration::from_secs(5), server)
            .await
            .expect("server should stop after shutdown")
            .unwrap();
    }
}
