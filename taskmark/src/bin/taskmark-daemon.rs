// taskmark-daemon: background daemon owning the taskmark workspace
//
// Responsibilities:
// - Open the workspace under the configured base directory
// - Remove stale temp files left by interrupted writes
// - Serve the newline-framed JSON protocol on a Unix socket
// - Shut down on request or ctrl-c, removing the socket and PID file

use anyhow::Result;
use taskmark_lib::config::Config;

#[cfg(unix)]
#[tokio::main]
async fn main() -> Result<()> {
    taskmark_lib::init_tracing("info");
    let config = Config::from_env();
    taskmark_lib::daemon::server::run(config).await
}

#[cfg(not(unix))]
fn main() -> Result<()> {
    let _ = Config::from_env();
    anyhow::bail!("taskmark-daemon requires Unix domain sockets")
}
