// Daemon module: protocol, request handling, socket server and CLI client
// Shared between the daemon and CLI binaries

pub mod handler;
pub mod protocol;

#[cfg(unix)]
pub mod client;
#[cfg(unix)]
pub mod server;
