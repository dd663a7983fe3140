// Shared helpers for integration tests that run the daemon binary

#![allow(dead_code)]

pub mod daemon_guard;
pub mod polling;
