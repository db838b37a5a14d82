//! Service plumbing around the journal: socket intake, client side and the
//! daemon lifecycle.

mod client;
mod commands;
mod daemon;
mod server;

pub use client::{DaemonClient, describe_client_error};
pub use commands::{Command, MAX_COMMAND_BYTES, Reply, Request};
pub use daemon::{WRITER_SHUTDOWN_TIMEOUT, build_writer, run_daemon, spawn_writer, stop_writer};
pub use server::CommandServer;
