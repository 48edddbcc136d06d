//! CLI module for fragdb
//!
//! Provides command-line interface for:
//! - serve: boot the cluster and serve the diagnostic API
//! - simulate: run a concurrency scenario
//! - recovery: run the outage and recovery scenarios
//! - pending: list a node's pending recovery log entries

mod args;
mod commands;
mod errors;

pub use args::{Cli, Command};
pub use commands::{pending, recovery, run, run_command, serve, simulate};
pub use errors::{CliError, CliErrorCode, CliResult};
