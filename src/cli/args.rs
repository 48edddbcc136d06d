//! CLI argument definitions using clap
//!
//! Commands:
//! - fragdb serve [--config <path>]
//! - fragdb simulate --case <1..3> [--isolation <LEVEL>] [--bypass-locks]
//! - fragdb recovery --case <1..4>
//! - fragdb pending --pool <node>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// fragdb - a three-node parity-partitioned store with logged replication
#[derive(Parser, Debug)]
#[command(name = "fragdb")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Boot the cluster and serve the diagnostic API until Ctrl-C
    Serve {
        /// Path to configuration file; defaults apply when it is absent
        #[arg(long, default_value = "./fragdb.json")]
        config: PathBuf,
    },

    /// Run a concurrency scenario and print its report
    Simulate {
        #[arg(long, default_value = "./fragdb.json")]
        config: PathBuf,

        /// Scenario number (1..3)
        #[arg(long)]
        case: u8,

        /// READ_UNCOMMITTED, READ_COMMITTED, REPEATABLE_READ or SERIALIZABLE
        #[arg(long)]
        isolation: Option<String>,

        /// Run without the lock manager
        #[arg(long)]
        bypass_locks: bool,
    },

    /// Run recovery scenarios 1..=case in order and print the last report
    Recovery {
        #[arg(long, default_value = "./fragdb.json")]
        config: PathBuf,

        /// Scenario number (1..4)
        #[arg(long)]
        case: u8,
    },

    /// List a node's pending recovery log entries
    Pending {
        #[arg(long, default_value = "./fragdb.json")]
        config: PathBuf,

        /// node1, node2 or node3
        #[arg(long)]
        pool: String,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
