//! CLI command implementations
//!
//! Each command loads the config (defaults when the file is absent), opens
//! the cluster on its own runtime, does its work, and shuts the cluster
//! down before returning.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::cluster::Cluster;
use crate::config::ClusterConfig;
use crate::http_server::HttpServer;
use crate::node::NodeId;
use crate::observability::{Event, Logger};
use crate::simulation::{run_concurrency_case, run_recovery_case, LockPolicy, SimulationReport};
use crate::transaction::IsolationLevel;

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};

/// Parse arguments and run the chosen command.
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    run_command(cli.command)
}

pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Serve { config } => serve(&config),
        Command::Simulate {
            config,
            case,
            isolation,
            bypass_locks,
        } => simulate(&config, case, isolation.as_deref(), bypass_locks),
        Command::Recovery { config, case } => recovery(&config, case),
        Command::Pending { config, pool } => pending(&config, &pool),
    }
}

fn load_config(path: &Path) -> CliResult<ClusterConfig> {
    let config = ClusterConfig::load_or_default(Some(path))
        .map_err(|e| CliError::config_error(e.to_string()))?;
    Logger::event(
        Event::ConfigLoaded,
        &[
            ("data_dir", &config.data_dir.display().to_string()),
            ("path", &path.display().to_string()),
        ],
    );
    Ok(config)
}

fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new()
        .map_err(|e| CliError::boot_failed(format!("Failed to create tokio runtime: {}", e)))
}

fn print_json<T: Serialize>(value: &T) -> CliResult<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}

/// Boot, start the resolver, serve until Ctrl-C, then drain and close.
pub fn serve(config_path: &Path) -> CliResult<()> {
    let config = load_config(config_path)?;
    let rt = runtime()?;

    rt.block_on(async {
        let cluster = Arc::new(Cluster::open(config)?);
        cluster.spawn_scheduler();

        let server = match HttpServer::new(Arc::clone(&cluster)) {
            Ok(server) => server,
            Err(e) => {
                cluster.shutdown().await;
                return Err(CliError::config_error(e.to_string()));
            }
        };
        let served = server
            .start(async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await;

        cluster.shutdown().await;
        served.map_err(|e| CliError::io_error(format!("HTTP server failed: {}", e)))
    })
}

pub fn simulate(
    config_path: &Path,
    case: u8,
    isolation: Option<&str>,
    bypass_locks: bool,
) -> CliResult<()> {
    let config = load_config(config_path)?;
    let isolation = match isolation {
        None => config.default_isolation,
        raw => IsolationLevel::from_request_param(raw)?,
    };
    let policy = LockPolicy::from_enforced(!bypass_locks);

    let report = runtime()?.block_on(async {
        let cluster = Cluster::open(config)?;
        let report = run_concurrency_case(&cluster, case, isolation, policy).await;
        cluster.shutdown().await;
        report.map_err(CliError::from)
    })?;
    print_json(&report)
}

/// Recovery cases build on each other, so `--case N` replays 1..=N in one
/// process and prints the report of case N.
pub fn recovery(config_path: &Path, case: u8) -> CliResult<()> {
    let config = load_config(config_path)?;

    let report = runtime()?.block_on(async {
        let cluster = Cluster::open(config)?;
        let steps: Vec<u8> = if (1..=4).contains(&case) {
            (1..=case).collect()
        } else {
            vec![case]
        };
        let mut last: Option<SimulationReport> = None;
        let mut result = Ok(());
        for step in steps {
            match run_recovery_case(&cluster, step).await {
                Ok(report) => last = Some(report),
                Err(e) => {
                    result = Err(CliError::from(e));
                    break;
                }
            }
        }
        cluster.shutdown().await;
        result.and_then(|()| last.ok_or_else(|| CliError::io_error("no recovery case ran")))
    })?;
    print_json(&report)
}

pub fn pending(config_path: &Path, pool: &str) -> CliResult<()> {
    let pool: NodeId = pool
        .parse()
        .map_err(|e: crate::node::UnknownNode| CliError::config_error(e.to_string()))?;
    let config = load_config(config_path)?;

    let entries = runtime()?.block_on(async {
        let cluster = Cluster::open(config)?;
        let entries = cluster.pending(pool);
        cluster.shutdown().await;
        Ok::<_, CliError>(entries)
    })?;
    print_json(&entries)
}
