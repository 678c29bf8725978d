//! Binary entry point for the cfgsnap CLI.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use log::{error, info, warn};

use cfgsnap::config::discover_config;
use cfgsnap::orchestrator::status_overview;
use cfgsnap::{Orchestrator, RunConfig, RunSummary, SshConnector};

#[derive(Debug, Parser)]
#[command(
    name = "cfgsnap",
    version,
    about = "Back up network device configurations into a repository tree"
)]
struct Cli {
    /// Run configuration file (default: ./cfgsnap.toml).
    #[arg(short, long, env = "CFGSNAP_CONFIG")]
    config: Option<PathBuf>,

    /// Only process this host (repeatable).
    #[arg(long = "host", value_name = "HOSTNAME")]
    hosts: Vec<String>,

    /// Hosts processed concurrently; overrides the config.
    #[arg(short, long)]
    workers: Option<usize>,

    /// Log filter, e.g. `debug` or `cfgsnap=trace`. RUST_LOG wins if set.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Write the run summary as JSON to this file.
    #[arg(long, value_name = "PATH")]
    summary_json: Option<PathBuf>,

    /// Skip the license sweep.
    #[arg(long)]
    skip_licenses: bool,
}

/// Operator abort.
const EXIT_INTERRUPTED: i32 = 130;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            1
        }
    };
    process::exit(code);
}

async fn run(cli: Cli) -> Result<i32, cfgsnap::Error> {
    let path = discover_config(cli.config.as_deref()).ok_or_else(|| {
        cfgsnap::error::ConfigError::Invalid {
            message: "no cfgsnap.toml found; pass --config".to_string(),
        }
    })?;
    let mut config = RunConfig::load(&path)?;
    if let Some(workers) = cli.workers {
        config.workers = workers;
        config.validate()?;
    }
    info!("loaded {}", path.display());

    let credentials = config.resolve_credentials()?;
    let mut orchestrator = Orchestrator::from_config(SshConnector, &config, credentials)?;
    if cli.skip_licenses {
        orchestrator = orchestrator.with_license_policy(None);
    }

    let unknown = orchestrator.inventory_mut().retain_hosts(&cli.hosts);
    for host in &unknown {
        warn!("--host {} is not in the inventory", host);
    }

    let Some(summary) = orchestrator.run_until(interrupted()).await else {
        warn!("interrupted, open sessions aborted");
        return Ok(EXIT_INTERRUPTED);
    };

    report(&summary);
    if let Some(path) = &cli.summary_json {
        write_summary(&summary, path);
    }
    Ok(0)
}

/// Completes on Ctrl-C. Never completes if the handler cannot be installed.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

fn report(summary: &RunSummary) {
    for (status, hosts) in status_overview(summary) {
        let names: Vec<&str> = hosts.into_iter().collect();
        info!("{}: {}", status, names.join(", "));
    }
    let expiring = summary.license_notices();
    if !expiring.is_empty() {
        info!("{} licenses expiring", expiring.len());
    }
}

fn write_summary(summary: &RunSummary, path: &Path) {
    let result = serde_json::to_string_pretty(summary)
        .map_err(|e| e.to_string())
        .and_then(|json| fs::write(path, json).map_err(|e| e.to_string()));
    match result {
        Ok(()) => info!("summary written to {}", path.display()),
        Err(e) => warn!("could not write summary to {}: {}", path.display(), e),
    }
}
