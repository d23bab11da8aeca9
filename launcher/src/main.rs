mod config;
mod executors;
mod job;
mod table;

#[cfg(test)]
mod executors_test;

use clap::Parser;
use config::{ConfigErrors, LauncherConfig};
use executors::{ExecutorOptions, Executors};
use job::Decomposition;
use std::{path::PathBuf, process::ExitCode, time::Duration};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Start a batch of detached distributed test jobs, one log file per job
#[derive(Parser, Debug)]
#[command(name = "bulk-launcher", version, about)]
struct Cli {
    /// YAML file overriding the launcher settings and/or the job table
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory the `<decomposition><dimension>.out` logs are written to
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Only launch jobs with this decomposition (repeatable)
    #[arg(long = "decomposition", value_enum)]
    decompositions: Vec<Decomposition>,

    /// Only launch jobs with this dimension (repeatable)
    #[arg(long = "dimension")]
    dimensions: Vec<u32>,

    /// Print the equivalent shell commands instead of starting anything
    #[arg(long, conflicts_with_all = ["wait", "check"])]
    dry_run: bool,

    /// Wait for all jobs after launching and exit non-zero if any failed
    #[arg(long)]
    wait: bool,

    /// Upper bound in seconds for waiting on each job, jobs are left running past it
    #[arg(long, requires = "wait")]
    timeout: Option<u64>,

    /// Validate the job table and launcher without starting anything
    #[arg(long, conflicts_with = "wait")]
    check: bool,
}

fn load_config(cli: &Cli) -> Result<LauncherConfig, ConfigErrors> {
    match cli.config {
        Some(ref path) => {
            let config = LauncherConfig::load(path)?;
            info!("Loaded config from {}", path.display());

            Ok(config)
        }
        None => Ok(LauncherConfig::default()),
    }
}

/// map a parsed command line to the process exit code
fn run(cli: Cli) -> ExitCode {
    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!(error = ?e, "{e}");

            return ExitCode::FAILURE;
        }
    };

    if cli.check {
        let problems = config.preflight_checks();

        return if problems.is_empty() {
            info!("Preflight checks passed for {} jobs", config.jobs.len());
            ExitCode::SUCCESS
        } else {
            error!("{}", ConfigErrors::Preflight(problems.len()));
            ExitCode::FAILURE
        };
    }

    let jobs = config.select(&cli.decompositions, &cli.dimensions);
    info!("Launching {} of {} jobs", jobs.len(), config.jobs.len());

    let options = ExecutorOptions {
        log_dir: cli.log_dir.clone(),
        dry_run: cli.dry_run,
        wait: cli.wait,
        timeout: cli.timeout.map(Duration::from_secs),
    };

    match Executors::load(config, &options).execute(&jobs) {
        // without --wait nothing is observed, so only waiting can fail the batch
        Ok(report) if options.wait && !report.is_success() => {
            error!("{} of {} jobs failed", report.failures(), report.outcomes.len());

            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = ?e, "{e}");

            ExitCode::FAILURE
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    run(Cli::parse())
}
