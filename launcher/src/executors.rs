mod collecting;
mod detached;
mod dry_run;

pub use collecting::CollectingExecutor;
pub use detached::{DetachedExecutor, SpawnedJob};
pub use dry_run::DryRunExecutor;

use crate::{config::LauncherConfig, job::JobDescriptor};
use std::{ffi::OsString, io, path::PathBuf, time::Duration};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Failed to create log file {path}")]
    CreateLog {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to spawn {program:?}")]
    Spawn {
        program: OsString,
        #[source]
        source: io::Error,
    },
    #[error("Failed to build wait pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("Failed to write dry run output")]
    Output(#[source] io::Error),
}

/// What became of a single job, as far as the launcher observed it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// only rendered, nothing was started
    Printed,
    /// started and left running
    Spawned { pid: u32 },
    SpawnFailed(String),
    Exited { code: i32, elapsed: Duration },
    Signalled { signal: i32, elapsed: Duration },
    /// still running once the wait timeout passed
    TimedOut,
    WaitFailed(String),
}

impl JobOutcome {
    pub fn is_failure(&self) -> bool {
        match self {
            Self::Printed | Self::Spawned { .. } => false,
            Self::Exited { code, .. } => *code != 0,
            Self::SpawnFailed(_) | Self::Signalled { .. } | Self::TimedOut | Self::WaitFailed(_) => {
                true
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Report {
    pub outcomes: Vec<(JobDescriptor, JobOutcome)>,
}

impl Report {
    pub fn failures(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.is_failure())
            .count()
    }

    pub fn is_success(&self) -> bool {
        self.failures() == 0
    }
}

/// Options shared by all executors, mostly straight from the command line
#[derive(Debug, Clone, Default)]
pub struct ExecutorOptions {
    pub log_dir: Option<PathBuf>,
    pub dry_run: bool,
    pub wait: bool,
    pub timeout: Option<Duration>,
}

#[derive(Debug)]
pub enum Executors {
    Detached(DetachedExecutor),
    Collecting(CollectingExecutor),
    DryRun(DryRunExecutor),
}

impl Executors {
    pub fn load(config: LauncherConfig, options: &ExecutorOptions) -> Self {
        let log_dir = options.log_dir.clone().unwrap_or_default();

        if options.dry_run {
            Self::DryRun(DryRunExecutor::load(config, log_dir))
        } else if options.wait {
            Self::Collecting(CollectingExecutor::load(
                DetachedExecutor::load(config, log_dir),
                options.timeout,
            ))
        } else {
            Self::Detached(DetachedExecutor::load(config, log_dir))
        }
    }

    pub fn execute(&mut self, jobs: &[JobDescriptor]) -> Result<Report, ExecutorError> {
        match self {
            Self::Detached(executor) => Ok(executor.execute(jobs)),
            Self::Collecting(executor) => executor.execute(jobs),
            Self::DryRun(executor) => executor.execute(jobs, &mut io::stdout().lock()),
        }
    }
}
