use super::{ExecutorError, JobOutcome, Report};
use crate::{config::LauncherConfig, job::JobDescriptor};
use nix::unistd::setsid;
use std::{
    fs::File,
    io,
    os::unix::process::CommandExt,
    path::PathBuf,
    process::{Child, Command, Stdio},
    time::Instant,
};
use tracing::{debug, error, info, instrument};

/// Executor that starts every job in its own session and never waits on it
#[derive(Debug)]
pub struct DetachedExecutor {
    config: LauncherConfig,
    log_dir: PathBuf,
}

/// A started job together with its (unobserved) child handle
#[derive(Debug)]
pub struct SpawnedJob {
    pub job: JobDescriptor,
    pub child: Child,
    pub started: Instant,
}

impl DetachedExecutor {
    pub fn load(config: LauncherConfig, log_dir: PathBuf) -> Self {
        Self { config, log_dir }
    }

    /// start a single job with stdout and stderr both going to its log file
    #[instrument(skip_all, fields(job = %job), level = "debug")]
    pub fn spawn(&self, job: &JobDescriptor) -> Result<SpawnedJob, ExecutorError> {
        let invocation = self.config.invocation(job);
        let log_path = self.log_dir.join(&invocation.log_path);

        // File::create truncates, matching `> file`
        let stdout = File::create(&log_path).map_err(|source| ExecutorError::CreateLog {
            path: log_path.clone(),
            source,
        })?;
        // a dup shares the offset, matching `2>&1`
        let stderr = stdout.try_clone().map_err(|source| ExecutorError::CreateLog {
            path: log_path.clone(),
            source,
        })?;

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));

        // a new session drops the controlling terminal, the job survives the invoking shell
        unsafe {
            command.pre_exec(|| setsid().map(drop).map_err(io::Error::from));
        }

        debug!("Spawning {invocation}");

        let started = Instant::now();
        let child = command.spawn().map_err(|source| ExecutorError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;

        info!(
            pid = child.id(),
            log = %log_path.display(),
            "Started {job}"
        );

        Ok(SpawnedJob {
            job: job.clone(),
            child,
            started,
        })
    }

    /// Issue one spawn per job in order. A failed spawn is logged and the next job is started
    /// regardless.
    pub fn spawn_all(
        &self,
        jobs: &[JobDescriptor],
    ) -> Vec<(JobDescriptor, Result<SpawnedJob, ExecutorError>)> {
        jobs.iter()
            .map(|job| {
                let result = self.spawn(job);

                if let Err(ref e) = result {
                    error!(error = ?e, "Failed to start {job}: {e}");
                }

                (job.clone(), result)
            })
            .collect()
    }

    /// fire and forget, child handles are dropped without waiting
    #[instrument(skip_all, fields(jobs = jobs.len()), level = "info")]
    pub fn execute(&mut self, jobs: &[JobDescriptor]) -> Report {
        let outcomes = self
            .spawn_all(jobs)
            .into_iter()
            .map(|(job, result)| {
                let outcome = match result {
                    Ok(spawned) => JobOutcome::Spawned {
                        pid: spawned.child.id(),
                    },
                    Err(e) => JobOutcome::SpawnFailed(e.to_string()),
                };

                (job, outcome)
            })
            .collect();

        info!("Done with launching");

        Report { outcomes }
    }
}
