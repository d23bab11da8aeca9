use super::{ExecutorError, JobOutcome, Report};
use crate::{config::LauncherConfig, job::JobDescriptor};
use std::{io::Write, path::PathBuf};

/// Prints the shell equivalent of every spawn, starts nothing
#[derive(Debug)]
pub struct DryRunExecutor {
    config: LauncherConfig,
    log_dir: PathBuf,
}

impl DryRunExecutor {
    pub fn load(config: LauncherConfig, log_dir: PathBuf) -> Self {
        Self { config, log_dir }
    }

    pub fn execute<W: Write>(
        &mut self,
        jobs: &[JobDescriptor],
        out: &mut W,
    ) -> Result<Report, ExecutorError> {
        let mut outcomes = Vec::with_capacity(jobs.len());

        for job in jobs {
            let mut invocation = self.config.invocation(job);
            invocation.log_path = self.log_dir.join(&invocation.log_path);

            writeln!(out, "{invocation}").map_err(ExecutorError::Output)?;
            outcomes.push((job.clone(), JobOutcome::Printed));
        }

        Ok(Report { outcomes })
    }
}
