use super::{DetachedExecutor, ExecutorError, JobOutcome, Report, SpawnedJob};
use crate::job::JobDescriptor;
use rayon::{prelude::*, ThreadPoolBuilder};
use std::{os::unix::process::ExitStatusExt, process::ExitStatus, time::Duration};
use tracing::{debug, info, instrument, warn};
use wait_timeout::ChildExt;

/// Executor that launches like `DetachedExecutor` and afterwards collects every exit status
#[derive(Debug)]
pub struct CollectingExecutor {
    inner: DetachedExecutor,
    timeout: Option<Duration>,
}

impl CollectingExecutor {
    pub fn load(inner: DetachedExecutor, timeout: Option<Duration>) -> Self {
        Self { inner, timeout }
    }

    #[instrument(skip_all, fields(jobs = jobs.len()), level = "info")]
    pub fn execute(&mut self, jobs: &[JobDescriptor]) -> Result<Report, ExecutorError> {
        // all jobs are started before the first wait, waiting never delays a spawn
        let spawned = self.inner.spawn_all(jobs);

        // one thread per job, otherwise a long running job holds up the others' timeouts
        let pool = ThreadPoolBuilder::new()
            .num_threads(spawned.len().max(1))
            .build()?;
        let timeout = self.timeout;

        debug!("Waiting on {} jobs", spawned.len());

        let outcomes: Vec<(JobDescriptor, JobOutcome)> = pool.install(|| {
            spawned
                .into_par_iter()
                .map(|(job, result)| {
                    let outcome = match result {
                        Ok(spawned) => wait(spawned, timeout),
                        Err(e) => JobOutcome::SpawnFailed(e.to_string()),
                    };

                    (job, outcome)
                })
                .collect()
        });

        let report = Report { outcomes };
        info!(
            "Done with {}/{} jobs successful",
            report.outcomes.len() - report.failures(),
            report.outcomes.len()
        );

        Ok(report)
    }
}

/// wait for a single job, a job past its timeout keeps running
fn wait(mut spawned: SpawnedJob, timeout: Option<Duration>) -> JobOutcome {
    let job = &spawned.job;
    let status = match timeout {
        Some(timeout) => spawned.child.wait_timeout(timeout),
        None => spawned.child.wait().map(Some),
    };

    match status {
        Ok(Some(status)) => {
            let outcome = outcome_from_status(status, spawned.started.elapsed());

            if outcome.is_failure() {
                warn!("{job} finished unsuccessfully: {outcome:?}");
            } else {
                info!("{job} finished: {outcome:?}");
            }

            outcome
        }
        Ok(None) => {
            warn!(
                pid = spawned.child.id(),
                "{job} still running after timeout, leaving it be"
            );

            JobOutcome::TimedOut
        }
        Err(e) => {
            warn!(error = ?e, "Failed to wait for {job}");

            JobOutcome::WaitFailed(e.to_string())
        }
    }
}

fn outcome_from_status(status: ExitStatus, elapsed: Duration) -> JobOutcome {
    match (status.code(), status.signal()) {
        (Some(code), _) => JobOutcome::Exited { code, elapsed },
        (None, Some(signal)) => JobOutcome::Signalled { signal, elapsed },
        // neither code nor signal only happens for stopped/continued children
        (None, None) => JobOutcome::WaitFailed(format!("unexpected status {status}")),
    }
}
