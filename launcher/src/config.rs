use crate::{
    job::{Decomposition, Invocation, JobDescriptor},
    table,
};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    env,
    fs::{self, File},
    io,
    os::unix::fs::MetadataExt,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, error};

// check if a file is executable
pub fn check_executable(path: &Path) -> Result<bool, ConfigErrors> {
    if !path.is_file() {
        Err(ConfigErrors::FileNotFound(path.to_path_buf()))
    } else {
        match File::open(path).map(|file| file.metadata()) {
            Ok(Ok(metadata)) => Ok((metadata.mode() & 0o111) != 0),
            Ok(Err(e)) | Err(e) => Err(ConfigErrors::MetadataNotFound(e)),
        }
    }
}

/// resolve a launcher the way the shell would: paths are taken as is, bare names go through PATH
pub fn resolve_executable(program: &Path) -> Option<PathBuf> {
    if program.components().count() > 1 {
        return matches!(check_executable(program), Ok(true)).then(|| program.to_path_buf());
    }

    env::var_os("PATH").and_then(|paths| {
        env::split_paths(&paths)
            .map(|dir| dir.join(program))
            .find(|candidate| matches!(check_executable(candidate), Ok(true)))
    })
}

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
    #[error("Metadata not found")]
    MetadataNotFound(#[source] io::Error),
    #[error("Failed to read config file {path}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to parse config file")]
    ParseConfig(#[from] serde_yaml::Error),
    #[error("Preflight checks failed with {0} problem(s)")]
    Preflight(usize),
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LauncherConfig {
    // distributed-execution launcher, e.g. mpiexec or srun
    #[serde(default = "default_launcher")]
    pub launcher: PathBuf,
    // flag the launcher takes the worker count with
    #[serde(default = "default_worker_flag")]
    pub worker_flag: String,
    // interpreter running the script on every worker
    #[serde(default = "default_runtime")]
    pub runtime: String,
    #[serde(default = "default_script")]
    pub script: String,
    #[serde(default = "table::default_jobs")]
    pub jobs: Vec<JobDescriptor>,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            launcher: default_launcher(),
            worker_flag: default_worker_flag(),
            runtime: default_runtime(),
            script: default_script(),
            jobs: table::default_jobs(),
        }
    }
}

impl LauncherConfig {
    /// load a config from a yaml file, missing keys fall back to the built-in batch
    pub fn load(path: &Path) -> Result<Self, ConfigErrors> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigErrors::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigErrors> {
        let config: Self = serde_yaml::from_str(raw)?;
        debug!("Loaded config with {} jobs", config.jobs.len());

        Ok(config)
    }

    /// jobs matching any of the given decompositions and dimensions, an empty filter matches all
    pub fn select(
        &self,
        decompositions: &[Decomposition],
        dimensions: &[u32],
    ) -> Vec<JobDescriptor> {
        self.jobs
            .iter()
            .filter(|job| decompositions.is_empty() || decompositions.contains(&job.decomposition))
            .filter(|job| dimensions.is_empty() || dimensions.contains(&job.dimension))
            .cloned()
            .collect_vec()
    }

    pub fn invocation(&self, job: &JobDescriptor) -> Invocation {
        Invocation::new(
            self.launcher.as_os_str(),
            &self.worker_flag,
            &self.runtime,
            &self.script,
            job,
        )
    }

    /// Collect every problem with the batch instead of stopping at the first one.
    /// Only run on request, launching never validates.
    pub fn preflight_checks(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.jobs.is_empty() {
            problems.push("No jobs defined, nothing would be launched".to_owned());
        }

        match resolve_executable(&self.launcher) {
            Some(path) => debug!("Launcher resolved to {}", path.display()),
            None => problems.push(format!(
                "launcher '{}' is not an executable file nor found on PATH",
                self.launcher.display()
            )),
        }

        for (name, token) in [
            ("worker_flag", &self.worker_flag),
            ("runtime", &self.runtime),
            ("script", &self.script),
        ] {
            if !is_token(token) {
                problems.push(format!("{name} '{token}' must be a non-empty token"));
            }
        }

        let mut log_paths: BTreeMap<PathBuf, usize> = BTreeMap::new();

        for (index, job) in self.jobs.iter().enumerate() {
            if job.worker_count == 0 {
                problems.push(format!("jobs[{index}] ({job}) requests zero workers"));
            }
            if job.problem_size == 0 {
                problems.push(format!("jobs[{index}] ({job}) has a zero problem size"));
            }
            if job.dimension == 0 {
                problems.push(format!("jobs[{index}] ({job}) has a zero dimension"));
            }

            for (name, token) in [
                ("algorithm", &job.algorithm),
                ("method", &job.method),
                ("distribution", &job.distribution),
            ] {
                if !is_token(token) {
                    problems.push(format!("jobs[{index}].{name} '{token}' must be a non-empty token"));
                }
            }

            if let Some(previous) = log_paths.insert(job.log_path(), index) {
                problems.push(format!(
                    "jobs[{index}] and jobs[{previous}] both write to {}",
                    job.log_path().display()
                ));
            }
        }

        for problem in problems.iter() {
            error!("{problem}");
        }

        problems
    }
}

fn is_token(value: &str) -> bool {
    !value.is_empty() && !value.chars().any(char::is_whitespace)
}

fn default_launcher() -> PathBuf {
    PathBuf::from("mpiexec")
}

fn default_worker_flag() -> String {
    "-n".to_owned()
}

fn default_runtime() -> String {
    "python".to_owned()
}

fn default_script() -> String {
    "bulk_test.py".to_owned()
}
