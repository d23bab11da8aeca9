use clap::ValueEnum;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    ffi::OsString,
    fmt::{self, Display},
    path::PathBuf,
};

/// Matrix decomposition strategy handed to the external job
#[derive(Deserialize, Serialize, ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Decomposition {
    Tvb,
    Qrt,
    Svd,
}

impl Decomposition {
    pub const ALL: [Decomposition; 3] = [Self::Tvb, Self::Qrt, Self::Svd];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tvb => "tvb",
            Self::Qrt => "qrt",
            Self::Svd => "svd",
        }
    }
}

impl Display for Decomposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single fire-and-forget unit of work
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct JobDescriptor {
    pub worker_count: u32,
    pub algorithm: String,
    pub problem_size: u32,
    pub method: String,
    pub decomposition: Decomposition,
    pub distribution: String,
    pub dimension: u32,
}

impl JobDescriptor {
    /// log file name, `<decomposition><dimension>.out` without any directory
    pub fn log_path(&self) -> PathBuf {
        PathBuf::from(format!("{}{}.out", self.decomposition, self.dimension))
    }

    /// positional arguments for the target script, in invocation order
    pub fn script_args(&self) -> [String; 6] {
        [
            self.algorithm.clone(),
            self.problem_size.to_string(),
            self.method.clone(),
            self.decomposition.to_string(),
            self.distribution.clone(),
            self.dimension.to_string(),
        ]
    }
}

impl Display for JobDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{} ({} workers, size {})",
            self.decomposition, self.dimension, self.worker_count, self.problem_size
        )
    }
}

/// Fully resolved process invocation for one job
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub log_path: PathBuf,
}

impl Invocation {
    /// `<launcher> <worker_flag> <workers> <runtime> <script> <script args...>`
    pub fn new(
        launcher: impl Into<OsString>,
        worker_flag: &str,
        runtime: &str,
        script: &str,
        job: &JobDescriptor,
    ) -> Self {
        let mut args: Vec<OsString> = vec![
            worker_flag.into(),
            job.worker_count.to_string().into(),
            runtime.into(),
            script.into(),
        ];
        args.extend(job.script_args().into_iter().map(OsString::from));

        Self {
            program: launcher.into(),
            args,
            log_path: job.log_path(),
        }
    }
}

impl Display for Invocation {
    /// shell equivalent of the spawn, including the redirect and backgrounding
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} > {} 2>&1 &",
            shell_quote(&self.program.to_string_lossy()),
            self.args
                .iter()
                .map(|arg| shell_quote(&arg.to_string_lossy()).into_owned())
                .join(" "),
            shell_quote(&self.log_path.to_string_lossy())
        )
    }
}

/// single quote a word for a POSIX shell unless it only holds characters the shell leaves alone
pub fn shell_quote(word: &str) -> Cow<'_, str> {
    let plain = |c: char| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c);

    if !word.is_empty() && word.chars().all(plain) {
        Cow::Borrowed(word)
    } else {
        Cow::Owned(format!("'{}'", word.replace('\'', "'\\''")))
    }
}
