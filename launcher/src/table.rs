use crate::job::{Decomposition, JobDescriptor};
use itertools::{iproduct, Itertools};
use once_cell::sync::Lazy;

pub const ALGORITHM: &str = "macaulayreduction";
pub const METHOD: &str = "mult";
pub const DISTRIBUTION: &str = "randn";

/// (dimension, worker_count, problem_size), one row per dimension in the batch
pub const SIZING: [(u32, u32, u32); 4] = [(2, 6, 200), (3, 6, 100), (4, 8, 50), (5, 8, 20)];

/// built-in batch: every decomposition against every dimension, decomposition-major
pub static DEFAULT_JOBS: Lazy<Vec<JobDescriptor>> = Lazy::new(|| {
    iproduct!(Decomposition::ALL, SIZING)
        .map(
            |(decomposition, (dimension, worker_count, problem_size))| JobDescriptor {
                worker_count,
                algorithm: ALGORITHM.to_owned(),
                problem_size,
                method: METHOD.to_owned(),
                decomposition,
                distribution: DISTRIBUTION.to_owned(),
                dimension,
            },
        )
        .collect_vec()
});

pub fn default_jobs() -> Vec<JobDescriptor> {
    DEFAULT_JOBS.clone()
}
