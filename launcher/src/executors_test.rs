use crate::{
    config::LauncherConfig,
    executors::{
        CollectingExecutor, DetachedExecutor, DryRunExecutor, ExecutorError, ExecutorOptions,
        Executors, JobOutcome,
    },
    table::DEFAULT_JOBS,
};
use nix::unistd::{getsid, Pid};
use std::{
    fs,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};
use tempfile::TempDir;

/// `sh <script> <workers> python bulk_test.py ...`, the script stands in for the real launcher
/// and is read by the shell instead of being executed directly
fn fake_launcher(dir: &Path, body: &str) -> LauncherConfig {
    let script = dir.join("fake-launcher.sh");
    fs::write(&script, body).unwrap();

    LauncherConfig {
        launcher: PathBuf::from("sh"),
        worker_flag: script.to_string_lossy().into_owned(),
        ..LauncherConfig::default()
    }
}

fn with_launcher(launcher: &str) -> LauncherConfig {
    LauncherConfig {
        launcher: PathBuf::from(launcher),
        ..LauncherConfig::default()
    }
}

fn log_dir() -> TempDir {
    tempfile::tempdir().unwrap()
}

#[test]
pub fn every_job_gets_its_own_log() {
    let dir = log_dir();
    let executor = DetachedExecutor::load(with_launcher("echo"), dir.path().to_path_buf());

    let spawned = executor.spawn_all(&DEFAULT_JOBS);
    assert_eq!(spawned.len(), 12);

    for (_, result) in spawned {
        result.unwrap().child.wait().unwrap();
    }

    // echo swallows the leading -n, what's left is the rest of the invocation
    assert_eq!(
        fs::read_to_string(dir.path().join("qrt4.out")).unwrap(),
        "8 python bulk_test.py macaulayreduction 50 mult qrt randn 4"
    );
    assert_eq!(
        fs::read_to_string(dir.path().join("svd2.out")).unwrap(),
        "6 python bulk_test.py macaulayreduction 200 mult svd randn 2"
    );

    for job in DEFAULT_JOBS.iter() {
        assert!(dir.path().join(job.log_path()).is_file());
    }
}

#[test]
pub fn stdout_and_stderr_share_the_log() {
    let dir = log_dir();
    let config = fake_launcher(dir.path(), "echo \"workers $1\"\necho \"dimension $9\" >&2\n");
    let executor = DetachedExecutor::load(config, dir.path().to_path_buf());

    let mut spawned = executor.spawn(&DEFAULT_JOBS[0]).unwrap();
    spawned.child.wait().unwrap();

    assert_eq!(
        fs::read_to_string(dir.path().join("tvb2.out")).unwrap(),
        "workers 6\ndimension 2\n"
    );
}

#[test]
pub fn existing_log_is_truncated() {
    let dir = log_dir();
    let log = dir.path().join("tvb2.out");
    fs::write(&log, "stale output from an earlier run\n".repeat(64)).unwrap();

    let executor = DetachedExecutor::load(with_launcher("echo"), dir.path().to_path_buf());
    let mut spawned = executor.spawn(&DEFAULT_JOBS[0]).unwrap();
    spawned.child.wait().unwrap();

    assert_eq!(
        fs::read_to_string(&log).unwrap(),
        "6 python bulk_test.py macaulayreduction 200 mult tvb randn 2"
    );
}

#[test]
pub fn launching_does_not_wait() {
    let dir = log_dir();
    let config = fake_launcher(dir.path(), "sleep 5\n");
    let executor = DetachedExecutor::load(config, dir.path().to_path_buf());

    let start = Instant::now();
    let spawned = executor.spawn_all(&DEFAULT_JOBS);
    assert!(start.elapsed() < Duration::from_secs(3));

    for (_, result) in spawned {
        let mut spawned = result.unwrap();
        assert_eq!(spawned.child.try_wait().unwrap(), None);

        spawned.child.kill().unwrap();
        spawned.child.wait().unwrap();
    }
}

#[test]
pub fn jobs_run_in_their_own_session() {
    let dir = log_dir();
    let config = fake_launcher(dir.path(), "sleep 5\n");
    let executor = DetachedExecutor::load(config, dir.path().to_path_buf());

    let mut spawned = executor.spawn(&DEFAULT_JOBS[0]).unwrap();
    let pid = Pid::from_raw(spawned.child.id() as i32);

    assert_eq!(getsid(Some(pid)).unwrap(), pid);
    assert_ne!(getsid(None).unwrap(), pid);

    spawned.child.kill().unwrap();
    spawned.child.wait().unwrap();
}

#[test]
pub fn spawn_failures_do_not_stop_the_batch() {
    let dir = log_dir();
    let mut executor = DetachedExecutor::load(
        with_launcher("surely-not-a-real-launcher"),
        dir.path().to_path_buf(),
    );

    let report = executor.execute(&DEFAULT_JOBS);

    assert_eq!(report.outcomes.len(), 12);
    assert_eq!(report.failures(), 12);
    assert!(report
        .outcomes
        .iter()
        .all(|(_, outcome)| matches!(outcome, JobOutcome::SpawnFailed(_))));
    // the log is created before the spawn is attempted
    assert!(dir.path().join("svd5.out").is_file());
}

#[test]
pub fn missing_log_dir_fails_spawn() {
    let dir = log_dir();
    let executor = DetachedExecutor::load(with_launcher("echo"), dir.path().join("missing"));

    assert!(matches!(
        executor.spawn(&DEFAULT_JOBS[0]),
        Err(ExecutorError::CreateLog { .. })
    ));
}

#[test]
pub fn detached_report_lists_pids() {
    let dir = log_dir();
    let mut executor = DetachedExecutor::load(with_launcher("true"), dir.path().to_path_buf());

    let report = executor.execute(&DEFAULT_JOBS);

    assert!(report.is_success());
    assert!(report
        .outcomes
        .iter()
        .all(|(_, outcome)| matches!(outcome, JobOutcome::Spawned { .. })));
}

#[test]
pub fn collecting_reports_exit_codes() {
    let dir = log_dir();
    let mut executor = CollectingExecutor::load(
        DetachedExecutor::load(with_launcher("true"), dir.path().to_path_buf()),
        None,
    );

    let report = executor.execute(&DEFAULT_JOBS).unwrap();
    assert!(report.is_success());
    assert!(report
        .outcomes
        .iter()
        .all(|(_, outcome)| matches!(outcome, JobOutcome::Exited { code: 0, .. })));

    let mut executor = CollectingExecutor::load(
        DetachedExecutor::load(with_launcher("false"), dir.path().to_path_buf()),
        Some(Duration::from_secs(30)),
    );

    let report = executor.execute(&DEFAULT_JOBS).unwrap();
    assert_eq!(report.failures(), 12);
    // order follows the table, not completion
    assert_eq!(
        report.outcomes.iter().map(|(job, _)| job.clone()).collect::<Vec<_>>(),
        *DEFAULT_JOBS
    );
}

#[test]
pub fn collecting_leaves_slow_jobs_running() {
    let dir = log_dir();
    let config = fake_launcher(
        dir.path(),
        "if [ \"$9\" = 2 ]; then sleep 4; fi\nexit 0\n",
    );
    let mut executor = CollectingExecutor::load(
        DetachedExecutor::load(config, dir.path().to_path_buf()),
        Some(Duration::from_secs(1)),
    );

    let start = Instant::now();
    let report = executor.execute(&DEFAULT_JOBS).unwrap();

    // each wait has its own thread, so the timeouts overlap
    assert!(start.elapsed() < Duration::from_millis(3500));
    assert_eq!(report.failures(), 3);
    for (job, outcome) in report.outcomes {
        if job.dimension == 2 {
            assert_eq!(outcome, JobOutcome::TimedOut);
        } else {
            assert!(matches!(outcome, JobOutcome::Exited { code: 0, .. }));
        }
    }
}

#[test]
pub fn collecting_reports_signals() {
    let dir = log_dir();
    let config = fake_launcher(dir.path(), "kill -TERM $$\n");
    let mut executor = CollectingExecutor::load(
        DetachedExecutor::load(config, dir.path().to_path_buf()),
        None,
    );

    let report = executor.execute(&DEFAULT_JOBS[..1]).unwrap();

    assert!(matches!(
        report.outcomes[0].1,
        JobOutcome::Signalled { signal: 15, .. }
    ));
}

#[test]
pub fn dry_run_prints_without_spawning() {
    let mut executor = DryRunExecutor::load(LauncherConfig::default(), PathBuf::new());
    let mut out = Vec::new();

    let report = executor.execute(&DEFAULT_JOBS, &mut out).unwrap();
    let printed = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = printed.lines().collect();

    assert_eq!(lines.len(), 12);
    assert!(lines.contains(
        &"mpiexec -n 8 python bulk_test.py macaulayreduction 50 mult qrt randn 4 > qrt4.out 2>&1 &"
    ));
    assert!(lines.contains(
        &"mpiexec -n 6 python bulk_test.py macaulayreduction 200 mult svd randn 2 > svd2.out 2>&1 &"
    ));
    assert!(report
        .outcomes
        .iter()
        .all(|(_, outcome)| *outcome == JobOutcome::Printed));
}

#[test]
pub fn dry_run_prefixes_log_dir() {
    let dir = log_dir();
    let mut executor = DryRunExecutor::load(LauncherConfig::default(), dir.path().join("logs"));
    let mut out = Vec::new();

    executor.execute(&DEFAULT_JOBS[..1], &mut out).unwrap();

    let expected = format!("> {}/logs/tvb2.out 2>&1 &\n", dir.path().display());
    assert!(String::from_utf8(out).unwrap().ends_with(&expected));
    // nothing is created, not even the log directory
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
pub fn executor_selection() {
    let options = ExecutorOptions::default();
    assert!(matches!(
        Executors::load(LauncherConfig::default(), &options),
        Executors::Detached(_)
    ));

    let options = ExecutorOptions {
        wait: true,
        ..ExecutorOptions::default()
    };
    assert!(matches!(
        Executors::load(LauncherConfig::default(), &options),
        Executors::Collecting(_)
    ));

    let options = ExecutorOptions {
        dry_run: true,
        wait: true,
        ..ExecutorOptions::default()
    };
    assert!(matches!(
        Executors::load(LauncherConfig::default(), &options),
        Executors::DryRun(_)
    ));
}

#[test]
pub fn dry_run_quotes_log_dir_with_spaces() {
    let mut executor = DryRunExecutor::load(LauncherConfig::default(), PathBuf::from("my logs"));
    let mut out = Vec::new();

    executor.execute(&DEFAULT_JOBS[6..7], &mut out).unwrap();

    assert_eq!(
        String::from_utf8(out).unwrap(),
        "mpiexec -n 8 python bulk_test.py macaulayreduction 50 mult qrt randn 4 > 'my logs/qrt4.out' 2>&1 &\n"
    );
}

#[test]
pub fn elapsed_covers_the_whole_child_lifetime() {
    let dir = log_dir();
    let config = fake_launcher(dir.path(), "sleep 1\n");
    let executor = DetachedExecutor::load(config.clone(), dir.path().to_path_buf());

    let before = Instant::now();
    let mut spawned = executor.spawn(&DEFAULT_JOBS[0]).unwrap();
    assert!(spawned.started >= before);
    assert!(spawned.started <= Instant::now());
    spawned.child.wait().unwrap();

    let mut executor = CollectingExecutor::load(
        DetachedExecutor::load(config, dir.path().to_path_buf()),
        None,
    );
    let report = executor.execute(&DEFAULT_JOBS[..1]).unwrap();

    match report.outcomes[0].1 {
        JobOutcome::Exited { code: 0, elapsed } => assert!(elapsed >= Duration::from_secs(1)),
        ref outcome => panic!("unexpected outcome {outcome:?}"),
    }
}
