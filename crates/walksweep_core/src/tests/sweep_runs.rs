//! Tests for whole sweeps recorded to the in-memory tracker
//!
//! These tests verify that:
//! - Every configuration is run exactly once and closed as finished
//! - Each run records 100 ordered observations matching its trajectory
//! - Results do not depend on the number of workers
//! - A failing run is reported without stopping the others
//! - A run interrupted mid-trajectory keeps the steps it already recorded

use std::num::NonZeroUsize;

use crate::error::{SimulationError, SweepError, TrackingError};
use crate::executor::{SweepProgress, WorkerPool, run_sweep, run_sweep_with_progress};
use crate::simulation::{EPOCHS, METRIC_KEY, simulate_trajectory};
use crate::sweep::{RunConfig, SweepSpec};
use crate::tracking::{MemoryTracker, ParamValue, RecordedRun, RunStatus};

fn pool(workers: usize) -> WorkerPool {
    WorkerPool::new(NonZeroUsize::new(workers).unwrap())
}

fn config_of(run: &RecordedRun) -> RunConfig {
    let seed = match run.params["seed"] {
        ParamValue::Int(v) => v as u64,
        ref other => panic!("unexpected seed param {other:?}"),
    };
    let float = |key: &str| match run.params[key] {
        ParamValue::Float(v) => v,
        ref other => panic!("unexpected {key} param {other:?}"),
    };
    RunConfig::new(seed, float("x0"), float("sigma"))
}

fn sort_key(config: &RunConfig) -> (u64, u64, u64) {
    (config.seed, config.x0.to_bits(), config.sigma.to_bits())
}

/// Test that the default sweep records all twelve runs completely
#[test]
fn test_default_sweep_records_every_run() {
    let tracker = MemoryTracker::new();
    let spec = SweepSpec::default();

    let report = run_sweep(&spec, &tracker, &pool(4)).unwrap();
    assert_eq!(report.total, 12);
    assert_eq!(report.completed(), 12);

    let runs = tracker.runs();
    assert_eq!(runs.len(), 12);

    let mut recorded: Vec<RunConfig> = runs.iter().map(config_of).collect();
    recorded.sort_by_key(sort_key);
    let expected: Vec<RunConfig> = spec.configurations().collect();
    assert_eq!(recorded, expected);

    for run in &runs {
        assert_eq!(run.status, RunStatus::Finished);
        assert_eq!(run.end_calls, 1);

        let history = run.metric_history(METRIC_KEY);
        assert_eq!(history.len(), EPOCHS);
        let steps: Vec<u64> = history.iter().map(|(step, _)| *step).collect();
        assert_eq!(steps, (0..EPOCHS as u64).collect::<Vec<_>>());
    }
}

/// Test that every recorded series is the trajectory of its own parameters
#[test]
fn test_recorded_series_match_trajectories() {
    let tracker = MemoryTracker::new();
    run_sweep(&SweepSpec::default(), &tracker, &pool(3)).unwrap();

    for run in tracker.runs() {
        let trajectory = simulate_trajectory(&config_of(&run));
        let recorded: Vec<f64> = run
            .metric_history(METRIC_KEY)
            .iter()
            .map(|(_, x)| *x)
            .collect();
        assert_eq!(recorded.as_slice(), trajectory.values());
    }
}

/// Test that the report is identical regardless of pool size
#[test]
fn test_results_independent_of_worker_count() {
    let spec = SweepSpec::with_seed_count(5, vec![0.0, 1.0], vec![0.5, 1.0]);

    let serial = run_sweep(&spec, &MemoryTracker::new(), &pool(1)).unwrap();
    let parallel = run_sweep(&spec, &MemoryTracker::new(), &pool(8)).unwrap();

    let finals = |report: &crate::executor::SweepReport| -> Vec<(RunConfig, f64)> {
        report
            .runs
            .iter()
            .map(|r| (r.config, r.final_value))
            .collect()
    };
    assert_eq!(finals(&serial), finals(&parallel));

    let order: Vec<RunConfig> = serial.runs.iter().map(|r| r.config).collect();
    assert_eq!(order, spec.configurations().collect::<Vec<_>>());
}

/// Test that an empty sweep succeeds without opening any run
#[test]
fn test_empty_sweep() {
    let tracker = MemoryTracker::new();
    let spec = SweepSpec::new(vec![], vec![1.0, 1.5], vec![0.1, 0.2]);

    let report = run_sweep(&spec, &tracker, &pool(2)).unwrap();
    assert_eq!(report.total, 0);
    assert!(report.runs.is_empty());
    assert!(tracker.runs().is_empty());
}

/// Test that failing runs are reported while the rest still complete
#[test]
fn test_partial_failure_reports_every_failed_run() {
    let tracker = MemoryTracker::new();
    tracker.reject_param("seed", ParamValue::Int(1));

    let result = run_sweep(&SweepSpec::default(), &tracker, &pool(4));
    let Err(SweepError::RunsFailed { total, failures }) = result else {
        panic!("expected failed runs");
    };

    assert_eq!(total, 12);
    assert_eq!(failures.len(), 4);
    assert!(failures.iter().all(|f| f.config.seed == 1));

    let runs = tracker.runs();
    assert_eq!(runs.len(), 12);
    let finished = runs
        .iter()
        .filter(|r| r.status == RunStatus::Finished)
        .count();
    let failed = runs.iter().filter(|r| r.status == RunStatus::Failed).count();
    assert_eq!(finished, 8);
    assert_eq!(failed, 4);
    assert!(runs.iter().all(|r| r.end_calls == 1));
}

/// Test that a metric write failure fails the run but keeps earlier steps
#[test]
fn test_mid_trajectory_failure_keeps_recorded_steps() {
    let tracker = MemoryTracker::new();
    tracker.reject_metrics_at(40);

    let result = run_sweep(&SweepSpec::default(), &tracker, &pool(4));
    let Err(SweepError::RunsFailed { total, failures }) = result else {
        panic!("expected failed runs");
    };
    assert_eq!(total, 12);
    assert_eq!(failures.len(), 12);
    assert!(failures.iter().all(|f| matches!(
        f.error,
        SimulationError::Tracking(TrackingError::Unavailable(_))
    )));

    let runs = tracker.runs();
    assert_eq!(runs.len(), 12);
    for run in &runs {
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.end_calls, 1);

        let trajectory = simulate_trajectory(&config_of(run));
        let expected: Vec<(u64, f64)> = trajectory.steps().take(40).collect();
        assert_eq!(run.metric_history(METRIC_KEY), expected.as_slice());
    }
}

/// Test that an unreachable tracker fails every run before any step
#[test]
fn test_unavailable_tracker_fails_sweep() {
    let tracker = MemoryTracker::new();
    tracker.set_unavailable(true);

    let result = run_sweep(&SweepSpec::default(), &tracker, &pool(2));
    let Err(SweepError::RunsFailed { failures, .. }) = result else {
        panic!("expected failed runs");
    };

    assert_eq!(failures.len(), 12);
    assert!(failures.iter().all(|f| matches!(
        f.error,
        SimulationError::Tracking(TrackingError::Unavailable(_))
    )));
    assert!(tracker.runs().is_empty());
}

/// Test that progress counts every run, failed or not
#[test]
fn test_progress_reaches_total() {
    let tracker = MemoryTracker::new();
    tracker.reject_param("sigma", ParamValue::Float(0.2));
    let progress = SweepProgress::default();

    let result = run_sweep_with_progress(&SweepSpec::default(), &tracker, &pool(4), &progress);
    assert!(result.is_err());
    assert_eq!(progress.total(), 12);
    assert_eq!(progress.completed(), 12);
}
