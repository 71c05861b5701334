//! Tests for sweeps persisted to a tracking directory

use std::fs;
use std::num::NonZeroUsize;

use tempfile::TempDir;

use crate::executor::{WorkerPool, run_sweep};
use crate::simulation::{EPOCHS, METRIC_KEY, simulate_trajectory};
use crate::sweep::{RunConfig, SweepSpec};
use crate::tracking::{FileStore, ParamValue, RunStatus};

/// Test that a parallel sweep leaves one complete run directory per configuration
#[test]
fn test_parallel_sweep_persists_all_runs() {
    let temp_dir = TempDir::new().unwrap();
    let store = FileStore::open(temp_dir.path().join("mlruns"), "Default").unwrap();
    let pool = WorkerPool::new(NonZeroUsize::new(4).unwrap());

    let report = run_sweep(&SweepSpec::default(), &store, &pool).unwrap();
    assert_eq!(report.completed(), 12);

    let runs = store.runs().unwrap();
    assert_eq!(runs.len(), 12);

    for run in &runs {
        assert_eq!(run.meta.status, RunStatus::Finished);
        assert!(run.meta.end_time.unwrap() >= run.meta.start_time);

        let ParamValue::Int(seed) = run.params["seed"] else {
            panic!("seed should be stored as an integer");
        };
        let ParamValue::Float(x0) = run.params["x0"] else {
            panic!("x0 should be stored as a float");
        };
        let ParamValue::Float(sigma) = run.params["sigma"] else {
            panic!("sigma should be stored as a float");
        };
        let trajectory = simulate_trajectory(&RunConfig::new(seed as u64, x0, sigma));

        let history = run.metric_history(METRIC_KEY);
        assert_eq!(history.len(), EPOCHS);
        for (epoch, point) in history.iter().enumerate() {
            assert_eq!(point.step, epoch as u64);
            assert_eq!(point.value, trajectory.values()[epoch]);
        }
    }
}

/// Test the on-disk text of parameters and metric lines
#[test]
fn test_on_disk_layout() {
    let temp_dir = TempDir::new().unwrap();
    let store = FileStore::open(temp_dir.path(), "Default").unwrap();
    let pool = WorkerPool::new(NonZeroUsize::MIN);
    let spec = SweepSpec::new(vec![0], vec![1.0], vec![0.1]);

    let report = run_sweep(&spec, &store, &pool).unwrap();
    let run_dir = temp_dir.path().join("0").join(&report.runs[0].run_id);

    assert_eq!(fs::read_to_string(run_dir.join("params/seed")).unwrap(), "0");
    assert_eq!(fs::read_to_string(run_dir.join("params/x0")).unwrap(), "1.0");
    assert_eq!(fs::read_to_string(run_dir.join("params/sigma")).unwrap(), "0.1");
    assert!(run_dir.join("tags").is_dir());

    let metrics = fs::read_to_string(run_dir.join("metrics/x")).unwrap();
    let lines: Vec<&str> = metrics.lines().collect();
    assert_eq!(lines.len(), EPOCHS);
    let first: Vec<&str> = lines[0].split(' ').collect();
    assert_eq!(first.len(), 3);
    assert_eq!(first[2], "0");
    assert!(lines[EPOCHS - 1].ends_with(" 99"));

    let meta = fs::read_to_string(run_dir.join("meta.yaml")).unwrap();
    assert!(meta.contains("FINISHED"));
}
