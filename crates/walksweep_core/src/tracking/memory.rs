//! In-memory tracker shared across worker threads

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{ParamValue, RunRecorder, RunStatus, Tracker, validate_key};
use crate::error::TrackingError;

/// Everything recorded for one run
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRun {
    pub run_id: String,
    pub status: RunStatus,
    pub params: BTreeMap<String, ParamValue>,
    /// Metric key -> (step, value) in the order logged
    pub metrics: BTreeMap<String, Vec<(u64, f64)>>,
    /// How many times the run was closed
    pub end_calls: usize,
}

impl RecordedRun {
    pub fn metric_history(&self, key: &str) -> &[(u64, f64)] {
        self.metrics.get(key).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    runs: Vec<RecordedRun>,
    unavailable: bool,
    rejected_param: Option<(String, ParamValue)>,
    rejected_step: Option<u64>,
}

/// Tracker that keeps every run in memory.
///
/// Cloning yields another handle to the same store. Failure modes can be
/// switched on to exercise error paths.
#[derive(Debug, Clone, Default)]
pub struct MemoryTracker {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `start_run` fail
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Reject `log_params` for runs carrying `key = value`
    pub fn reject_param(&self, key: &str, value: ParamValue) {
        self.lock().rejected_param = Some((key.to_string(), value));
    }

    /// Reject `log_metrics` at `step` for every run
    pub fn reject_metrics_at(&self, step: u64) {
        self.lock().rejected_step = Some(step);
    }

    /// Snapshot of all runs in the order they were started
    pub fn runs(&self) -> Vec<RecordedRun> {
        self.lock().runs.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Tracker for MemoryTracker {
    type Run = MemoryRun;

    fn start_run(&self) -> Result<MemoryRun, TrackingError> {
        let mut state = self.lock();
        if state.unavailable {
            return Err(TrackingError::Unavailable(
                "memory tracker is switched off".to_string(),
            ));
        }

        let index = state.runs.len();
        let run_id = format!("run-{index}");
        state.runs.push(RecordedRun {
            run_id: run_id.clone(),
            status: RunStatus::Running,
            params: BTreeMap::new(),
            metrics: BTreeMap::new(),
            end_calls: 0,
        });

        Ok(MemoryRun {
            state: Arc::clone(&self.state),
            index,
            run_id,
            closed: false,
        })
    }
}

/// Run handle produced by [`MemoryTracker`]
#[derive(Debug)]
pub struct MemoryRun {
    state: Arc<Mutex<MemoryState>>,
    index: usize,
    run_id: String,
    closed: bool,
}

impl MemoryRun {
    fn check_open(&self) -> Result<(), TrackingError> {
        if self.closed {
            Err(TrackingError::RunClosed(self.run_id.clone()))
        } else {
            Ok(())
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RunRecorder for MemoryRun {
    fn run_id(&self) -> &str {
        &self.run_id
    }

    fn log_params(&mut self, params: &BTreeMap<String, ParamValue>) -> Result<(), TrackingError> {
        self.check_open()?;
        for key in params.keys() {
            validate_key(key)?;
        }

        let mut state = self.lock();
        if let Some((key, value)) = &state.rejected_param
            && params.get(key) == Some(value)
        {
            return Err(TrackingError::Unavailable(format!(
                "write rejected for {key}={value}"
            )));
        }

        let run = &mut state.runs[self.index];
        for (key, value) in params {
            run.params.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn log_metrics(&mut self, metrics: &[(&str, f64)], step: u64) -> Result<(), TrackingError> {
        self.check_open()?;
        for (key, _) in metrics {
            validate_key(key)?;
        }

        let mut state = self.lock();
        if state.rejected_step == Some(step) {
            return Err(TrackingError::Unavailable(format!(
                "metric write rejected at step {step}"
            )));
        }

        let run = &mut state.runs[self.index];
        for (key, value) in metrics {
            run.metrics
                .entry((*key).to_string())
                .or_default()
                .push((step, *value));
        }
        Ok(())
    }

    fn end(&mut self, status: RunStatus) -> Result<(), TrackingError> {
        self.check_open()?;
        self.closed = true;

        let mut state = self.lock();
        let run = &mut state.runs[self.index];
        run.status = status;
        run.end_calls += 1;
        Ok(())
    }
}
