//! Experiment tracking collaborators.
//!
//! A [`Tracker`] opens runs; each run is a [`RunRecorder`] that accepts
//! parameters once and metric observations per step. Callers hold runs
//! through a [`RunScope`], which guarantees the run is closed on every exit
//! path: explicitly as finished or failed, or as failed when dropped during
//! an early return or unwind.
//!
//! Trackers are passed explicitly to every run. There is no ambient session.

mod file_store;
mod memory;

pub use file_store::{ExperimentMeta, FileRun, FileStore, MetricPoint, RunMeta, StoredRun};
pub use memory::{MemoryRun, MemoryTracker, RecordedRun};

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TrackingError;

/// Scalar parameter value attached to a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v:?}"),
            ParamValue::Text(v) => f.write_str(v),
        }
    }
}

/// Lifecycle state of a tracked run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Finished,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Finished => "FINISHED",
            RunStatus::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// A backend that can open runs.
///
/// Implementations must tolerate `start_run` and the resulting recorders being
/// used from several worker threads at once.
pub trait Tracker: Sync {
    type Run: RunRecorder;

    /// Open a new run in the `Running` state
    fn start_run(&self) -> Result<Self::Run, TrackingError>;
}

/// An open run accepting records
pub trait RunRecorder {
    fn run_id(&self) -> &str;

    fn log_params(&mut self, params: &BTreeMap<String, ParamValue>) -> Result<(), TrackingError>;

    /// Record metric values observed at `step`
    fn log_metrics(&mut self, metrics: &[(&str, f64)], step: u64) -> Result<(), TrackingError>;

    /// Close the run with a terminal status. Records after this call fail.
    fn end(&mut self, status: RunStatus) -> Result<(), TrackingError>;
}

/// Scoped handle that closes its run exactly once
pub struct RunScope<R: RunRecorder> {
    run: R,
    closed: bool,
}

impl<R: RunRecorder> RunScope<R> {
    /// Open a run on `tracker`
    pub fn begin<T>(tracker: &T) -> Result<Self, TrackingError>
    where
        T: Tracker<Run = R> + ?Sized,
    {
        let run = tracker.start_run()?;
        tracing::debug!(run_id = run.run_id(), "run started");
        Ok(Self { run, closed: false })
    }

    pub fn run_id(&self) -> &str {
        self.run.run_id()
    }

    pub fn log_params(
        &mut self,
        params: &BTreeMap<String, ParamValue>,
    ) -> Result<(), TrackingError> {
        self.run.log_params(params)
    }

    pub fn log_metrics(&mut self, metrics: &[(&str, f64)], step: u64) -> Result<(), TrackingError> {
        self.run.log_metrics(metrics, step)
    }

    /// Close the run as finished
    pub fn finish(mut self) -> Result<(), TrackingError> {
        self.close(RunStatus::Finished)
    }

    /// Stays open if the backend rejects the close, so a failed `finish`
    /// is retried as failed on drop.
    fn close(&mut self, status: RunStatus) -> Result<(), TrackingError> {
        self.run.end(status)?;
        self.closed = true;
        tracing::debug!(run_id = self.run.run_id(), %status, "run closed");
        Ok(())
    }
}

impl<R: RunRecorder> Drop for RunScope<R> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(err) = self.close(RunStatus::Failed) {
            tracing::warn!(run_id = self.run.run_id(), "failed to close abandoned run: {err}");
        }
    }
}

/// Check that a parameter or metric key is safe to use as a file name
pub fn validate_key(key: &str) -> Result<(), TrackingError> {
    let valid = !key.is_empty()
        && key != "."
        && key != ".."
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ' '));
    if valid {
        Ok(())
    } else {
        Err(TrackingError::InvalidKey(key.to_string()))
    }
}
