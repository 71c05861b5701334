//! Sweep execution on a fixed-size worker pool.
//!
//! Every run configuration becomes one task. Tasks share nothing but the
//! tracker handle and a progress counter, so they can run on any worker in
//! any order. A failed run never stops the others; failures are collected and
//! reported once every task has finished.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::available_parallelism;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::error::{SimulationError, SweepError};
use crate::simulation::{RunSummary, run_simulation};
use crate::sweep::{RunConfig, SweepSpec};
use crate::tracking::Tracker;

/// Number of processing units available to this process
pub fn default_worker_count() -> NonZeroUsize {
    available_parallelism().unwrap_or(NonZeroUsize::MIN)
}

/// Fixed-size pool that runs independent tasks to completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPool {
    workers: NonZeroUsize,
}

impl WorkerPool {
    pub fn new(workers: NonZeroUsize) -> Self {
        Self { workers }
    }

    /// One worker per available processing unit
    pub fn with_default_size() -> Self {
        Self::new(default_worker_count())
    }

    pub fn workers(&self) -> usize {
        self.workers.get()
    }

    /// Run every task and return their results in submission order.
    ///
    /// Returns only after all tasks have completed. A panicking task is
    /// re-raised on the calling thread after the pool has been torn down.
    #[cfg(feature = "parallel")]
    pub fn execute<T, F>(&self, tasks: Vec<F>) -> Result<Vec<T>, SweepError>
    where
        F: FnOnce() -> T + Send,
        T: Send,
    {
        if tasks.is_empty() {
            return Ok(Vec::new());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers())
            .thread_name(|i| format!("walksweep-worker-{i}"))
            .build()
            .map_err(|e| SweepError::PoolBuild(e.to_string()))?;

        Ok(pool.install(|| tasks.into_par_iter().map(|task| task()).collect()))
    }

    /// Run every task on the calling thread, in submission order
    #[cfg(not(feature = "parallel"))]
    pub fn execute<T, F>(&self, tasks: Vec<F>) -> Result<Vec<T>, SweepError>
    where
        F: FnOnce() -> T + Send,
        T: Send,
    {
        Ok(tasks.into_iter().map(|task| task()).collect())
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::with_default_size()
    }
}

/// Shared counter of finished runs
#[derive(Debug, Clone)]
pub struct SweepProgress {
    completed: Arc<AtomicUsize>,
    total: Arc<AtomicUsize>,
}

impl SweepProgress {
    #[must_use]
    pub fn new(total: usize) -> Self {
        Self {
            completed: Arc::new(AtomicUsize::new(0)),
            total: Arc::new(AtomicUsize::new(total)),
        }
    }

    /// Runs finished so far, successful or not
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    /// Record a finished run and return the new count
    pub fn increment(&self) -> usize {
        self.completed.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn reset(&self, total: usize) {
        self.completed.store(0, Ordering::Relaxed);
        self.total.store(total, Ordering::Relaxed);
    }
}

impl Default for SweepProgress {
    fn default() -> Self {
        Self::new(0)
    }
}

/// A run that did not complete
#[derive(Debug)]
pub struct RunFailure {
    pub config: RunConfig,
    pub error: SimulationError,
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run [{}] failed: {}", self.config, self.error)
    }
}

/// Outcome of a sweep in which every run succeeded
#[derive(Debug, Clone)]
pub struct SweepReport {
    pub total: usize,
    /// Summaries in sweep order
    pub runs: Vec<RunSummary>,
}

impl SweepReport {
    pub fn completed(&self) -> usize {
        self.runs.len()
    }
}

/// Simulate every configuration of `spec` on `pool`, recording to `tracker`
pub fn run_sweep<T>(
    spec: &SweepSpec,
    tracker: &T,
    pool: &WorkerPool,
) -> Result<SweepReport, SweepError>
where
    T: Tracker + ?Sized,
{
    run_sweep_with_progress(spec, tracker, pool, &SweepProgress::new(spec.len()))
}

/// Like [`run_sweep`], counting finished runs on `progress`
pub fn run_sweep_with_progress<T>(
    spec: &SweepSpec,
    tracker: &T,
    pool: &WorkerPool,
    progress: &SweepProgress,
) -> Result<SweepReport, SweepError>
where
    T: Tracker + ?Sized,
{
    let total = spec.len();
    progress.reset(total);
    tracing::info!(total, workers = pool.workers(), "starting sweep");

    let tasks: Vec<_> = spec
        .configurations()
        .map(|config| {
            move || {
                let outcome = run_simulation(&config, tracker);
                let done = progress.increment();
                tracing::debug!(done, total, seed = config.seed, "run complete");
                (config, outcome)
            }
        })
        .collect();

    let outcomes = pool.execute(tasks)?;

    let mut runs = Vec::with_capacity(outcomes.len());
    let mut failures = Vec::new();
    for (config, outcome) in outcomes {
        match outcome {
            Ok(summary) => runs.push(summary),
            Err(error) => {
                tracing::error!("run [{config}] failed: {error}");
                failures.push(RunFailure { config, error });
            }
        }
    }

    if !failures.is_empty() {
        tracing::warn!(failed = failures.len(), total, "sweep finished with failures");
        return Err(SweepError::RunsFailed { total, failures });
    }

    tracing::info!(completed = runs.len(), "sweep finished");
    Ok(SweepReport { total, runs })
}
