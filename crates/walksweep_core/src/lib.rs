//! Random-walk parameter sweep library
//!
//! This crate runs a grid of independent Brownian-motion simulations and
//! records each run's parameters and trajectory to an experiment tracker.
//! It supports:
//! - Cartesian sweeps over seeds, initial values and noise strengths
//! - Deterministic, seed-reproducible trajectories
//! - Pluggable tracking backends (file store, in-memory)
//! - Parallel execution on a fixed-size worker pool
//!
//! # Example
//!
//! ```ignore
//! use walksweep_core::{SweepSpec, WorkerPool, run_sweep};
//! use walksweep_core::tracking::FileStore;
//!
//! let store = FileStore::open("mlruns", "Default")?;
//! let pool = WorkerPool::with_default_size();
//! let report = run_sweep(&SweepSpec::default(), &store, &pool)?;
//! println!("{} runs recorded", report.completed());
//! ```

#![warn(clippy::all)]

// ============================================================================
// Core modules
// ============================================================================

pub mod error;
pub mod executor;
pub mod simulation;
pub mod sweep;
pub mod tracking;

// ============================================================================
// Test modules
// ============================================================================

#[cfg(test)]
mod tests;

// ============================================================================
// Public re-exports for convenience
// ============================================================================

pub use error::{SimulationError, SweepError, TrackingError};
pub use executor::{
    RunFailure, SweepProgress, SweepReport, WorkerPool, default_worker_count, run_sweep,
    run_sweep_with_progress,
};
pub use simulation::{
    EPOCHS, METRIC_KEY, RandomWalk, RunSummary, Trajectory, run_simulation, simulate_trajectory,
};
pub use sweep::{RunConfig, SweepSpec};
pub use tracking::{FileStore, MemoryTracker, ParamValue, RunRecorder, RunScope, RunStatus, Tracker};
