//! Integration tests for the sweep engine
//!
//! Tests are organized by topic:
//! - `sweep_runs` - Whole sweeps against the in-memory tracker
//! - `file_store_sweep` - Whole sweeps persisted to a tracking directory

mod file_store_sweep;
mod sweep_runs;
