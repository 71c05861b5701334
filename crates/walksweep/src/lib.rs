//! Command-line front end for the random-walk sweep.
//!
//! Parses arguments, opens the tracking store and runs the sweep on a
//! worker pool sized from the command line.

pub mod logging;

use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::WrapErr;
use walksweep_core::sweep::{DEFAULT_SEED_COUNT, DEFAULT_SIGMAS, DEFAULT_X0S};
use walksweep_core::{FileStore, SweepReport, SweepSpec, WorkerPool, run_sweep};

pub use logging::init_logging;

#[derive(Parser, Debug, Clone)]
#[command(name = "walksweep")]
#[command(about = "Run a grid of random-walk simulations and record them to an experiment store")]
pub struct Args {
    /// Number of parallel workers (default: available processing units)
    pub workers: Option<NonZeroUsize>,

    /// Directory of the tracking store
    #[arg(long, env = "WALKSWEEP_TRACKING_DIR", default_value = "mlruns")]
    pub tracking_dir: PathBuf,

    /// Experiment the runs are recorded under
    #[arg(long, default_value = "Default")]
    pub experiment: String,

    /// Number of seeds; runs use seeds 0..N
    #[arg(long, default_value_t = DEFAULT_SEED_COUNT)]
    pub seeds: u64,

    /// Initial values, comma separated
    #[arg(long = "x0", value_delimiter = ',', default_values_t = DEFAULT_X0S.to_vec())]
    pub x0s: Vec<f64>,

    /// Noise strengths, comma separated
    #[arg(long = "sigma", value_delimiter = ',', default_values_t = DEFAULT_SIGMAS.to_vec())]
    pub sigmas: Vec<f64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    pub fn sweep_spec(&self) -> SweepSpec {
        SweepSpec::with_seed_count(self.seeds, self.x0s.clone(), self.sigmas.clone())
    }

    pub fn worker_pool(&self) -> WorkerPool {
        self.workers
            .map(WorkerPool::new)
            .unwrap_or_else(WorkerPool::with_default_size)
    }
}

/// Run the sweep described by `args` against the file store
pub fn run(args: &Args) -> color_eyre::Result<SweepReport> {
    let store = FileStore::open(&args.tracking_dir, &args.experiment).wrap_err_with(|| {
        format!(
            "failed to open tracking store at {}",
            args.tracking_dir.display()
        )
    })?;

    let spec = args.sweep_spec();
    let pool = args.worker_pool();
    tracing::info!(
        runs = spec.len(),
        workers = pool.workers(),
        experiment = %store.experiment().name,
        "recording to {}",
        store.root().display()
    );

    let report = run_sweep(&spec, &store, &pool)?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_args() {
        let args = Args::try_parse_from(["walksweep"]).unwrap();
        assert_eq!(args.workers, None);
        assert_eq!(args.experiment, "Default");
        assert_eq!(args.sweep_spec(), SweepSpec::default());
        assert!(args.worker_pool().workers() >= 1);
    }

    #[test]
    fn test_worker_count_argument() {
        let args = Args::try_parse_from(["walksweep", "3"]).unwrap();
        assert_eq!(args.worker_pool().workers(), 3);
    }

    #[test]
    fn test_invalid_worker_count_rejected() {
        assert!(Args::try_parse_from(["walksweep", "many"]).is_err());
        assert!(Args::try_parse_from(["walksweep", "0"]).is_err());
        assert!(Args::try_parse_from(["walksweep", "-2"]).is_err());
        assert!(Args::try_parse_from(["walksweep", "1", "2"]).is_err());
    }

    #[test]
    fn test_grid_overrides() {
        let args = Args::try_parse_from([
            "walksweep",
            "--seeds",
            "2",
            "--x0",
            "0.0,2.0,4.0",
            "--sigma",
            "1.0",
        ])
        .unwrap();

        let spec = args.sweep_spec();
        assert_eq!(spec.seeds, vec![0, 1]);
        assert_eq!(spec.x0s, vec![0.0, 2.0, 4.0]);
        assert_eq!(spec.sigmas, vec![1.0]);
        assert_eq!(spec.len(), 6);

        assert!(Args::try_parse_from(["walksweep", "--sigma", "wide"]).is_err());
    }

    #[test]
    fn test_run_records_to_tracking_dir() {
        let temp_dir = TempDir::new().unwrap();
        let tracking_dir = temp_dir.path().join("mlruns");
        let args = Args::try_parse_from([
            "walksweep",
            "2",
            "--tracking-dir",
            tracking_dir.to_str().unwrap(),
            "--experiment",
            "cli",
        ])
        .unwrap();

        let report = run(&args).unwrap();
        assert_eq!(report.completed(), 12);

        let store = FileStore::open(&tracking_dir, "cli").unwrap();
        assert_eq!(store.runs().unwrap().len(), 12);
    }
}
