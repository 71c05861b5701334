//! Random-walk simulation and its tracked runner.
//!
//! Each step adds a standard-normal draw scaled by `sigma` to the current
//! value, so `x' ~ N(x, sigma^2)`. The generator is seeded from the run's
//! seed alone, which makes every trajectory reproducible.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::error::SimulationError;
use crate::sweep::RunConfig;
use crate::tracking::{RunScope, Tracker};

/// Steps per trajectory
pub const EPOCHS: usize = 100;

/// Name under which the walk's value is recorded
pub const METRIC_KEY: &str = "x";

/// Step-by-step random walk. Yields `(epoch, x)` after each update, starting
/// at epoch 0; the initial value itself is never yielded.
#[derive(Debug, Clone)]
pub struct RandomWalk {
    rng: StdRng,
    x: f64,
    sigma: f64,
    epoch: u64,
}

impl RandomWalk {
    pub fn new(config: &RunConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(config.seed),
            x: config.x0,
            sigma: config.sigma,
            epoch: 0,
        }
    }
}

impl Iterator for RandomWalk {
    type Item = (u64, f64);

    fn next(&mut self) -> Option<Self::Item> {
        let z: f64 = self.rng.sample(StandardNormal);
        self.x += self.sigma * z;

        let step = (self.epoch, self.x);
        self.epoch += 1;
        Some(step)
    }
}

/// The values of one run, indexed by epoch
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    values: Vec<f64>,
}

impl Trajectory {
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate `(epoch, x)` pairs in step order
    pub fn steps(&self) -> impl Iterator<Item = (u64, f64)> + '_ {
        self.values.iter().enumerate().map(|(i, &x)| (i as u64, x))
    }
}

/// Compute a full trajectory without recording it
pub fn simulate_trajectory(config: &RunConfig) -> Trajectory {
    Trajectory {
        values: RandomWalk::new(config).take(EPOCHS).map(|(_, x)| x).collect(),
    }
}

/// Outcome of a successfully recorded run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub config: RunConfig,
    pub run_id: String,
    pub final_value: f64,
}

/// Simulate one configuration and record it on `tracker`.
///
/// Parameters are recorded once, then one `x` observation per epoch. The run
/// is closed as finished on success and as failed on any error; no step is
/// computed if the run cannot be opened.
pub fn run_simulation<T>(config: &RunConfig, tracker: &T) -> Result<RunSummary, SimulationError>
where
    T: Tracker + ?Sized,
{
    println!("{config}");

    let mut scope = RunScope::begin(tracker)?;
    scope.log_params(&config.params())?;

    let mut final_value = config.x0;
    for (epoch, x) in RandomWalk::new(config).take(EPOCHS) {
        scope.log_metrics(&[(METRIC_KEY, x)], epoch)?;
        final_value = x;
    }

    let run_id = scope.run_id().to_string();
    scope.finish()?;
    tracing::debug!(%run_id, seed = config.seed, final_value, "run finished");

    Ok(RunSummary {
        config: *config,
        run_id,
        final_value,
    })
}
