//! Sweep enumeration: the Cartesian grid of run configurations.
//!
//! Runs are ordered with seeds varying slowest, then `x0`, then `sigma`
//! (row-major over the `[seeds, x0s, sigmas]` shape). Runs are independent so
//! the order carries no meaning beyond reproducibility.

use std::collections::BTreeMap;
use std::fmt;

use crate::tracking::ParamValue;

/// Number of seeds in the default sweep
pub const DEFAULT_SEED_COUNT: u64 = 3;
/// Initial values in the default sweep
pub const DEFAULT_X0S: [f64; 2] = [1.0, 1.5];
/// Noise strengths in the default sweep
pub const DEFAULT_SIGMAS: [f64; 2] = [0.1, 0.2];

/// Inputs of a single simulation run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunConfig {
    /// Seed for the run's random number generator
    pub seed: u64,
    /// Initial value of the walk
    pub x0: f64,
    /// Standard deviation of each step
    pub sigma: f64,
}

impl RunConfig {
    pub fn new(seed: u64, x0: f64, sigma: f64) -> Self {
        Self { seed, x0, sigma }
    }

    /// Parameters recorded for the run, keyed by name. Seeds beyond the
    /// signed range are recorded as text.
    pub fn params(&self) -> BTreeMap<String, ParamValue> {
        let seed = i64::try_from(self.seed)
            .map(ParamValue::Int)
            .unwrap_or_else(|_| ParamValue::Text(self.seed.to_string()));
        BTreeMap::from([
            ("seed".to_string(), seed),
            ("x0".to_string(), ParamValue::Float(self.x0)),
            ("sigma".to_string(), ParamValue::Float(self.sigma)),
        ])
    }
}

impl fmt::Display for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "seed: {} x0: {:?} sigma: {:?}",
            self.seed, self.x0, self.sigma
        )
    }
}

/// The value lists a sweep is built from
#[derive(Debug, Clone, PartialEq)]
pub struct SweepSpec {
    pub seeds: Vec<u64>,
    pub x0s: Vec<f64>,
    pub sigmas: Vec<f64>,
}

impl Default for SweepSpec {
    fn default() -> Self {
        Self::with_seed_count(
            DEFAULT_SEED_COUNT,
            DEFAULT_X0S.to_vec(),
            DEFAULT_SIGMAS.to_vec(),
        )
    }
}

impl SweepSpec {
    pub fn new(seeds: Vec<u64>, x0s: Vec<f64>, sigmas: Vec<f64>) -> Self {
        Self { seeds, x0s, sigmas }
    }

    /// Sweep over seeds `0..seed_count`
    pub fn with_seed_count(seed_count: u64, x0s: Vec<f64>, sigmas: Vec<f64>) -> Self {
        Self::new((0..seed_count).collect(), x0s, sigmas)
    }

    /// Shape of the grid as `[seeds, x0s, sigmas]`
    pub fn shape(&self) -> [usize; 3] {
        [self.seeds.len(), self.x0s.len(), self.sigmas.len()]
    }

    /// Total number of runs in the sweep
    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lazily enumerate every run configuration in sweep order
    pub fn configurations(&self) -> impl Iterator<Item = RunConfig> + '_ {
        self.seeds.iter().flat_map(move |&seed| {
            self.x0s.iter().flat_map(move |&x0| {
                self.sigmas
                    .iter()
                    .map(move |&sigma| RunConfig::new(seed, x0, sigma))
            })
        })
    }
}
