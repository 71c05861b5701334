use std::fmt;
use std::path::PathBuf;

use crate::executor::RunFailure;

/// Errors raised by a tracking backend
#[derive(Debug)]
pub enum TrackingError {
    /// Filesystem operation failed
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Stored metadata could not be parsed
    Parse { path: PathBuf, message: String },
    /// Metadata could not be serialized
    Serialize(String),
    /// Parameter or metric key cannot be stored
    InvalidKey(String),
    /// Backend refused to open a run
    Unavailable(String),
    /// Record was written to a run that has already been closed
    RunClosed(String),
    /// Requested run does not exist in the store
    RunNotFound(String),
}

impl TrackingError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TrackingError::Io {
            path: path.into(),
            source,
        }
    }
}

impl fmt::Display for TrackingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackingError::Io { path, source } => {
                write!(f, "tracking I/O error at {}: {source}", path.display())
            }
            TrackingError::Parse { path, message } => {
                write!(f, "failed to parse {}: {message}", path.display())
            }
            TrackingError::Serialize(msg) => write!(f, "failed to serialize run metadata: {msg}"),
            TrackingError::InvalidKey(key) => write!(f, "invalid tracking key {key:?}"),
            TrackingError::Unavailable(msg) => write!(f, "tracking backend unavailable: {msg}"),
            TrackingError::RunClosed(run_id) => write!(f, "run {run_id} is already closed"),
            TrackingError::RunNotFound(run_id) => write!(f, "run {run_id} not found"),
        }
    }
}

impl std::error::Error for TrackingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TrackingError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Errors raised while running a single simulation
#[derive(Debug)]
pub enum SimulationError {
    Tracking(TrackingError),
}

impl fmt::Display for SimulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationError::Tracking(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for SimulationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimulationError::Tracking(e) => Some(e),
        }
    }
}

impl From<TrackingError> for SimulationError {
    fn from(err: TrackingError) -> Self {
        SimulationError::Tracking(err)
    }
}

/// Errors raised by a sweep as a whole
#[derive(Debug)]
pub enum SweepError {
    /// Worker pool could not be created
    PoolBuild(String),
    /// One or more runs failed; every other run was still attempted
    RunsFailed {
        total: usize,
        failures: Vec<RunFailure>,
    },
}

impl fmt::Display for SweepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepError::PoolBuild(msg) => write!(f, "failed to build worker pool: {msg}"),
            SweepError::RunsFailed { total, failures } => {
                write!(f, "{} of {total} runs failed", failures.len())?;
                if let Some(first) = failures.first() {
                    write!(f, " (first: {first})")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for SweepError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SweepError::RunsFailed { failures, .. } => failures
                .first()
                .map(|failure| &failure.error as &(dyn std::error::Error + 'static)),
            SweepError::PoolBuild(_) => None,
        }
    }
}
