//! Directory-backed tracking store
//!
//! Directory structure:
//! mlruns/
//!   0/                       # experiment id
//!     meta.yaml              # experiment name and creation time
//!     3f2a.../               # run id
//!       meta.yaml            # status, start and end time
//!       params/seed          # one file per parameter
//!       metrics/x            # "<timestamp_ms> <value> <step>" per line
//!       tags/
//!
//! Every run writes only beneath its own directory, so worker threads and
//! concurrent processes never write to the same file.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ParamValue, RunRecorder, RunStatus, Tracker, validate_key};
use crate::error::TrackingError;

const META_FILE: &str = "meta.yaml";
const PARAMS_DIR: &str = "params";
const METRICS_DIR: &str = "metrics";
const TAGS_DIR: &str = "tags";
const LIFECYCLE_ACTIVE: &str = "active";

/// Maximum attempts to claim a fresh experiment id when another process races us
const MAX_EXPERIMENT_CLAIMS: u32 = 16;

/// Held while an experiment is looked up and created
const CREATE_LOCK_FILE: &str = ".create.lock";
const CREATE_LOCK_POLL: Duration = Duration::from_millis(5);
const CREATE_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Contents of an experiment's meta.yaml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentMeta {
    pub experiment_id: String,
    pub name: String,
    pub artifact_location: String,
    pub lifecycle_stage: String,
    pub creation_time: i64,
}

/// Contents of a run's meta.yaml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMeta {
    pub run_id: String,
    pub experiment_id: String,
    pub status: RunStatus,
    pub start_time: i64,
    #[serde(default)]
    pub end_time: Option<i64>,
    pub lifecycle_stage: String,
}

/// One metric observation as stored on disk
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricPoint {
    pub timestamp: i64,
    pub value: f64,
    pub step: u64,
}

/// A run read back from the store
#[derive(Debug, Clone)]
pub struct StoredRun {
    pub meta: RunMeta,
    pub params: BTreeMap<String, ParamValue>,
    pub metrics: BTreeMap<String, Vec<MetricPoint>>,
}

impl StoredRun {
    pub fn metric_history(&self, key: &str) -> &[MetricPoint] {
        self.metrics.get(key).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Tracker persisting runs under a root directory
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    experiment: ExperimentMeta,
}

impl FileStore {
    /// Open the store at `root`, creating the named experiment if needed
    pub fn open(root: impl Into<PathBuf>, experiment_name: &str) -> Result<Self, TrackingError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| TrackingError::io(&root, e))?;

        let experiment = match find_experiment(&root, experiment_name)? {
            Some(existing) => existing,
            None => {
                let _lock = CreateLock::acquire(&root)?;
                match find_experiment(&root, experiment_name)? {
                    Some(existing) => existing,
                    None => create_experiment(&root, experiment_name)?,
                }
            }
        };
        tracing::debug!(
            experiment_id = %experiment.experiment_id,
            name = %experiment.name,
            "tracking store opened at {}",
            root.display()
        );

        Ok(Self { root, experiment })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn experiment(&self) -> &ExperimentMeta {
        &self.experiment
    }

    fn experiment_dir(&self) -> PathBuf {
        self.root.join(&self.experiment.experiment_id)
    }

    fn run_dir(&self, run_id: &str) -> PathBuf {
        self.experiment_dir().join(run_id)
    }

    /// Read a single run back from disk
    pub fn load_run(&self, run_id: &str) -> Result<StoredRun, TrackingError> {
        let run_dir = self.run_dir(run_id);
        let meta_path = run_dir.join(META_FILE);
        if !meta_path.exists() {
            return Err(TrackingError::RunNotFound(run_id.to_string()));
        }

        let meta: RunMeta = read_yaml(&meta_path)?;
        let params = read_params(&run_dir.join(PARAMS_DIR))?;
        let metrics = read_metrics(&run_dir.join(METRICS_DIR))?;

        Ok(StoredRun {
            meta,
            params,
            metrics,
        })
    }

    /// All runs of the experiment, oldest first
    pub fn runs(&self) -> Result<Vec<StoredRun>, TrackingError> {
        let dir = self.experiment_dir();
        let entries = fs::read_dir(&dir).map_err(|e| TrackingError::io(&dir, e))?;

        let mut runs = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.join(META_FILE).exists() {
                continue;
            }
            if let Some(run_id) = path.file_name().and_then(|n| n.to_str()) {
                runs.push(self.load_run(run_id)?);
            }
        }

        runs.sort_by(|a, b| {
            a.meta
                .start_time
                .cmp(&b.meta.start_time)
                .then_with(|| a.meta.run_id.cmp(&b.meta.run_id))
        });
        Ok(runs)
    }
}

impl Tracker for FileStore {
    type Run = FileRun;

    fn start_run(&self) -> Result<FileRun, TrackingError> {
        let run_id = Uuid::new_v4().simple().to_string();
        let run_dir = self.run_dir(&run_id);

        for sub in [PARAMS_DIR, METRICS_DIR, TAGS_DIR] {
            let path = run_dir.join(sub);
            fs::create_dir_all(&path).map_err(|e| TrackingError::io(&path, e))?;
        }

        let meta = RunMeta {
            run_id: run_id.clone(),
            experiment_id: self.experiment.experiment_id.clone(),
            status: RunStatus::Running,
            start_time: now_millis(),
            end_time: None,
            lifecycle_stage: LIFECYCLE_ACTIVE.to_string(),
        };
        write_yaml(&run_dir.join(META_FILE), &meta)?;

        Ok(FileRun {
            run_dir,
            meta,
            metric_files: HashMap::new(),
            closed: false,
        })
    }
}

/// Run handle produced by [`FileStore`]
#[derive(Debug)]
pub struct FileRun {
    run_dir: PathBuf,
    meta: RunMeta,
    /// Metric files kept open for appending
    metric_files: HashMap<String, File>,
    closed: bool,
}

impl FileRun {
    fn check_open(&self) -> Result<(), TrackingError> {
        if self.closed {
            Err(TrackingError::RunClosed(self.meta.run_id.clone()))
        } else {
            Ok(())
        }
    }

    fn metric_file(&mut self, key: &str) -> Result<&mut File, TrackingError> {
        if !self.metric_files.contains_key(key) {
            let path = self.run_dir.join(METRICS_DIR).join(key);
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|e| TrackingError::io(&path, e))?;
            self.metric_files.insert(key.to_string(), file);
        }
        self.metric_files
            .get_mut(key)
            .ok_or_else(|| TrackingError::InvalidKey(key.to_string()))
    }
}

impl RunRecorder for FileRun {
    fn run_id(&self) -> &str {
        &self.meta.run_id
    }

    fn log_params(&mut self, params: &BTreeMap<String, ParamValue>) -> Result<(), TrackingError> {
        self.check_open()?;
        for (key, value) in params {
            validate_key(key)?;
            let path = self.run_dir.join(PARAMS_DIR).join(key);
            fs::write(&path, value.to_string()).map_err(|e| TrackingError::io(&path, e))?;
        }
        Ok(())
    }

    fn log_metrics(&mut self, metrics: &[(&str, f64)], step: u64) -> Result<(), TrackingError> {
        self.check_open()?;
        let timestamp = now_millis();
        for (key, value) in metrics {
            validate_key(key)?;
            let line = format!("{timestamp} {value:?} {step}\n");
            let path = self.run_dir.join(METRICS_DIR).join(key);
            // Unbuffered so observations already logged survive a crashed run
            self.metric_file(key)?
                .write_all(line.as_bytes())
                .map_err(|e| TrackingError::io(&path, e))?;
        }
        Ok(())
    }

    /// The run stays open if meta.yaml cannot be written, so the close can
    /// be attempted again.
    fn end(&mut self, status: RunStatus) -> Result<(), TrackingError> {
        self.check_open()?;

        let meta = RunMeta {
            status,
            end_time: Some(now_millis()),
            ..self.meta.clone()
        };
        write_yaml(&self.run_dir.join(META_FILE), &meta)?;

        self.meta = meta;
        self.closed = true;
        self.metric_files.clear();
        Ok(())
    }
}

/// Exclusive claim on experiment creation under a store root
struct CreateLock {
    path: PathBuf,
}

impl CreateLock {
    fn acquire(root: &Path) -> Result<Self, TrackingError> {
        let path = root.join(CREATE_LOCK_FILE);
        let started = Instant::now();
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(Self { path }),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if started.elapsed() >= CREATE_LOCK_TIMEOUT {
                        return Err(TrackingError::Unavailable(format!(
                            "timed out waiting for lock {}",
                            path.display()
                        )));
                    }
                    thread::sleep(CREATE_LOCK_POLL);
                }
                Err(e) => return Err(TrackingError::io(&path, e)),
            }
        }
    }
}

impl Drop for CreateLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            tracing::warn!("failed to release {}: {err}", self.path.display());
        }
    }
}

fn now_millis() -> i64 {
    jiff::Timestamp::now().as_millisecond()
}

fn find_experiment(root: &Path, name: &str) -> Result<Option<ExperimentMeta>, TrackingError> {
    let entries = fs::read_dir(root).map_err(|e| TrackingError::io(root, e))?;
    for entry in entries.flatten() {
        let meta_path = entry.path().join(META_FILE);
        if !meta_path.exists() {
            continue;
        }
        let meta: ExperimentMeta = read_yaml(&meta_path)?;
        if meta.name == name {
            return Ok(Some(meta));
        }
    }
    Ok(None)
}

/// Claim the next free numeric experiment id. `create_dir` fails if another
/// process claimed the same id first, in which case the next id is tried.
fn create_experiment(root: &Path, name: &str) -> Result<ExperimentMeta, TrackingError> {
    for _ in 0..MAX_EXPERIMENT_CLAIMS {
        let id = next_experiment_id(root)?;
        let dir = root.join(id.to_string());
        match fs::create_dir(&dir) {
            Ok(()) => {
                let meta = ExperimentMeta {
                    experiment_id: id.to_string(),
                    name: name.to_string(),
                    artifact_location: dir.display().to_string(),
                    lifecycle_stage: LIFECYCLE_ACTIVE.to_string(),
                    creation_time: now_millis(),
                };
                write_yaml(&dir.join(META_FILE), &meta)?;
                tracing::info!(experiment_id = id, "created experiment {name:?}");
                return Ok(meta);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(TrackingError::io(&dir, e)),
        }
    }
    Err(TrackingError::Unavailable(format!(
        "could not claim an experiment id under {}",
        root.display()
    )))
}

fn next_experiment_id(root: &Path) -> Result<u64, TrackingError> {
    let entries = fs::read_dir(root).map_err(|e| TrackingError::io(root, e))?;
    let next = entries
        .flatten()
        .filter_map(|entry| entry.file_name().to_str()?.parse::<u64>().ok())
        .max()
        .map_or(0, |max| max + 1);
    Ok(next)
}

fn read_yaml<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, TrackingError> {
    let content = fs::read_to_string(path).map_err(|e| TrackingError::io(path, e))?;
    serde_saphyr::from_str(&content).map_err(|e| TrackingError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Write through a temporary file so readers never see a partial meta.yaml
fn write_yaml<T: Serialize>(path: &Path, value: &T) -> Result<(), TrackingError> {
    let yaml = serde_saphyr::to_string(value).map_err(|e| TrackingError::Serialize(e.to_string()))?;
    let tmp = path.with_extension("yaml.tmp");
    fs::write(&tmp, yaml).map_err(|e| TrackingError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| TrackingError::io(path, e))
}

fn read_params(dir: &Path) -> Result<BTreeMap<String, ParamValue>, TrackingError> {
    let mut params = BTreeMap::new();
    let entries = fs::read_dir(dir).map_err(|e| TrackingError::io(dir, e))?;
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(key) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        let raw = fs::read_to_string(&path).map_err(|e| TrackingError::io(&path, e))?;
        params.insert(key, parse_param(raw.trim()));
    }
    Ok(params)
}

fn parse_param(raw: &str) -> ParamValue {
    if let Ok(v) = raw.parse::<i64>() {
        ParamValue::Int(v)
    } else if let Ok(v) = raw.parse::<f64>() {
        ParamValue::Float(v)
    } else {
        ParamValue::Text(raw.to_string())
    }
}

fn read_metrics(dir: &Path) -> Result<BTreeMap<String, Vec<MetricPoint>>, TrackingError> {
    let mut metrics = BTreeMap::new();
    let entries = fs::read_dir(dir).map_err(|e| TrackingError::io(dir, e))?;
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(key) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        let content = fs::read_to_string(&path).map_err(|e| TrackingError::io(&path, e))?;
        let points = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| parse_metric_line(line, &path))
            .collect::<Result<Vec<_>, _>>()?;
        metrics.insert(key, points);
    }
    Ok(metrics)
}

fn parse_metric_line(line: &str, path: &Path) -> Result<MetricPoint, TrackingError> {
    let bad_line = || TrackingError::Parse {
        path: path.to_path_buf(),
        message: format!("malformed metric line {line:?}"),
    };

    let mut fields = line.split_whitespace();
    let timestamp = fields.next().and_then(|f| f.parse().ok()).ok_or_else(bad_line)?;
    let value = fields.next().and_then(|f| f.parse().ok()).ok_or_else(bad_line)?;
    let step = fields.next().and_then(|f| f.parse().ok()).ok_or_else(bad_line)?;

    Ok(MetricPoint {
        timestamp,
        value,
        step,
    })
}
