//! Experiment configuration
//!
//! Everything the sweep needs is collected into one immutable [`ExperimentConfig`] that is
//! built before the first invocation and passed by reference to the sampler, the process
//! executor and the report writer. Defaults reproduce the pmemkv latency experiment:
//! a RAM-backed pool, the YCSB-A key trace and libpmemobj forced into pmem mode.

use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::schema::SchemaVariant;
use crate::series::RoundingPolicy;

/// Workload phase of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// Initial population of an empty store.
    Load,
    /// Overwrite workload against the store the load phase populated.
    Update,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Load => "load",
            Phase::Update => "update",
        }
    }
}

impl Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One point of the sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BenchmarkConfiguration {
    pub value_size: u64,
    pub phase: Phase,
}

impl BenchmarkConfiguration {
    pub fn new(value_size: u64, phase: Phase) -> Self {
        Self { value_size, phase }
    }
}

impl Display for BenchmarkConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bytes ({})", self.value_size, self.phase)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExperimentConfig {
    /// Benchmark executable
    pub benchmark: PathBuf,
    /// Arguments placed before the trace path
    pub benchmark_args: Vec<String>,
    /// Key trace for the load phase
    pub load_trace: PathBuf,
    /// Key trace for the update phase; `None` runs the load phase only
    pub update_trace: Option<PathBuf>,
    /// Pool file removed before every repetition
    pub pool_path: PathBuf,
    /// Extra environment for the benchmark process
    pub env: BTreeMap<String, String>,
    /// CPU the benchmark is pinned to
    pub cpu: Option<usize>,
    /// Value sizes in bytes, in sweep order
    pub value_sizes: Vec<u64>,
    /// Invocations per sample batch
    pub repetitions: usize,
    /// Initial stability threshold in percentage points
    pub threshold: f64,
    /// Rejected batches tolerated before the threshold doubles
    pub retry_limit: u32,
    pub schema: SchemaVariant,
    pub rounding: RoundingPolicy,
    /// Directory for `results.json` and the charts
    pub output_dir: PathBuf,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            benchmark: PathBuf::from("./bin/pmemkv_latency"),
            benchmark_args: Vec::new(),
            load_trace: PathBuf::from("traces/ycsb-a.txt"),
            update_trace: None,
            pool_path: PathBuf::from("/mnt/ram/pmemkv"),
            env: BTreeMap::from([("PMEM_IS_PMEM_FORCE".to_string(), "1".to_string())]),
            cpu: Some(0),
            value_sizes: vec![1024, 2048, 4096, 8192],
            repetitions: 5,
            threshold: 0.1,
            retry_limit: 3,
            schema: SchemaVariant::Pmdk,
            rounding: RoundingPolicy::Ceil,
            output_dir: PathBuf::from("results"),
        }
    }
}

impl ExperimentConfig {
    /// Load a TOML experiment file. Missing keys keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Phases every repetition runs, in invocation order.
    pub fn phases(&self) -> Vec<Phase> {
        if self.update_trace.is_some() {
            vec![Phase::Load, Phase::Update]
        } else {
            vec![Phase::Load]
        }
    }

    /// Trace file the benchmark reads in `phase`.
    pub fn trace_for(&self, phase: Phase) -> &Path {
        match (phase, &self.update_trace) {
            (Phase::Update, Some(trace)) => trace,
            _ => &self.load_trace,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.repetitions == 0 {
            return Err(ConfigError::Invalid("repetitions must be at least 1".into()));
        }
        if self.retry_limit == 0 {
            return Err(ConfigError::Invalid("retry_limit must be at least 1".into()));
        }
        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "threshold must be a positive number, got {}",
                self.threshold
            )));
        }
        if self.value_sizes.is_empty() {
            return Err(ConfigError::Invalid("value_sizes is empty".into()));
        }
        if self.value_sizes.contains(&0) {
            return Err(ConfigError::Invalid("value sizes must be non-zero".into()));
        }
        self.validate_cpu()
    }

    #[cfg(target_os = "linux")]
    fn validate_cpu(&self) -> Result<(), ConfigError> {
        let limit = libc::CPU_SETSIZE as usize;
        match self.cpu {
            Some(cpu) if cpu >= limit => Err(ConfigError::Invalid(format!(
                "cpu {cpu} is outside the affinity mask (0..{limit})"
            ))),
            _ => Ok(()),
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn validate_cpu(&self) -> Result<(), ConfigError> {
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
