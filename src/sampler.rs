//! Repeated invocation of the benchmark for one value size.
//!
//! A repetition starts by deleting the pool file, then runs the load phase and, for
//! two-phase experiments, the update phase against the pool the load phase just built.
//! Only the percentage record of each invocation is kept.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use tracing::debug;

use crate::config::{BenchmarkConfiguration, ExperimentConfig, Phase};
use crate::error::SweepError;
use crate::parser::{parse_output, PercentRecord};
use crate::schema::Schema;

/// One benchmark invocation as handed to an [`Executor`].
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    pub configuration: BenchmarkConfiguration,
    pub trace: &'a Path,
}

/// Runs the benchmark and returns its standard output.
///
/// A non-zero exit status must be reported as [`SweepError::BenchmarkFailed`].
pub trait Executor {
    fn execute(&mut self, invocation: &Invocation<'_>) -> Result<String, SweepError>;
}

impl<E: Executor + ?Sized> Executor for &mut E {
    fn execute(&mut self, invocation: &Invocation<'_>) -> Result<String, SweepError> {
        (**self).execute(invocation)
    }
}

/// Percentage records of repeated invocations of one configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleBatch {
    records: Vec<PercentRecord>,
}

impl SampleBatch {
    pub fn new(records: Vec<PercentRecord>) -> Self {
        Self { records }
    }

    pub fn push(&mut self, record: PercentRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[PercentRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of columns per record.
    pub fn width(&self) -> usize {
        self.records.first().map_or(0, PercentRecord::len)
    }

    /// Values of column `idx` across all records.
    pub fn column(&self, idx: usize) -> Vec<f64> {
        self.records
            .iter()
            .map(|record| record.values()[idx])
            .collect()
    }
}

/// The batches one sampling round produces. `update` stays empty for load-only runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhaseBatches {
    pub load: SampleBatch,
    pub update: SampleBatch,
}

impl PhaseBatches {
    pub fn get(&self, phase: Phase) -> &SampleBatch {
        match phase {
            Phase::Load => &self.load,
            Phase::Update => &self.update,
        }
    }

    fn get_mut(&mut self, phase: Phase) -> &mut SampleBatch {
        match phase {
            Phase::Load => &mut self.load,
            Phase::Update => &mut self.update,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &SampleBatch> {
        [&self.load, &self.update].into_iter()
    }
}

pub struct Sampler<'a, E> {
    config: &'a ExperimentConfig,
    schema: Schema,
    executor: E,
}

impl<'a, E: Executor> Sampler<'a, E> {
    pub fn new(config: &'a ExperimentConfig, executor: E) -> Self {
        Self {
            config,
            schema: config.schema.schema(),
            executor,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn config(&self) -> &'a ExperimentConfig {
        self.config
    }

    /// Run `repetitions` fresh repetitions for `value_size`.
    pub fn sample(&mut self, value_size: u64) -> Result<PhaseBatches, SweepError> {
        let config = self.config;
        let mut batches = PhaseBatches::default();

        for repetition in 0..config.repetitions {
            self.reset_store()?;
            for phase in config.phases() {
                let invocation = Invocation {
                    configuration: BenchmarkConfiguration::new(value_size, phase),
                    trace: config.trace_for(phase),
                };
                debug!(value_size, %phase, repetition, "Invoking benchmark");
                let record = self.measure(&invocation)?;
                batches.get_mut(phase).push(record);
            }
        }

        Ok(batches)
    }

    fn measure(&mut self, invocation: &Invocation<'_>) -> Result<PercentRecord, SweepError> {
        let output = self.executor.execute(invocation)?;
        parse_output(&output, &self.schema)
            .and_then(|record| record.percentages(&self.schema))
            .map_err(|source| SweepError::Parse {
                configuration: invocation.configuration,
                source,
            })
    }

    fn reset_store(&self) -> Result<(), SweepError> {
        let path = &self.config.pool_path;
        match fs::remove_file(path) {
            Ok(()) => {
                debug!(path = %path.display(), "Removed pool");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(SweepError::StoreReset {
                path: path.clone(),
                source,
            }),
        }
    }
}
