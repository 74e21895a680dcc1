use serde::{Deserialize, Serialize};

use crate::config::{BenchmarkConfiguration, Phase};
use crate::sampler::SampleBatch;
use crate::schema::Schema;
use crate::stats::Summary;

/// Column-wise average of one accepted sample batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedRecord {
    pub value_size: u64,
    pub phase: Phase,
    /// Threshold the batch was accepted under.
    pub threshold: f64,
    pub attempts: u32,
    /// One summary per schema column, in column order.
    pub columns: Vec<Summary>,
}

impl AggregatedRecord {
    /// Returns `None` for an empty batch.
    pub fn from_batch(
        configuration: BenchmarkConfiguration,
        batch: &SampleBatch,
        schema: &Schema,
        threshold: f64,
        attempts: u32,
    ) -> Option<Self> {
        let columns = schema
            .columns()
            .iter()
            .enumerate()
            .map(|(idx, column)| Summary::from_values(column.label, &batch.column(idx)))
            .collect::<Option<Vec<_>>>()?;

        Some(Self {
            value_size: configuration.value_size,
            phase: configuration.phase,
            threshold,
            attempts,
            columns,
        })
    }

    pub fn configuration(&self) -> BenchmarkConfiguration {
        BenchmarkConfiguration::new(self.value_size, self.phase)
    }

    pub fn means(&self) -> Vec<f64> {
        self.columns.iter().map(|column| column.mean).collect()
    }
}
