//! Reshaping aggregated records into stacked-bar series.
//!
//! A [`SeriesTable`] has one row per category and one column per value size. The last
//! row is always the derived "Other" share: 100% minus the rounded categories, never
//! negative. Rounding never makes a category taller than its measured share, so a bar
//! stacks to at most 100% whenever the measured shares do.

use serde::{Deserialize, Serialize};

use crate::aggregate::AggregatedRecord;
use crate::schema::{Schema, Subsystem};

pub const OTHER_LABEL: &str = "Other";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SeriesError {
    #[error("row {label:?} has {found} values but the table has {expected} columns")]
    RaggedRow {
        label: String,
        expected: usize,
        found: usize,
    },

    #[error("record for {value_size} bytes has {found} columns but the schema defines {expected}")]
    ColumnMismatch {
        value_size: u64,
        expected: usize,
        found: usize,
    },
}

/// How category values are rounded before "Other" is derived.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum RoundingPolicy {
    /// Categories claim their share rounded up to whole percent.
    #[default]
    Ceil,
    /// Categories claim their share rounded to three decimals.
    Decimals3,
}

impl RoundingPolicy {
    /// Share a category claims when "Other" is derived.
    pub fn claimed(self, value: f64) -> f64 {
        match self {
            RoundingPolicy::Ceil => value.ceil(),
            RoundingPolicy::Decimals3 => (value * 1000.0).round() / 1000.0,
        }
    }

    /// Stacked height of a value. Never above `value`.
    pub fn displayed(self, value: f64) -> f64 {
        match self {
            RoundingPolicy::Ceil => value,
            RoundingPolicy::Decimals3 => floor_thousandths(value),
        }
    }
}

/// Truncate to three decimals, treating values within float noise of a step as on it.
fn floor_thousandths(value: f64) -> f64 {
    let scaled = value * 1000.0;
    let nearest = scaled.round();
    let steps = if (scaled - nearest).abs() < 1e-6 {
        nearest
    } else {
        scaled.floor()
    };
    steps / 1000.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesRow {
    pub label: String,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesTable {
    /// Column headers, one per configuration.
    pub value_sizes: Vec<u64>,
    /// Category rows in legend order, "Other" last.
    pub rows: Vec<SeriesRow>,
}

impl SeriesTable {
    /// Build a table from category rows that are already laid out per configuration.
    /// Every row needs exactly one value per value size.
    pub fn from_rows(
        value_sizes: Vec<u64>,
        rows: Vec<(String, Vec<f64>)>,
        rounding: RoundingPolicy,
    ) -> Result<Self, SeriesError> {
        let columns = value_sizes.len();
        if let Some((label, values)) = rows.iter().find(|(_, values)| values.len() != columns) {
            return Err(SeriesError::RaggedRow {
                label: label.clone(),
                expected: columns,
                found: values.len(),
            });
        }

        let other = (0..columns)
            .map(|col| {
                let claimed: f64 = rows.iter().map(|(_, values)| rounding.claimed(values[col])).sum();
                rounding.displayed((100.0 - claimed).max(0.0))
            })
            .collect();

        let mut rows: Vec<SeriesRow> = rows
            .into_iter()
            .map(|(label, values)| SeriesRow {
                label,
                values: values.into_iter().map(|v| rounding.displayed(v)).collect(),
            })
            .collect();
        rows.push(SeriesRow {
            label: OTHER_LABEL.to_string(),
            values: other,
        });

        Ok(Self { value_sizes, rows })
    }

    pub fn labels(&self) -> Vec<&str> {
        self.rows.iter().map(|row| row.label.as_str()).collect()
    }

    /// Stacked height of column `col`.
    pub fn column_total(&self, col: usize) -> f64 {
        self.rows.iter().filter_map(|row| row.values.get(col)).sum()
    }
}

/// Builds one [`SeriesTable`] per subsystem from the records of a single phase.
pub struct SeriesBuilder<'a> {
    schema: &'a Schema,
    rounding: RoundingPolicy,
}

impl<'a> SeriesBuilder<'a> {
    pub fn new(schema: &'a Schema, rounding: RoundingPolicy) -> Self {
        Self { schema, rounding }
    }

    /// `records` must all belong to one phase and be ordered by the sweep.
    pub fn build(
        &self,
        subsystem: Subsystem,
        records: &[&AggregatedRecord],
    ) -> Result<SeriesTable, SeriesError> {
        let expected = self.schema.columns().len();
        if let Some(record) = records.iter().find(|record| record.columns.len() != expected) {
            return Err(SeriesError::ColumnMismatch {
                value_size: record.value_size,
                expected,
                found: record.columns.len(),
            });
        }

        let value_sizes = records.iter().map(|record| record.value_size).collect();
        let rows = self
            .schema
            .columns_of(subsystem)
            .into_iter()
            .map(|idx| {
                let label = self.schema.columns()[idx].label.to_string();
                let values = records
                    .iter()
                    .map(|record| record.columns[idx].mean)
                    .collect();
                (label, values)
            })
            .collect();
        SeriesTable::from_rows(value_sizes, rows, self.rounding)
    }
}
