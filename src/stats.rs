use std::fmt;

use serde::{Deserialize, Serialize};

/// Summary of one percentage column across the runs of a sample batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub label: String,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub samples: usize,
}

impl Summary {
    /// Returns `None` for an empty column.
    pub fn from_values(label: &str, values: &[f64]) -> Option<Self> {
        Some(Self {
            label: label.to_string(),
            mean: mean(values)?,
            median: median(values)?,
            std_dev: std_dev(values)?,
            samples: values.len(),
        })
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:20} | {:>9.3}% | {:>9.3}% | {:>10.4} | {:>8}",
            self.label, self.mean, self.median, self.std_dev, self.samples
        )
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    }
}

/// Population standard deviation (divides by N).
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let mean = mean(values)?;
    let variance = values
        .iter()
        .map(|value| (value - mean).powi(2))
        .sum::<f64>()
        / values.len() as f64;
    Some(variance.sqrt())
}

/// Column header matching the [`Summary`] row layout, with its underline.
pub fn header() -> String {
    format!(
        "{:20} | {:>10} | {:>10} | {:>10} | {:>8}\n{}",
        "Category",
        "Mean",
        "Median",
        "StdDev",
        "Runs",
        "-".repeat(70)
    )
}
