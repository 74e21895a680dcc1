use serde::{Deserialize, Serialize};

use crate::schema::{Basis, Counter, Schema, Source};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("benchmark printed {found} lines but line {line} ({counter}) is required")]
    MissingLine {
        counter: &'static str,
        line: usize,
        found: usize,
    },

    #[error("line {line} ({counter}) is not a `<label>,<cycles>` record: {content:?}")]
    MalformedLine {
        counter: &'static str,
        line: usize,
        content: String,
    },

    #[error("line {line} ({counter}) has a non-integer cycle count: {value:?}")]
    InvalidCycles {
        counter: &'static str,
        line: usize,
        value: String,
    },

    #[error("percentage basis is zero cycles")]
    ZeroBasis,

    #[error("counter {counter} ({cycles} cycles) exceeds its basis of {basis} cycles")]
    ExceedsBasis {
        counter: &'static str,
        cycles: u64,
        basis: u64,
    },
}

/// Raw cycle counts of one benchmark invocation, in [`Schema::counters`] order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRecord {
    counters: Vec<u64>,
    total: u64,
}

/// Percentages of one invocation, in [`Schema::columns`] order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PercentRecord {
    values: Vec<f64>,
}

/// Parse the standard output of one invocation using `schema`'s fixed line offsets.
pub fn parse_output(output: &str, schema: &Schema) -> Result<ParsedRecord, ParseError> {
    let lines: Vec<&str> = output.lines().collect();
    let counters = schema
        .counters()
        .iter()
        .map(|counter| read_counter(&lines, counter))
        .collect::<Result<Vec<_>, _>>()?;
    let total = read_counter(&lines, schema.total())?;
    Ok(ParsedRecord { counters, total })
}

fn read_counter(lines: &[&str], counter: &Counter) -> Result<u64, ParseError> {
    let content = lines.get(counter.line).ok_or(ParseError::MissingLine {
        counter: counter.name,
        line: counter.line,
        found: lines.len(),
    })?;

    // Fields past the value are ignored.
    let value = content
        .split(',')
        .nth(counter.field)
        .ok_or_else(|| ParseError::MalformedLine {
            counter: counter.name,
            line: counter.line,
            content: content.to_string(),
        })?
        .trim();

    value.parse::<u64>().map_err(|_| ParseError::InvalidCycles {
        counter: counter.name,
        line: counter.line,
        value: value.to_string(),
    })
}

impl ParsedRecord {
    pub fn new(counters: Vec<u64>, total: u64) -> Self {
        Self { counters, total }
    }

    pub fn counters(&self) -> &[u64] {
        &self.counters
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Convert every column of `schema` into a percentage of its basis.
    pub fn percentages(&self, schema: &Schema) -> Result<PercentRecord, ParseError> {
        let counters = schema.counters();
        let mut values = Vec::with_capacity(schema.columns().len());

        for column in schema.columns() {
            let basis = self.basis(column.basis, counters)?;
            let percent = |idx: usize| -> Result<f64, ParseError> {
                let cycles = self.counters[idx];
                if cycles > basis {
                    return Err(ParseError::ExceedsBasis {
                        counter: counters[idx].name,
                        cycles,
                        basis,
                    });
                }
                Ok(100.0 * cycles as f64 / basis as f64)
            };

            let value = match column.source {
                Source::Counter(idx) => percent(idx)?,
                Source::Remainder { composite, parts } => {
                    let mut remainder = percent(composite)?;
                    for part in parts {
                        remainder -= percent(part)?;
                    }
                    remainder.max(0.0)
                }
            };
            values.push(value);
        }

        Ok(PercentRecord { values })
    }

    fn basis(&self, basis: Basis, counters: &[Counter]) -> Result<u64, ParseError> {
        let cycles = match basis {
            Basis::Total => self.total,
            Basis::TotalMinus(idx) => {
                let excluded = self.counters[idx];
                self.total
                    .checked_sub(excluded)
                    .ok_or(ParseError::ExceedsBasis {
                        counter: counters[idx].name,
                        cycles: excluded,
                        basis: self.total,
                    })?
            }
        };
        if cycles == 0 {
            return Err(ParseError::ZeroBasis);
        }
        Ok(cycles)
    }
}

impl PercentRecord {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
