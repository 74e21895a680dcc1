//! Synthetic benchmark output and an in-memory executor for tests and benches.

use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;

use crate::config::BenchmarkConfiguration;
use crate::error::SweepError;
use crate::sampler::{Executor, Invocation};

/// Last line any schema variant reads.
const LAST_LINE: usize = 17;
const TOTAL_LINE: usize = 6;

/// Builder for benchmark output text. Unset lines print zero cycles.
#[derive(Debug, Clone)]
pub struct BenchmarkOutput {
    lines: Vec<u64>,
}

impl BenchmarkOutput {
    pub fn new(total: u64) -> Self {
        let mut lines = vec![0; LAST_LINE + 1];
        lines[TOTAL_LINE] = total;
        Self { lines }
    }

    pub fn line(mut self, idx: usize, cycles: u64) -> Self {
        if idx >= self.lines.len() {
            self.lines.resize(idx + 1, 0);
        }
        self.lines[idx] = cycles;
        self
    }

    pub fn render(&self) -> String {
        self.lines
            .iter()
            .enumerate()
            .map(|(idx, cycles)| {
                if idx == TOTAL_LINE {
                    format!("Total,{cycles}\n")
                } else {
                    format!("Counter{idx},{cycles}\n")
                }
            })
            .collect()
    }
}

/// Output of a PMDK-only benchmark revision.
pub fn pmdk_output(durability: u64, logging: u64, locking: u64, allocation: u64, total: u64) -> String {
    BenchmarkOutput::new(total)
        .line(1, durability)
        .line(2, logging)
        .line(3, locking)
        .line(4, allocation)
        .render()
}

/// What a [`ScriptedExecutor`] observed for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub configuration: BenchmarkConfiguration,
    pub trace: PathBuf,
    /// Whether the watched pool file existed when the invocation started.
    pub pool_existed: bool,
}

/// Replays scripted outputs in order. `Err(code)` simulates a non-zero exit. The last
/// response repeats once the script runs out.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    responses: VecDeque<Result<String, i32>>,
    last: Option<Result<String, i32>>,
    pool: Option<PathBuf>,
    calls: Vec<RecordedCall>,
}

impl ScriptedExecutor {
    pub fn new(responses: Vec<Result<String, i32>>) -> Self {
        Self {
            responses: responses.into(),
            ..Default::default()
        }
    }

    pub fn repeating(output: String) -> Self {
        Self::new(vec![Ok(output)])
    }

    /// Watch `pool`: record whether it exists and create it on every invocation.
    pub fn with_pool(mut self, pool: PathBuf) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn calls(&self) -> &[RecordedCall] {
        &self.calls
    }

    fn next_response(&mut self) -> Option<Result<String, i32>> {
        match self.responses.pop_front() {
            Some(response) => {
                self.last = Some(response.clone());
                Some(response)
            }
            None => self.last.clone(),
        }
    }
}

impl Executor for ScriptedExecutor {
    fn execute(&mut self, invocation: &Invocation<'_>) -> Result<String, SweepError> {
        let pool_existed = self.pool.as_ref().is_some_and(|pool| pool.exists());
        self.calls.push(RecordedCall {
            configuration: invocation.configuration,
            trace: invocation.trace.to_path_buf(),
            pool_existed,
        });

        if let Some(pool) = &self.pool {
            fs::write(pool, b"pool").map_err(|source| SweepError::Write {
                path: pool.clone(),
                source,
            })?;
        }

        match self.next_response() {
            Some(Ok(output)) => Ok(output),
            Some(Err(code)) => Err(SweepError::BenchmarkFailed {
                configuration: invocation.configuration,
                status: format!("exit status: {code}"),
            }),
            None => Err(SweepError::BenchmarkFailed {
                configuration: invocation.configuration,
                status: "no scripted output".to_string(),
            }),
        }
    }
}
