use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::aggregate::AggregatedRecord;
use crate::chart::{chart_file_name, ChartRenderer};
use crate::config::{BenchmarkConfiguration, ExperimentConfig, Phase};
use crate::convergence::ConvergenceController;
use crate::error::SweepError;
use crate::sampler::{Executor, Sampler};
use crate::schema::{SchemaVariant, Subsystem};
use crate::series::{RoundingPolicy, SeriesBuilder, SeriesError, SeriesTable};
use crate::stats::header;

pub const REPORT_FILE: &str = "results.json";

/// Runs every value size of the sweep to convergence, in order.
pub struct Sweep<'a, E> {
    sampler: Sampler<'a, E>,
    controller: ConvergenceController,
}

impl<'a, E: Executor> Sweep<'a, E> {
    pub fn new(config: &'a ExperimentConfig, executor: E) -> Self {
        Self {
            sampler: Sampler::new(config, executor),
            controller: ConvergenceController::new(config.threshold, config.retry_limit),
        }
    }

    pub fn run(mut self) -> Result<SweepReport, SweepError> {
        let config = self.sampler.config();
        config.validate()?;
        let phases = config.phases();
        let mut records = Vec::with_capacity(config.value_sizes.len() * phases.len());

        for &value_size in &config.value_sizes {
            let sampler = &mut self.sampler;
            let converged = self.controller.converge(|| sampler.sample(value_size))?;
            info!(
                value_size,
                attempts = converged.attempts,
                threshold = converged.threshold,
                "Configuration converged"
            );

            for &phase in &phases {
                let configuration = BenchmarkConfiguration::new(value_size, phase);
                if let Some(record) = AggregatedRecord::from_batch(
                    configuration,
                    converged.batches.get(phase),
                    self.sampler.schema(),
                    converged.threshold,
                    converged.attempts,
                ) {
                    records.push(record);
                }
            }
        }

        Ok(SweepReport {
            schema: config.schema,
            value_sizes: config.value_sizes.clone(),
            phases,
            max_threshold: self.controller.max_threshold(),
            records,
        })
    }
}

/// Everything a finished sweep produced. Serialized as `results.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub schema: SchemaVariant,
    pub value_sizes: Vec<u64>,
    pub phases: Vec<Phase>,
    /// Largest stability threshold any configuration needed.
    pub max_threshold: f64,
    pub records: Vec<AggregatedRecord>,
}

impl SweepReport {
    /// Records of `phase` in sweep order.
    pub fn records_for(&self, phase: Phase) -> Vec<&AggregatedRecord> {
        self.records
            .iter()
            .filter(|record| record.phase == phase)
            .collect()
    }

    pub fn series(
        &self,
        phase: Phase,
        subsystem: Subsystem,
        rounding: RoundingPolicy,
    ) -> Result<SeriesTable, SeriesError> {
        let schema = self.schema.schema();
        SeriesBuilder::new(&schema, rounding).build(subsystem, &self.records_for(phase))
    }

    /// One series table per (subsystem, phase), in chart order.
    pub fn all_series(
        &self,
        rounding: RoundingPolicy,
    ) -> Result<Vec<(Subsystem, Phase, SeriesTable)>, SeriesError> {
        let schema = self.schema.schema();
        let builder = SeriesBuilder::new(&schema, rounding);
        let mut tables = Vec::new();
        for subsystem in schema.subsystems() {
            for &phase in &self.phases {
                let table = builder.build(subsystem, &self.records_for(phase))?;
                tables.push((subsystem, phase, table));
            }
        }
        Ok(tables)
    }

    /// Render every chart into `dir` and return the written paths.
    pub fn render_charts<R: ChartRenderer>(
        &self,
        renderer: &R,
        dir: &Path,
        rounding: RoundingPolicy,
    ) -> Result<Vec<PathBuf>, SweepError> {
        create_dir(dir)?;
        let mut written = Vec::new();
        for (subsystem, phase, table) in self.all_series(rounding)? {
            let path = dir.join(chart_file_name(subsystem, phase, renderer.extension()));
            let title = format!("{} breakdown, {} phase", subsystem.title(), phase);
            renderer.render(&title, &table, &path)?;
            info!(path = %path.display(), "Wrote chart");
            written.push(path);
        }
        Ok(written)
    }

    pub fn write_json(&self, path: &Path) -> Result<(), SweepError> {
        if let Some(parent) = path.parent() {
            create_dir(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| SweepError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn read_json(path: &Path) -> Result<Self, SweepError> {
        let text = fs::read_to_string(path).map_err(|source| SweepError::ReadReport {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn print(&self) {
        print!("{self}");
    }
}

impl fmt::Display for SweepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Schema: {}", self.schema)?;
        for &phase in &self.phases {
            writeln!(f)?;
            writeln!(f, "== {phase} phase ==")?;
            writeln!(f, "{}", header())?;
            for record in self.records_for(phase) {
                writeln!(
                    f,
                    "-- {} bytes: threshold {}, {} attempts",
                    record.value_size, record.threshold, record.attempts
                )?;
                for column in &record.columns {
                    writeln!(f, "{column}")?;
                }
            }
        }
        writeln!(f)?;
        writeln!(f, "Maximum threshold: {}", self.max_threshold)
    }
}

fn create_dir(dir: &Path) -> Result<(), SweepError> {
    if dir.as_os_str().is_empty() {
        return Ok(());
    }
    fs::create_dir_all(dir).map_err(|source| SweepError::Write {
        path: dir.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::SvgChart;
    use crate::test_utils::{pmdk_output, ScriptedExecutor};

    fn config_in(dir: &Path) -> ExperimentConfig {
        ExperimentConfig {
            pool_path: dir.join("pool"),
            value_sizes: vec![64, 128],
            repetitions: 2,
            ..Default::default()
        }
    }

    #[test]
    fn sweep_produces_one_record_per_size_and_phase() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExperimentConfig {
            update_trace: Some(PathBuf::from("traces/run.txt")),
            ..config_in(dir.path())
        };
        let executor = ScriptedExecutor::repeating(pmdk_output(120, 30, 10, 5, 1000));

        let report = Sweep::new(&config, executor).run().unwrap();
        let configurations: Vec<_> = report.records.iter().map(|r| r.configuration()).collect();
        assert_eq!(
            configurations,
            vec![
                BenchmarkConfiguration::new(64, Phase::Load),
                BenchmarkConfiguration::new(64, Phase::Update),
                BenchmarkConfiguration::new(128, Phase::Load),
                BenchmarkConfiguration::new(128, Phase::Update),
            ]
        );
        assert_eq!(report.max_threshold, 0.1);
        assert_eq!(report.records[0].means(), vec![12.0, 3.0, 1.0, 0.5]);
    }

    #[test]
    fn unstable_size_is_resampled_and_relaxes_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExperimentConfig {
            value_sizes: vec![64],
            retry_limit: 1,
            threshold: 1.0,
            ..config_in(dir.path())
        };
        // Durability alternates 10% and 13%, a spread of 1.5 in every round.
        let executor = ScriptedExecutor::new(vec![
            Ok(pmdk_output(100, 0, 0, 0, 1000)),
            Ok(pmdk_output(130, 0, 0, 0, 1000)),
            Ok(pmdk_output(100, 0, 0, 0, 1000)),
            Ok(pmdk_output(130, 0, 0, 0, 1000)),
        ]);

        let report = Sweep::new(&config, executor).run().unwrap();
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].attempts, 2);
        assert_eq!(report.records[0].threshold, 2.0);
        assert_eq!(report.max_threshold, 2.0);
    }

    #[test]
    fn invalid_config_is_rejected_before_running() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExperimentConfig {
            repetitions: 0,
            ..config_in(dir.path())
        };
        let mut executor = ScriptedExecutor::repeating(pmdk_output(120, 30, 10, 5, 1000));
        let result = Sweep::new(&config, &mut executor).run();
        assert!(matches!(result, Err(SweepError::Config(_))));
        assert!(executor.calls().is_empty());
    }

    #[test]
    fn report_round_trips_and_renders() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let executor = ScriptedExecutor::repeating(pmdk_output(120, 30, 10, 5, 1000));
        let report = Sweep::new(&config, executor).run().unwrap();

        let json = dir.path().join("out").join(REPORT_FILE);
        report.write_json(&json).unwrap();
        let restored = SweepReport::read_json(&json).unwrap();
        assert_eq!(restored, report);

        let charts = restored
            .render_charts(&SvgChart::default(), &dir.path().join("charts"), RoundingPolicy::Ceil)
            .unwrap();
        assert_eq!(charts, vec![dir.path().join("charts").join("pmdk-load.svg")]);
        assert!(charts[0].exists());
    }

    #[test]
    fn report_prints_a_table_per_phase() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExperimentConfig {
            update_trace: Some(PathBuf::from("traces/run.txt")),
            ..config_in(dir.path())
        };
        let executor = ScriptedExecutor::repeating(pmdk_output(120, 30, 10, 5, 1000));
        let text = Sweep::new(&config, executor).run().unwrap().to_string();

        let load = text.find("== load phase ==").unwrap();
        let update = text.find("== update phase ==").unwrap();
        assert!(load < update);
        assert_eq!(text.matches("-- 128 bytes").count(), 2);
        assert!(text.contains("Durability"));
        assert!(text.trim_end().ends_with("Maximum threshold: 0.1"));
    }

    #[test]
    fn series_per_phase_and_subsystem() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let executor = ScriptedExecutor::repeating(pmdk_output(120, 30, 10, 5, 1000));
        let report = Sweep::new(&config, executor).run().unwrap();

        let table = report
            .series(Phase::Load, Subsystem::Pmdk, RoundingPolicy::Ceil)
            .unwrap();
        assert_eq!(table.value_sizes, vec![64, 128]);
        assert_eq!(table.rows.last().unwrap().values, vec![83.0, 83.0]);
        assert!(report
            .series(Phase::Update, Subsystem::Pmdk, RoundingPolicy::Ceil)
            .unwrap()
            .value_sizes
            .is_empty());
    }
}
