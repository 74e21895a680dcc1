//! Latency breakdown harness for pmemkv.
//!
//! The harness drives an external benchmark binary over a sweep of value sizes,
//! reads the per-subsystem cycle counters it prints, and turns them into shares of
//! total latency. Every value size is sampled until the shares are stable (see
//! [`convergence`]), averaged, and reshaped into one stacked bar chart per subsystem
//! and workload phase.
//!
//! ```text
//! ExperimentConfig -> Sweep -> Sampler -> Executor (benchmark process)
//!                        |         \-> parser -> PercentRecord
//!                        \-> ConvergenceController -> AggregatedRecord
//!                                                   -> SeriesBuilder -> ChartRenderer
//! ```

pub mod aggregate;
pub mod chart;
pub mod config;
pub mod convergence;
pub mod error;
pub mod logging;
pub mod parser;
pub mod process;
pub mod sampler;
pub mod schema;
pub mod series;
pub mod stats;
pub mod sweep;
pub mod test_utils;

pub use aggregate::AggregatedRecord;
pub use chart::{ChartRenderer, SvgChart};
pub use config::{BenchmarkConfiguration, ExperimentConfig, Phase};
pub use convergence::ConvergenceController;
pub use error::SweepError;
pub use parser::{parse_output, ParseError, ParsedRecord, PercentRecord};
pub use process::ProcessExecutor;
pub use sampler::{Executor, Invocation, Sampler};
pub use schema::{Schema, SchemaVariant, Subsystem};
pub use series::{RoundingPolicy, SeriesBuilder, SeriesError, SeriesTable};
pub use sweep::{Sweep, SweepReport};
