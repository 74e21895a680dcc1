use std::error::Error;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use pmemkv_breakdown::sweep::REPORT_FILE;
use pmemkv_breakdown::{
    logging, parse_output, ExperimentConfig, ProcessExecutor, RoundingPolicy, SchemaVariant,
    SvgChart, Sweep, SweepReport,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Latency breakdown of pmemkv benchmark runs by subsystem"
)]
struct Cli {
    /// Log filter directives, e.g. `debug` or `pmemkv_breakdown=trace`
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the sweep, then write results.json and the charts
    Run(RunArgs),
    /// Re-render charts and the summary table from a results.json
    Render(RenderArgs),
    /// Print the percentage breakdown of one captured benchmark output
    Parse(ParseArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// TOML experiment file; command line flags override its values
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Benchmark executable
    #[arg(long)]
    benchmark: Option<PathBuf>,

    /// Key trace for the load phase
    #[arg(long)]
    load_trace: Option<PathBuf>,

    /// Key trace for the update phase; enables two-phase runs
    #[arg(long)]
    update_trace: Option<PathBuf>,

    /// Pool file removed before every repetition
    #[arg(long)]
    pool: Option<PathBuf>,

    /// CPU to pin the benchmark to
    #[arg(long, conflicts_with = "no_pin")]
    cpu: Option<usize>,

    /// Do not pin the benchmark to a CPU
    #[arg(long)]
    no_pin: bool,

    /// Comma-separated value sizes in bytes
    #[arg(long, value_delimiter = ',')]
    value_sizes: Option<Vec<u64>>,

    /// Invocations per sample batch
    #[arg(long)]
    repetitions: Option<usize>,

    /// Initial standard deviation threshold, in percentage points
    #[arg(long)]
    threshold: Option<f64>,

    /// Rejected batches before the threshold doubles
    #[arg(long)]
    retry_limit: Option<u32>,

    #[arg(long, value_enum)]
    schema: Option<SchemaVariant>,

    #[arg(long, value_enum)]
    rounding: Option<RoundingPolicy>,

    /// Directory for results.json and the charts
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

impl RunArgs {
    fn into_config(self) -> Result<ExperimentConfig, Box<dyn Error>> {
        let mut config = match &self.config {
            Some(path) => ExperimentConfig::from_file(path)?,
            None => ExperimentConfig::default(),
        };

        if let Some(benchmark) = self.benchmark {
            config.benchmark = benchmark;
        }
        if let Some(trace) = self.load_trace {
            config.load_trace = trace;
        }
        if let Some(trace) = self.update_trace {
            config.update_trace = Some(trace);
        }
        if let Some(pool) = self.pool {
            config.pool_path = pool;
        }
        if self.no_pin {
            config.cpu = None;
        } else if let Some(cpu) = self.cpu {
            config.cpu = Some(cpu);
        }
        if let Some(sizes) = self.value_sizes {
            config.value_sizes = sizes;
        }
        if let Some(repetitions) = self.repetitions {
            config.repetitions = repetitions;
        }
        if let Some(threshold) = self.threshold {
            config.threshold = threshold;
        }
        if let Some(limit) = self.retry_limit {
            config.retry_limit = limit;
        }
        if let Some(schema) = self.schema {
            config.schema = schema;
        }
        if let Some(rounding) = self.rounding {
            config.rounding = rounding;
        }
        if let Some(dir) = self.output_dir {
            config.output_dir = dir;
        }

        config.validate()?;
        Ok(config)
    }
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Report written by `run`
    #[arg(long)]
    input: PathBuf,

    /// Chart directory; defaults to the directory of the report
    #[arg(long)]
    output_dir: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "ceil")]
    rounding: RoundingPolicy,
}

#[derive(Args, Debug)]
struct ParseArgs {
    #[arg(long, value_enum, default_value = "pmdk")]
    schema: SchemaVariant,

    /// Captured benchmark output; reads stdin when omitted
    file: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    logging::init(cli.log_level.as_deref())?;

    match cli.command {
        Command::Run(args) => run(args),
        Command::Render(args) => render(args),
        Command::Parse(args) => parse(args),
    }
}

fn run(args: RunArgs) -> Result<(), Box<dyn Error>> {
    let config = args.into_config()?;
    info!(
        benchmark = %config.benchmark.display(),
        schema = %config.schema,
        sizes = ?config.value_sizes,
        "Starting sweep"
    );

    let executor = ProcessExecutor::new(&config);
    let report = Sweep::new(&config, executor).run()?;

    let json = config.output_dir.join(REPORT_FILE);
    report.write_json(&json)?;
    info!(path = %json.display(), "Wrote report");
    report.render_charts(&SvgChart::default(), &config.output_dir, config.rounding)?;

    report.print();
    Ok(())
}

fn render(args: RenderArgs) -> Result<(), Box<dyn Error>> {
    let report = SweepReport::read_json(&args.input)?;
    let dir = args
        .output_dir
        .unwrap_or_else(|| args.input.parent().unwrap_or(Path::new(".")).to_path_buf());
    let written = report.render_charts(&SvgChart::default(), &dir, args.rounding)?;
    for path in written {
        println!("{}", path.display());
    }
    report.print();
    Ok(())
}

fn parse(args: ParseArgs) -> Result<(), Box<dyn Error>> {
    let text = match &args.file {
        Some(path) => fs::read_to_string(path)?,
        None => {
            let mut text = String::new();
            io::stdin().read_to_string(&mut text)?;
            text
        }
    };

    let schema = args.schema.schema();
    let parsed = parse_output(&text, &schema)?;
    let percentages = parsed.percentages(&schema)?;

    println!("Total cycles: {}", parsed.total());
    for (column, value) in schema.columns().iter().zip(percentages.values()) {
        println!("{:20} | {:>9.3}%", column.label, value);
    }
    Ok(())
}
