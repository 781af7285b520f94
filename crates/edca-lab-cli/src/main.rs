use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, level_filters::LevelFilter};

use edca_lab_abstract::{ExperimentOverride, ExperimentSpec};
use edca_lab_harness::{
    AssumeYes, CancelToken, ChartFormat, Confirm, HarnessError, Pipeline, ProcessEngine, RunReport,
    StdinConfirm, rerender,
};

/// Exit status for failures raised outside the harness (unreadable experiment file, bad flags).
const SETUP_FAILURE: u8 = 2;

#[derive(Parser, Debug)]
#[command(author, version, about = "EDCA offered-load sweep harness for ns-3")]
struct Args {
    /// Experiment description (TOML). Defaults to a single 2/2/2/2 mix.
    #[arg(long, short = 'e')]
    experiment: Option<PathBuf>,

    /// Parent of the timestamped results directory.
    #[arg(long, default_value = "results")]
    results_root: PathBuf,

    /// Remove a stale engine output file without asking.
    #[arg(long, short = 'y', default_value_t = false)]
    yes: bool,

    #[arg(long)]
    seed: Option<u64>,

    /// Application payload size in bytes.
    #[arg(long)]
    payload_size: Option<u32>,

    #[arg(long, allow_negative_numbers = true)]
    min_exponent: Option<f64>,
    #[arg(long, allow_negative_numbers = true)]
    max_exponent: Option<f64>,
    #[arg(long)]
    step: Option<f64>,

    /// Engine launcher (e.g. ./ns3).
    #[arg(long)]
    engine: Option<PathBuf>,

    /// Directory the engine runs in and writes its output to.
    #[arg(long)]
    engine_dir: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = ChartFormatArg::Text)]
    chart_format: ChartFormatArg,

    /// Re-render charts from an existing results directory instead of running the sweep.
    #[arg(long, conflicts_with = "experiment")]
    from_bundle: Option<PathBuf>,

    /// Print the resolved experiment as TOML and exit.
    #[arg(long, default_value_t = false)]
    dump_experiment: bool,

    #[arg(long, short = 'v', default_value_t = false, conflicts_with = "quiet")]
    verbose: bool,

    #[arg(long, short = 'q', default_value_t = false)]
    quiet: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ChartFormatArg {
    Text,
    Json,
    Both,
}

impl From<ChartFormatArg> for ChartFormat {
    fn from(arg: ChartFormatArg) -> Self {
        match arg {
            ChartFormatArg::Text => ChartFormat::Text,
            ChartFormatArg::Json => ChartFormat::Json,
            ChartFormatArg::Both => ChartFormat::Both,
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);
    info!("edca-lab starting…");

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let format = ChartFormat::from(args.chart_format);

    if let Some(dir) = &args.from_bundle {
        let report = rerender(dir, format.emitters())?;
        print_summary(&report);
        return Ok(());
    }

    let mut spec = match &args.experiment {
        Some(path) => load_experiment(path)?,
        None => ExperimentSpec::default(),
    };
    args.overrides().apply_to(&mut spec);

    if args.dump_experiment {
        let text = toml::to_string_pretty(&spec).context("Failed to serialize experiment")?;
        print!("{text}");
        return Ok(());
    }

    let cancel = CancelToken::new();
    install_interrupt_handler(cancel.clone())?;

    let mut engine = ProcessEngine::new(spec.engine.clone());
    let mut prompt: Box<dyn Confirm> = if args.yes {
        Box::new(AssumeYes)
    } else {
        Box::new(StdinConfirm)
    };
    let mut pipeline = Pipeline::new(spec)
        .results_root(&args.results_root)
        .cancel_token(cancel)
        .emitters(format.emitters());
    let report = pipeline.run(&mut engine, prompt.as_mut())?;
    print_summary(&report);
    Ok(())
}

impl Args {
    fn overrides(&self) -> ExperimentOverride {
        ExperimentOverride {
            seed: self.seed,
            payload_size: self.payload_size,
            min_exponent: self.min_exponent,
            max_exponent: self.max_exponent,
            step: self.step,
            program: self.engine.clone(),
            working_dir: self.engine_dir.clone(),
        }
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = if verbose {
        LevelFilter::DEBUG
    } else if quiet {
        LevelFilter::WARN
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn load_experiment(path: &Path) -> Result<ExperimentSpec> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read experiment file {}", path.display()))?;
    let spec: ExperimentSpec =
        toml::from_str(&content).context("Failed to parse experiment file")?;
    Ok(spec)
}

/// First Ctrl-C stops the sweep after the running point; a second one exits at once.
fn install_interrupt_handler(cancel: CancelToken) -> Result<()> {
    ctrlc::set_handler(move || {
        if cancel.is_cancelled() {
            std::process::exit(130);
        }
        cancel.cancel();
    })
    .context("Failed to install interrupt handler")
}

fn print_summary(report: &RunReport) {
    info!(
        "{} chart file(s) from {} invocation(s)",
        report.charts.len(),
        report.invocations
    );
    println!("{}", report.results_dir.display());
}

fn exit_code(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<HarnessError>())
        .map(HarnessError::exit_code)
        .unwrap_or(SETUP_FAILURE)
}
