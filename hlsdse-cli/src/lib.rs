#![warn(missing_docs)]
//! hlsdse CLI Library
//!
//! Command-line driver for design-space exploration experiments. Kernels are
//! read from `<sources>/<experiment>/<kernel>/<kernel>.json`, their points are
//! enumerated, and one synthesis job per schedulable point is run in the
//! point's work directory. `trace` runs the tracer those jobs depend on, once
//! per kernel.
//!
//! # Example
//!
//! ```ignore
//! fn main() -> anyhow::Result<()> {
//!     hlsdse_cli::run()
//! }
//! ```

mod collect;
mod config;
mod dispatcher;
mod kernels;
mod launcher;
mod planner;
mod progress;
mod supervisor;

pub use collect::{CollectError, collect_records};
pub use config::{CONFIG_FILE, DseConfig, PathsConfig, ReportConfig, RunnerConfig};
pub use dispatcher::{
    DispatchError, DispatchOptions, DispatchSummary, JobDispatcher, PointSource, SlotSummary,
};
pub use kernels::{BASE_DIR, KernelSourceError, Layout, LoadedKernel};
pub use launcher::{JobHandle, JobLauncher, JobOutput, LaunchError};
pub use planner::{KernelPlan, build_plan, format_plan};
pub use progress::{BarProgress, NullProgress, ProgressSink, percent};
pub use supervisor::{
    LaunchSettings, ProcessHandle, ProcessLauncher, TRACE_LOG, TRACE_TIME, run_trace,
};

use anyhow::{Context, bail};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use hlsdse_core::{AcceptedPoints, KernelDescriptor};
use hlsdse_report::{
    MetricsRecord, ReportExtractor, RunSummary, SlotTiming, generate_csv_report,
    generate_json_summary,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Run summary written to each kernel's base directory by `explore`
pub const RUN_SUMMARY_FILE: &str = "explore.json";

/// hlsdse CLI arguments
#[derive(Parser, Debug)]
#[command(name = "hlsdse")]
#[command(author, version, about = "hlsdse - design-space exploration for HLS kernels")]
pub struct Cli {
    /// Command to run
    #[command(subcommand)]
    pub command: Commands,

    /// Number of concurrent synthesis jobs
    #[arg(long, short = 'j', global = true)]
    pub jobs: Option<usize>,

    /// Do not bind jobs to the per-slot caches
    #[arg(long, global = true)]
    pub no_cache: bool,

    /// Discard tool output and hide progress bars
    #[arg(long, global = true)]
    pub silent: bool,

    /// Directory prepended to PATH for the jobs
    #[arg(long, global = true)]
    pub tool_path: Option<PathBuf>,

    /// Clock uncertainty in percent
    #[arg(long, global = true)]
    pub uncertainty: Option<f64>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (discovered from the current directory otherwise)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

/// Experiment and kernel selection
#[derive(Args, Debug, Clone)]
pub struct Target {
    /// Experiment folder under the sources directory
    pub experiment: String,

    /// Kernels to process (all kernels of the experiment if empty)
    pub kernels: Vec<String>,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Count the design space of each kernel without launching anything
    List(Target),
    /// Generate each kernel's dynamic trace, needed before exploring
    Trace(Target),
    /// Run one synthesis job per schedulable design point
    Explore {
        /// Experiment and kernels
        #[command(flatten)]
        target: Target,
        /// Parse reports as jobs finish and write the CSV
        #[arg(long)]
        extract: bool,
    },
    /// Parse the reports of a finished exploration into a CSV
    Collect(Target),
    /// Write a default dse.toml in the current directory
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run the hlsdse CLI with the process arguments.
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_with_cli(cli)
}

/// Run the hlsdse CLI with pre-parsed arguments.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let filter = if cli.verbose {
        "hlsdse=debug"
    } else {
        "hlsdse=info"
    };
    // A subscriber may already be installed when driven from tests
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    match &cli.command {
        Commands::Init { force } => init_config(*force),
        Commands::List(target) => {
            let config = load_config(&cli)?;
            list_kernels(&config, target, cli.verbose)
        }
        Commands::Trace(target) => {
            let config = load_config(&cli)?;
            trace_kernels(&config, target)
        }
        Commands::Explore { target, extract } => {
            let config = load_config(&cli)?;
            let extract = *extract || config.runner.extract;
            explore_kernels(&config, target, extract)
        }
        Commands::Collect(target) => {
            let config = load_config(&cli)?;
            collect_kernels(&config, target)
        }
    }
}

/// Layer configuration: dse.toml (explicit or discovered) then CLI flags
fn load_config(cli: &Cli) -> anyhow::Result<DseConfig> {
    let mut config = match &cli.config {
        Some(path) => DseConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => match DseConfig::discover()? {
            Some(config) => config,
            None => DseConfig {
                root: std::env::current_dir()?,
                ..DseConfig::default()
            },
        },
    };

    config.runner.tool_path = config
        .runner
        .tool_path
        .as_deref()
        .map(|path| config.resolve(path));

    if let Some(jobs) = cli.jobs {
        config.runner.jobs = jobs;
    }
    if cli.no_cache {
        config.runner.cache = false;
    }
    if cli.silent {
        config.runner.silent = true;
    }
    if let Some(tool_path) = &cli.tool_path {
        config.runner.tool_path = Some(tool_path.clone());
    }
    if let Some(uncertainty) = cli.uncertainty {
        config.runner.uncertainty = uncertainty;
    }
    config.runner.jobs = config.runner.jobs.max(1);

    tracing::debug!(root = %config.root.display(), jobs = config.runner.jobs, "Configuration loaded");
    Ok(config)
}

fn selected_kernels(layout: &Layout, target: &Target) -> anyhow::Result<Vec<String>> {
    if !target.kernels.is_empty() {
        return Ok(target.kernels.clone());
    }
    Ok(layout.list_kernels(&target.experiment)?)
}

fn load_kernel(layout: &Layout, experiment: &str, kernel: &str) -> anyhow::Result<LoadedKernel> {
    layout.load_kernel(experiment, kernel).with_context(|| {
        format!(
            "failed to load kernel \"{}\" of experiment \"{}\"",
            kernel, experiment
        )
    })
}

fn list_kernels(config: &DseConfig, target: &Target, verbose: bool) -> anyhow::Result<()> {
    let layout = Layout::from_config(config);
    println!("hlsdse Plan ({}):", target.experiment);

    let mut schedulable = 0;
    for name in selected_kernels(&layout, target)? {
        let kernel = load_kernel(&layout, &target.experiment, &name)?;
        let plan = build_plan(&name, &kernel.descriptor, verbose);
        schedulable += plan.census.schedulable();
        print!("{}", format_plan(&plan));
    }

    println!("{} jobs to run.", schedulable);
    Ok(())
}

fn require_base_dir(layout: &Layout, experiment: &str, kernel: &str) -> anyhow::Result<PathBuf> {
    let base = layout.base_dir(experiment, kernel);
    if !base.is_dir() {
        bail!(
            "base folder for kernel \"{}\" of experiment \"{}\" not found at {}",
            kernel,
            experiment,
            base.display()
        );
    }
    Ok(base)
}

fn trace_kernels(config: &DseConfig, target: &Target) -> anyhow::Result<()> {
    let layout = Layout::from_config(config);

    for name in selected_kernels(&layout, target)? {
        let kernel = load_kernel(&layout, &target.experiment, &name)?;
        let base = require_base_dir(&layout, &target.experiment, &name)?;

        let progress: Box<dyn ProgressSink> = if config.runner.silent {
            Box::new(NullProgress)
        } else {
            Box::new(BarProgress::new(1))
        };
        let title = format!("Generating trace for {}", name);
        progress.update(0, 0, &format!("Running {}...", config.runner.tracer), Some(&title));

        let elapsed_ns = run_trace(
            &name,
            &base,
            &kernel.settings,
            &launch_settings(config, &name),
            &config.runner.tracer,
        )
        .with_context(|| {
            format!(
                "trace of kernel \"{}\" of experiment \"{}\" failed",
                name, target.experiment
            )
        })?;

        progress.update(
            0,
            100,
            &format!("Done, {:.3}us", elapsed_ns as f64 / 1000.0),
            None,
        );
        progress.finish();
        tracing::info!(kernel = %name, elapsed_ns, "Trace generated");
    }

    Ok(())
}

fn explore_kernels(config: &DseConfig, target: &Target, extract: bool) -> anyhow::Result<()> {
    let layout = Layout::from_config(config);
    let poll_interval = config
        .poll_interval()
        .context("invalid runner.poll_interval")?;
    let extractor = if extract {
        Some(ReportExtractor::new(&config.report.grammar).context("invalid report grammar")?)
    } else {
        None
    };

    for name in selected_kernels(&layout, target)? {
        let kernel = load_kernel(&layout, &target.experiment, &name)?;
        let base = require_base_dir(&layout, &target.experiment, &name)?;

        let plan = build_plan(&name, &kernel.descriptor, false);
        tracing::info!(
            kernel = %name,
            total = plan.census.total,
            bypassed = plan.census.bypassed,
            schedulable = plan.census.schedulable(),
            "Exploring kernel"
        );

        let slots = config.runner.jobs;
        let mut launcher = ProcessLauncher::new(
            name.as_str(),
            layout.kernel_dir(&target.experiment, &name),
            kernel.settings.clone(),
            launch_settings(config, &name),
        );
        let progress: Box<dyn ProgressSink> = if config.runner.silent {
            Box::new(NullProgress)
        } else {
            Box::new(BarProgress::new(slots))
        };
        let options = DispatchOptions {
            slots,
            poll_interval,
            expected: Some(plan.census.schedulable()),
            title: Some(format!("Exploring {}", name)),
        };

        let started_at = Utc::now();
        let mut dispatcher =
            JobDispatcher::new(&kernel.descriptor, options).with_progress(progress.as_ref());
        if let Some(extractor) = &extractor {
            dispatcher = dispatcher.with_extractor(extractor);
        }
        let summary = dispatcher.run(&mut launcher).with_context(|| {
            format!(
                "exploration of kernel \"{}\" of experiment \"{}\" failed",
                name, target.experiment
            )
        })?;

        let mut run = RunSummary::new(&target.experiment, &name, started_at, plan.census);
        run.slots = slots;
        run.submitted = summary.submitted;
        run.bypassed = summary.bypassed;
        run.total_elapsed_ns = summary.total_elapsed_ns;
        run.slot_timings = summary
            .slots
            .iter()
            .enumerate()
            .map(|(slot, timing)| SlotTiming {
                slot,
                jobs: timing.jobs,
                elapsed_ns: timing.elapsed_ns,
            })
            .collect();
        let summary_path = base.join(RUN_SUMMARY_FILE);
        std::fs::write(&summary_path, generate_json_summary(&run)?)
            .with_context(|| format!("failed to write {}", summary_path.display()))?;

        tracing::info!(
            kernel = %name,
            submitted = run.submitted,
            bypassed = run.bypassed,
            elapsed_ms = run.total_elapsed_ns / 1_000_000,
            "Exploration finished"
        );

        if extractor.is_some() {
            let records = in_enumeration_order(&kernel.descriptor, summary.records);
            let path = layout.csv_path(&target.experiment, &name);
            write_csv(&path, &records)?;
            println!("{}: {} records written to {}", name, records.len(), path.display());
        }
    }

    Ok(())
}

fn collect_kernels(config: &DseConfig, target: &Target) -> anyhow::Result<()> {
    let layout = Layout::from_config(config);
    let extractor =
        ReportExtractor::new(&config.report.grammar).context("invalid report grammar")?;

    for name in selected_kernels(&layout, target)? {
        let kernel = load_kernel(&layout, &target.experiment, &name)?;
        let records = collect_records(
            &kernel.descriptor,
            &layout.kernel_dir(&target.experiment, &name),
            &config.report.file_name(&name),
            &extractor,
        )
        .with_context(|| {
            format!(
                "collecting results of kernel \"{}\" of experiment \"{}\" failed",
                name, target.experiment
            )
        })?;

        let path = layout.csv_path(&target.experiment, &name);
        write_csv(&path, &records)?;
        tracing::info!(kernel = %name, records = records.len(), "Results collected");
        println!("{}: {} records written to {}", name, records.len(), path.display());
    }

    Ok(())
}

fn init_config(force: bool) -> anyhow::Result<()> {
    let path = std::env::current_dir()?.join(CONFIG_FILE);
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    std::fs::write(&path, DseConfig::default_toml())
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("Created {}", path.display());
    Ok(())
}

fn launch_settings(config: &DseConfig, kernel: &str) -> LaunchSettings {
    LaunchSettings {
        program: config.runner.program.clone(),
        target: config.runner.target.clone(),
        tool_path: config.runner.tool_path.clone(),
        cache: config.runner.cache,
        silent: config.runner.silent,
        uncertainty: config.runner.uncertainty,
        report_file: config.report.file_name(kernel),
    }
}

/// Records arrive in completion order when slots race; rows follow enumeration order
fn in_enumeration_order(
    descriptor: &KernelDescriptor,
    mut records: Vec<MetricsRecord>,
) -> Vec<MetricsRecord> {
    let order: HashMap<String, usize> = AcceptedPoints::new(descriptor)
        .enumerate()
        .map(|(index, point)| (point.code, index))
        .collect();
    records.sort_by_key(|record| order.get(&record.code).copied().unwrap_or(usize::MAX));
    records
}

fn write_csv(path: &Path, records: &[MetricsRecord]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, generate_csv_report(records))
        .with_context(|| format!("failed to write {}", path.display()))
}
