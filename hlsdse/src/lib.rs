#![warn(missing_docs)]
//! # hlsdse
//!
//! Design-space exploration for high-level synthesis kernels.
//!
//! hlsdse walks every combination of a kernel's optimisation knobs (loop
//! unrolling, loop pipelining, array partitioning and clock targets), runs the
//! synthesis estimator once per design point on a fixed pool of job slots,
//! and turns the resulting reports into one CSV row per point:
//! - **Enumeration**: a deterministic mixed-radix odometer over the knobs,
//!   with a bypass rule that skips redundant points
//! - **Dispatch**: N job slots polled without blocking, each bound to its own
//!   persistent cache
//! - **Extraction**: a two-scan reader for latency, resources and initiation
//!   interval
//!
//! ## Quick Start
//!
//! ```ignore
//! use hlsdse::{DesignPointEnumerator, KernelConfig};
//!
//! let config = KernelConfig::from_json(&std::fs::read_to_string("gemm.json")?)?;
//! let descriptor = config.descriptor()?;
//! let mut points = DesignPointEnumerator::new(&descriptor);
//! while points.advance() {
//!     println!("{}", points.code()?);
//! }
//! ```
//!
//! ## Command Line
//!
//! ```text
//! hlsdse init
//! hlsdse list baseline --verbose
//! hlsdse trace baseline gemm
//! hlsdse explore baseline gemm --jobs 4
//! hlsdse collect baseline gemm
//! ```

// Re-export core types
pub use hlsdse_core::{
    AcceptedPoints, ArrayOptions, ArraySetting, Census, DescriptorError, DesignPoint,
    DesignPointEnumerator, EnumerationError, KernelConfig, KernelDescriptor, LoopLevel,
    LoopSetting, OperatingPoints, OperatingUnit, Partitioning, ToolSettings, census,
};

// Re-export report types
pub use hlsdse_report::{
    CSV_HEADER, CompletionRecord, MISSING_VALUE, MetricsRecord, ParseError, ReportExtractor,
    ReportGrammar, ReportMetrics, ResourceKind, RunSummary, generate_csv_report,
    generate_json_summary,
};

// Re-export the driver
pub use hlsdse_cli::{
    Cli, Commands, DispatchError, DispatchOptions, DispatchSummary, DseConfig, JobDispatcher,
    JobHandle, JobLauncher, JobOutput, LaunchError, LaunchSettings, Layout, ProcessLauncher,
    ProgressSink, TRACE_TIME, Target, collect_records, run_trace, run_with_cli,
};

/// Run the hlsdse command line.
///
/// ```ignore
/// fn main() -> anyhow::Result<()> {
///     hlsdse::run()
/// }
/// ```
pub use hlsdse_cli::run;
