//! Integration tests for hlsdse
//!
//! These tests drive a whole project directory through the public API and the
//! command line: kernel configs on disk, jobs run as real child processes,
//! reports parsed back into a CSV.

use clap::Parser;
use hlsdse::{
    CSV_HEADER, Cli, CompletionRecord, DesignPoint, DesignPointEnumerator, DispatchError,
    DispatchOptions, JobDispatcher, JobHandle, JobLauncher, JobOutput, KernelConfig, LaunchError,
    Layout, ReportExtractor, ReportGrammar, RunSummary, TRACE_TIME, census, run_with_cli,
};
use std::path::{Path, PathBuf};
use std::time::Duration;

const GEMM: &str = r#"{
    "periods": [10.0],
    "loops": [ { "bound": 8, "unrolling": [2, 4], "pipelining": false, "nest": {} } ],
    "arrays": { "A": { "size": 4, "words": 64, "block": [], "cyclic": [4], "complete": false } },
    "platform": "zcu102"
}"#;

const CODES: [&str; 6] = [
    "p10.0_l0.1.0.0_aA.none.0",
    "p10.0_l0.1.0.2_aA.none.0",
    "p10.0_l0.1.0.4_aA.none.0",
    "p10.0_l0.1.0.0_aA.cyclic.4",
    "p10.0_l0.1.0.2_aA.cyclic.4",
    "p10.0_l0.1.0.4_aA.cyclic.4",
];

fn report(latency: u64) -> String {
    format!(
        "DDDG type: non-perfect loop nest (more than 1 DDDG)\nTotal cycles: {}\nDSPs: 4\nFFs: 340\n{}\n",
        latency,
        "=".repeat(71)
    )
}

/// Lay out a project with one kernel and a config running `program` per point
fn project(root: &Path, program: &str) -> PathBuf {
    let kernel_src = root.join("sources/baseline/gemm");
    std::fs::create_dir_all(&kernel_src).unwrap();
    std::fs::write(kernel_src.join("gemm.json"), GEMM).unwrap();

    let kernel_dir = root.join("workspace/baseline/gemm");
    std::fs::create_dir_all(kernel_dir.join("base")).unwrap();
    for code in CODES {
        std::fs::create_dir_all(kernel_dir.join(code)).unwrap();
    }

    let config = root.join("dse.toml");
    std::fs::write(
        &config,
        format!(
            "[runner]\njobs = 2\nsilent = true\nprogram = \"{0}\"\ntracer = \"{0}\"\npoll_interval = \"1ms\"\n",
            program
        ),
    )
    .unwrap();
    config
}

fn cli(config: &Path, args: &[&str]) -> Cli {
    let mut argv = vec!["hlsdse", "--config", config.to_str().unwrap()];
    argv.extend_from_slice(args);
    Cli::try_parse_from(argv).unwrap()
}

/// The enumeration of a JSON kernel visits every knob combination once
#[test]
fn test_enumeration_from_kernel_json() {
    let descriptor = KernelConfig::from_json(GEMM).unwrap().descriptor().unwrap();
    let mut points = DesignPointEnumerator::new(&descriptor);

    let mut codes = Vec::new();
    while points.advance() {
        codes.push(points.code().unwrap());
    }

    assert_eq!(codes, CODES);
    assert!(points.is_exhausted());
    assert!(!points.advance());
    assert_eq!(census(&descriptor).schedulable(), 6);
}

/// Explore runs one job per point, then collect turns the reports into a CSV
#[test]
fn test_explore_then_collect() {
    let dir = tempfile::tempdir().unwrap();
    let config = project(dir.path(), "true");
    let kernel_dir = dir.path().join("workspace/baseline/gemm");

    run_with_cli(cli(&config, &["explore", "baseline"])).unwrap();

    for code in CODES {
        let point = kernel_dir.join(code);
        let completion = CompletionRecord::read_from(&point).unwrap();
        assert!(completion.slot < 2);
        let link = std::fs::read_link(point.join("futurecache.db")).unwrap();
        assert!(link.to_string_lossy().starts_with("../base/futurecache.db."));
    }

    let summary: RunSummary = serde_json::from_str(
        &std::fs::read_to_string(kernel_dir.join("base/explore.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(summary.kernel, "gemm");
    assert_eq!(summary.experiment, "baseline");
    assert_eq!(summary.submitted, 6);
    assert_eq!(summary.bypassed, 0);
    assert_eq!(summary.slots, 2);
    assert_eq!(summary.slot_timings.iter().map(|t| t.jobs).sum::<u64>(), 6);

    for (i, code) in CODES.iter().enumerate() {
        std::fs::write(
            kernel_dir.join(code).join("gemm_summary.log"),
            report(100 * (i as u64 + 1)),
        )
        .unwrap();
    }
    run_with_cli(cli(&config, &["collect", "baseline", "gemm"])).unwrap();

    let csv = std::fs::read_to_string(dir.path().join("csvs/baseline/gemm.csv")).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], CSV_HEADER);
    assert_eq!(lines.len(), 7);
    assert!(lines[1].starts_with("p10.0_l0.1.0.0_aA.none.0,10.0,100,---,1000.0,4,340,---,---,"));
    assert!(lines[6].starts_with("p10.0_l0.1.0.4_aA.cyclic.4,10.0,600,---,6000.0,"));
}

/// A job exiting non-zero stops the run before any summary is written
#[test]
fn test_failing_job_aborts_explore() {
    let dir = tempfile::tempdir().unwrap();
    let config = project(dir.path(), "false");
    let kernel_dir = dir.path().join("workspace/baseline/gemm");

    let err = run_with_cli(cli(&config, &["explore", "baseline", "gemm"])).unwrap_err();
    let message = format!("{:#}", err);
    assert!(message.contains("gemm"), "{}", message);
    assert!(matches!(
        err.downcast_ref::<DispatchError>(),
        Some(DispatchError::JobFailed { .. })
    ));
    assert!(!kernel_dir.join("base/explore.json").exists());
}

/// Trace runs the tracer once per kernel and records how long it took
#[test]
fn test_trace_records_time() {
    let dir = tempfile::tempdir().unwrap();
    let config = project(dir.path(), "true");
    let base = dir.path().join("workspace/baseline/gemm/base");

    run_with_cli(cli(&config, &["trace", "baseline"])).unwrap();

    let time = std::fs::read_to_string(base.join(TRACE_TIME)).unwrap();
    assert!(time.ends_with("ns\n"), "{}", time);
    assert!(time.trim_end().trim_end_matches("ns").parse::<u64>().is_ok());

    let config = project(dir.path(), "false");
    let err = run_with_cli(cli(&config, &["trace", "baseline", "gemm"])).unwrap_err();
    assert!(format!("{:#}", err).contains("trace of kernel \"gemm\""));
}

#[test]
fn test_explore_requires_base_folder() {
    let dir = tempfile::tempdir().unwrap();
    let config = project(dir.path(), "true");
    std::fs::remove_dir(dir.path().join("workspace/baseline/gemm/base")).unwrap();

    let err = run_with_cli(cli(&config, &["explore", "baseline"])).unwrap_err();
    assert!(err.to_string().contains("base folder"));
}

/// A tuned experiment reuses the baseline's knobs and swaps the clock targets
#[test]
fn test_inherited_experiment() {
    let dir = tempfile::tempdir().unwrap();
    project(dir.path(), "true");
    let tuned = dir.path().join("sources/tuned/gemm");
    std::fs::create_dir_all(&tuned).unwrap();
    std::fs::write(
        tuned.join("gemm.json"),
        r#"{ "inherits": "baseline/gemm", "periods": [10.0, 5.0] }"#,
    )
    .unwrap();

    let layout = Layout::new(
        dir.path().join("sources"),
        dir.path().join("workspace"),
        dir.path().join("csvs"),
    );
    let kernel = layout.load_kernel("tuned", "gemm").unwrap();

    assert_eq!(kernel.settings.platform, "zcu102");
    assert_eq!(kernel.descriptor.arrays().len(), 1);
    assert_eq!(census(&kernel.descriptor).total, 12);
}

/// Jobs that finish instantly and hand back their report text
struct InstantHandle(Option<String>);

impl JobHandle for InstantHandle {
    fn is_alive(&mut self) -> bool {
        false
    }

    fn join(self) -> Result<JobOutput, LaunchError> {
        Ok(JobOutput {
            exit_code: Some(0),
            report: self.0,
        })
    }
}

#[derive(Default)]
struct InstantLauncher {
    completions: Vec<(String, usize)>,
}

impl JobLauncher for InstantLauncher {
    type Handle = InstantHandle;

    fn launch(&mut self, _slot: usize, point: &DesignPoint) -> Result<InstantHandle, LaunchError> {
        let latency = 10 * (point.code.len() as u64);
        Ok(InstantHandle(Some(report(latency))))
    }

    fn record_completion(
        &mut self,
        code: &str,
        completion: &CompletionRecord,
    ) -> Result<(), LaunchError> {
        self.completions.push((code.to_string(), completion.slot));
        Ok(())
    }
}

/// A custom launcher plugs into the dispatcher and reports are parsed inline
#[test]
fn test_dispatch_with_custom_launcher() {
    let descriptor = KernelConfig::from_json(GEMM).unwrap().descriptor().unwrap();
    let extractor = ReportExtractor::new(&ReportGrammar::default()).unwrap();
    let mut launcher = InstantLauncher::default();

    let summary = JobDispatcher::new(
        &descriptor,
        DispatchOptions {
            slots: 3,
            poll_interval: Duration::from_millis(1),
            expected: Some(6),
            title: None,
        },
    )
    .with_extractor(&extractor)
    .run(&mut launcher)
    .unwrap();

    assert_eq!(summary.submitted, 6);
    assert_eq!(summary.records.len(), 6);
    assert_eq!(launcher.completions.len(), 6);
    for record in &summary.records {
        assert_eq!(record.latency_cycles, 10 * record.code.len() as u64);
        assert_eq!(record.initiation_interval, None);
    }
}
