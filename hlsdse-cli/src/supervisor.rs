//! Synthesis Job Supervision
//!
//! Runs the synthesis tool as one child process per design point, inside the
//! point's work directory.

use crate::launcher::{JobHandle, JobLauncher, JobOutput, LaunchError};
use hlsdse_core::{DesignPoint, ToolSettings};
use hlsdse_report::{COMPLETION_ARTIFACT, CompletionRecord};
use std::env;
use std::ffi::OsString;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

/// Cache file name inside a point directory
const CACHE_LINK: &str = "futurecache.db";

/// Send SIGTERM to a process. Returns `Err` if the signal could not be delivered.
fn send_sigterm(pid: u32) -> Result<(), std::io::Error> {
    let ret = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if ret == -1 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Trace left by `run_trace` and read by every estimate job of the kernel
const TRACE_FILE: &str = "dynamic_trace.gz";

/// Linked bitcode the tracer runs on, inside the base directory
const TRACE_INPUT: &str = "linked_opt.bc";

/// Tracer output log inside the base directory
pub const TRACE_LOG: &str = "lina.trace.out";

/// Tracer wall-clock time inside the base directory
pub const TRACE_TIME: &str = "trace.time";

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

fn remove_if_present(path: &Path) -> Result<(), std::io::Error> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// How jobs are started
#[derive(Debug, Clone)]
pub struct LaunchSettings {
    /// Program run in the point directory
    pub program: String,
    /// Target passed after the variables
    pub target: String,
    /// Directory prepended to the jobs' PATH
    pub tool_path: Option<PathBuf>,
    /// Bind points to per-slot caches
    pub cache: bool,
    /// Discard job output
    pub silent: bool,
    /// Clock uncertainty in percent
    pub uncertainty: f64,
    /// Report file name inside the point directory
    pub report_file: String,
}

/// `PATH` for child processes with `tool_path` in front, if one is configured
fn search_path(tool_path: Option<&Path>) -> Result<Option<OsString>, LaunchError> {
    let Some(tool_path) = tool_path else {
        return Ok(None);
    };
    let inherited = env::var_os("PATH").unwrap_or_default();
    let mut paths = vec![tool_path.to_path_buf()];
    paths.extend(env::split_paths(&inherited));
    Ok(Some(env::join_paths(paths)?))
}

/// Tracer command line for one kernel, run inside its base directory
fn trace_command(
    kernel: &str,
    base_dir: &Path,
    tool: &ToolSettings,
    settings: &LaunchSettings,
    program: &str,
) -> Command {
    let mut command = Command::new(program);
    command.current_dir(base_dir);
    if !settings.silent {
        command.arg("-v");
    }
    command
        .arg("-l")
        .arg(tool.loop_id.to_string())
        .args(["--mode", "trace", "--short-mem-trace", TRACE_INPUT])
        .arg(kernel)
        .stdin(Stdio::null());
    command
}

/// Generate the dynamic trace of one kernel, blocking until the tracer exits.
///
/// Runs in `base_dir` after removing the previous trace. Output goes to
/// `lina.trace.out` unless silent. On success the elapsed time is written to
/// `trace.time` and returned in nanoseconds.
pub fn run_trace(
    kernel: &str,
    base_dir: &Path,
    tool: &ToolSettings,
    settings: &LaunchSettings,
    program: &str,
) -> Result<u64, LaunchError> {
    remove_if_present(&base_dir.join(TRACE_FILE))?;

    let mut command = trace_command(kernel, base_dir, tool, settings, program);
    if let Some(path) = search_path(settings.tool_path.as_deref())? {
        command.env("PATH", path);
    }
    let log = File::create(base_dir.join(TRACE_LOG))?;
    if settings.silent {
        command.stdout(Stdio::null()).stderr(Stdio::null());
    } else {
        command
            .stdout(Stdio::from(log.try_clone()?))
            .stderr(Stdio::from(log));
    }

    tracing::debug!(kernel, program, loop_id = tool.loop_id, "Running tracer");
    let started = Instant::now();
    let status = command.status()?;
    let elapsed_ns = u64::try_from(started.elapsed().as_nanos()).unwrap_or(u64::MAX);

    if !status.success() {
        let output = JobOutput {
            exit_code: status.code(),
            report: None,
        };
        return Err(LaunchError::TraceFailed {
            kernel: kernel.to_string(),
            status: output.describe_exit(),
        });
    }

    std::fs::write(base_dir.join(TRACE_TIME), format!("{}ns\n", elapsed_ns))?;
    Ok(elapsed_ns)
}

/// Launches the synthesis tool for the points of one kernel
pub struct ProcessLauncher {
    kernel: String,
    kernel_dir: PathBuf,
    tool: ToolSettings,
    settings: LaunchSettings,
    logs: Vec<Option<File>>,
}

impl ProcessLauncher {
    /// Launcher for a kernel whose points live under `kernel_dir`
    pub fn new(
        kernel: impl Into<String>,
        kernel_dir: impl Into<PathBuf>,
        tool: ToolSettings,
        settings: LaunchSettings,
    ) -> Self {
        Self {
            kernel: kernel.into(),
            kernel_dir: kernel_dir.into(),
            tool,
            settings,
            logs: Vec::new(),
        }
    }

    fn base_dir(&self) -> PathBuf {
        self.kernel_dir.join(crate::kernels::BASE_DIR)
    }

    fn point_dir(&self, code: &str) -> PathBuf {
        self.kernel_dir.join(code)
    }

    fn cache_store(&self, slot: usize) -> String {
        format!("{}.{}", CACHE_LINK, slot)
    }

    /// Output sink for a slot; the log is truncated on first use in a run
    fn output_for(&mut self, slot: usize) -> Result<Stdio, LaunchError> {
        if self.settings.silent {
            return Ok(Stdio::null());
        }
        if self.logs.len() <= slot {
            self.logs.resize_with(slot + 1, || None);
        }
        if self.logs[slot].is_none() {
            let path = self
                .base_dir()
                .join(format!("lina.explore.{}.out", slot + 1));
            self.logs[slot] = Some(File::create(path)?);
        }
        match &self.logs[slot] {
            Some(log) => Ok(Stdio::from(log.try_clone()?)),
            None => Ok(Stdio::null()),
        }
    }

    /// Command line for one point
    fn command(&self, point: &DesignPoint) -> Command {
        let mut command = Command::new(&self.settings.program);
        command
            .current_dir(self.point_dir(&point.code))
            .arg(format!("VERBOSE={}", yes_no(!self.settings.silent)))
            .arg(format!("CACHE={}", yes_no(self.settings.cache)))
            .arg(format!("LOOPID={}", self.tool.loop_id))
            .arg(format!("PLATFORM={}", self.tool.platform.to_uppercase()))
            .arg(format!("UNC={:?}", self.settings.uncertainty))
            .arg(format!("VECTORISE={}", yes_no(self.tool.vectorise)))
            .arg(format!("DDRPOLICY={}", self.tool.ddr_policy))
            .arg(format!("KERNEL={}", self.kernel))
            .arg(format!("FREQ={:?}", point.frequency()))
            .arg(&self.settings.target)
            .stdin(Stdio::null());
        command
    }
}

impl JobLauncher for ProcessLauncher {
    type Handle = ProcessHandle;

    fn reset_slot_caches(&mut self, slots: usize) -> Result<(), LaunchError> {
        self.logs.clear();
        if !self.settings.cache {
            return Ok(());
        }
        let base = self.base_dir();
        for slot in 0..slots {
            tracing::debug!(slot, "Removing slot cache");
            remove_if_present(&base.join(self.cache_store(slot)))?;
        }
        Ok(())
    }

    fn prepare(&mut self, slot: usize, point: &DesignPoint) -> Result<(), LaunchError> {
        let dir = self.point_dir(&point.code);
        if !dir.is_dir() {
            return Err(LaunchError::MissingPointDir(dir));
        }

        remove_if_present(&dir.join(&self.settings.report_file))?;
        remove_if_present(&dir.join(COMPLETION_ARTIFACT))?;

        if self.settings.cache {
            let link = dir.join(CACHE_LINK);
            if link.symlink_metadata().is_ok() {
                std::fs::remove_file(&link)?;
            }
            let target = Path::new("..")
                .join(crate::kernels::BASE_DIR)
                .join(self.cache_store(slot));
            std::os::unix::fs::symlink(target, &link)?;
        }
        Ok(())
    }

    fn launch(&mut self, slot: usize, point: &DesignPoint) -> Result<ProcessHandle, LaunchError> {
        let mut command = self.command(point);
        if let Some(path) = search_path(self.settings.tool_path.as_deref())? {
            command.env("PATH", path);
        }

        let stdout = self.output_for(slot)?;
        let stderr = self.output_for(slot)?;
        // Silent runs drop stderr too
        command.stdout(stdout).stderr(stderr);

        let child = command.spawn()?;
        tracing::debug!(slot, pid = child.id(), code = %point.code, "Spawned job");

        Ok(ProcessHandle {
            child,
            report: self.point_dir(&point.code).join(&self.settings.report_file),
        })
    }

    fn record_completion(
        &mut self,
        code: &str,
        completion: &CompletionRecord,
    ) -> Result<(), LaunchError> {
        completion.write_to(&self.point_dir(code))?;
        Ok(())
    }
}

/// Running synthesis job
pub struct ProcessHandle {
    child: Child,
    report: PathBuf,
}

impl ProcessHandle {
    /// OS process id
    pub fn id(&self) -> u32 {
        self.child.id()
    }
}

impl JobHandle for ProcessHandle {
    fn is_alive(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(Some(_)) => false,
            Ok(None) => true,
            Err(_) => false,
        }
    }

    fn join(mut self) -> Result<JobOutput, LaunchError> {
        let status = self.child.wait()?;
        let report = match std::fs::read_to_string(&self.report) {
            Ok(text) => Some(text),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        Ok(JobOutput {
            exit_code: status.code(),
            report,
        })
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if self.is_alive() {
            // Graceful: SIGTERM first, brief wait, then SIGKILL
            let _ = send_sigterm(self.child.id());
            std::thread::sleep(Duration::from_millis(50));
            if self.is_alive() {
                let _ = self.child.kill();
            }
            let _ = self.child.wait();
        }
    }
}
