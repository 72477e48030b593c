//! Configuration loading from dse.toml
//!
//! hlsdse configuration can be specified in a `dse.toml` file in the project root.
//! The configuration is automatically discovered by walking up from the current directory.
//! Relative paths in `[paths]` are resolved against the directory holding the file.

use hlsdse_report::ReportGrammar;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name looked up by `DseConfig::discover`
pub const CONFIG_FILE: &str = "dse.toml";

/// hlsdse configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DseConfig {
    /// Job runner configuration
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Directory layout
    #[serde(default)]
    pub paths: PathsConfig,
    /// Report file name and grammar
    #[serde(default)]
    pub report: ReportConfig,
    /// Directory the configuration was loaded from
    #[serde(skip)]
    pub root: PathBuf,
}

/// Runner configuration for the synthesis jobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Number of concurrent jobs
    #[serde(default = "default_jobs")]
    pub jobs: usize,
    /// Bind each job to its slot's persistent cache
    #[serde(default = "default_cache")]
    pub cache: bool,
    /// Discard the tool's output instead of logging it per slot
    #[serde(default)]
    pub silent: bool,
    /// Clock uncertainty handed to the tool (percent)
    #[serde(default = "default_uncertainty")]
    pub uncertainty: f64,
    /// Directory prepended to PATH for the jobs
    #[serde(default)]
    pub tool_path: Option<PathBuf>,
    /// Program run for each design point
    #[serde(default = "default_program")]
    pub program: String,
    /// Target passed to the program
    #[serde(default = "default_target")]
    pub target: String,
    /// Tracer run once per kernel by `trace`
    #[serde(default = "default_tracer")]
    pub tracer: String,
    /// Idle wait between scans of the job slots (e.g., "50ms")
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,
    /// Parse each report as soon as its job finishes
    #[serde(default)]
    pub extract: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            jobs: default_jobs(),
            cache: default_cache(),
            silent: false,
            uncertainty: default_uncertainty(),
            tool_path: None,
            program: default_program(),
            target: default_target(),
            tracer: default_tracer(),
            poll_interval: default_poll_interval(),
            extract: false,
        }
    }
}

fn default_jobs() -> usize {
    1
}
fn default_cache() -> bool {
    true
}
fn default_uncertainty() -> f64 {
    27.0
}
fn default_program() -> String {
    "make".to_string()
}
fn default_target() -> String {
    "estimate".to_string()
}
fn default_tracer() -> String {
    "lina".to_string()
}
fn default_poll_interval() -> String {
    "50ms".to_string()
}

/// Directory layout of an exploration project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Kernel configs: `<sources>/<experiment>/<kernel>/<kernel>.json`
    #[serde(default = "default_sources")]
    pub sources: PathBuf,
    /// Work directories: `<workspace>/<experiment>/<kernel>/<code>`
    #[serde(default = "default_workspace")]
    pub workspace: PathBuf,
    /// Result tables: `<csvs>/<experiment>/<kernel>.csv`
    #[serde(default = "default_csvs")]
    pub csvs: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            sources: default_sources(),
            workspace: default_workspace(),
            csvs: default_csvs(),
        }
    }
}

fn default_sources() -> PathBuf {
    PathBuf::from("sources")
}
fn default_workspace() -> PathBuf {
    PathBuf::from("workspace")
}
fn default_csvs() -> PathBuf {
    PathBuf::from("csvs")
}

/// Where each job leaves its report, and how to read it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Report file name inside a point directory; `{kernel}` is substituted
    #[serde(default = "default_report_file")]
    pub file: String,
    /// Marker and pattern overrides
    #[serde(flatten)]
    pub grammar: ReportGrammar,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            file: default_report_file(),
            grammar: ReportGrammar::default(),
        }
    }
}

fn default_report_file() -> String {
    "{kernel}_summary.log".to_string()
}

impl ReportConfig {
    /// Report file name for one kernel
    pub fn file_name(&self, kernel: &str) -> String {
        self.file.replace("{kernel}", kernel)
    }
}

impl DseConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;
        config.root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(config)
    }

    /// Try to discover and load configuration by walking up from current directory
    pub fn discover() -> anyhow::Result<Option<Self>> {
        let mut dir = std::env::current_dir()?;
        loop {
            let config_path = dir.join(CONFIG_FILE);
            if config_path.exists() {
                return Self::load(&config_path).map(Some);
            }
            if !dir.pop() {
                break;
            }
        }
        Ok(None)
    }

    /// Resolve a configured path against the configuration root
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Idle wait between slot scans
    pub fn poll_interval(&self) -> anyhow::Result<Duration> {
        Ok(Duration::from_nanos(Self::parse_duration(
            &self.runner.poll_interval,
        )?))
    }

    /// Generate a default configuration as TOML string
    pub fn default_toml() -> String {
        r#"# hlsdse Configuration

[runner]
# Number of concurrent synthesis jobs
jobs = 1
# Reuse one persistent cache per job slot
cache = true
# Discard tool output instead of writing lina.explore.<n>.out logs
silent = false
# Clock uncertainty in percent
uncertainty = 27.0
# Directory prepended to PATH for the jobs (uncomment to enable)
# tool_path = "/opt/lina/bin"
# Program and target run in each design point directory
program = "make"
target = "estimate"
# Tracer run in each kernel's base directory by `hlsdse trace`
tracer = "lina"
# Idle wait between scans of the job slots
poll_interval = "50ms"
# Parse reports as jobs finish and write the CSV at the end of explore
extract = false

[paths]
sources = "sources"
workspace = "workspace"
csvs = "csvs"

[report]
# Report file inside each design point directory
file = "{kernel}_summary.log"
# Marker and pattern overrides (uncomment to change)
# table_start = "DDDG type: non-perfect loop nest (more than 1 DDDG)"
# pipeline_marker = "Loop pipelining enabled? yes"
# latency = '^Total cycles: (\d+)'
# initiation_interval = '^Initiation interval \(if applicable\): (\d+)'
"#
        .to_string()
    }

    /// Parse duration string (e.g., "3s", "500ms", "2m") to nanoseconds
    pub fn parse_duration(s: &str) -> anyhow::Result<u64> {
        let s = s.trim();
        if s.is_empty() {
            return Err(anyhow::anyhow!("Empty duration string"));
        }

        // Find where the number ends and unit begins
        let (num_part, unit_part) = s
            .char_indices()
            .find(|(_, c)| c.is_alphabetic())
            .map(|(i, _)| s.split_at(i))
            .unwrap_or((s, "s"));

        let value: f64 = num_part
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid duration number: {}", num_part))?;

        let multiplier: u64 = match unit_part.to_lowercase().as_str() {
            "ns" => 1,
            "us" | "µs" => 1_000,
            "ms" => 1_000_000,
            "s" | "" => 1_000_000_000,
            "m" | "min" => 60_000_000_000,
            _ => return Err(anyhow::anyhow!("Unknown duration unit: {}", unit_part)),
        };

        Ok((value * multiplier as f64) as u64)
    }
}
