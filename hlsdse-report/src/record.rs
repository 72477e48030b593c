//! Result Records

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// File name of the per-point completion artifact
pub const COMPLETION_ARTIFACT: &str = "id.file";

/// Resource counted in the loop nest table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// DSP slices
    Dsp,
    /// Flip-flops
    Ff,
    /// Lookup tables
    Lut,
    /// 18k block RAMs
    Bram,
}

impl ResourceKind {
    /// Every kind, in CSV column order
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Dsp,
        ResourceKind::Ff,
        ResourceKind::Lut,
        ResourceKind::Bram,
    ];

    /// Lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Dsp => "dsp",
            ResourceKind::Ff => "ff",
            ResourceKind::Lut => "lut",
            ResourceKind::Bram => "bram",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metrics read from one report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportMetrics {
    /// Total latency in cycles
    pub latency_cycles: u64,
    /// Resource counts present in the report
    pub resources: BTreeMap<ResourceKind, u64>,
    /// Initiation interval of the pipelined loop, if any
    pub initiation_interval: Option<u64>,
}

/// Scheduling metadata of one finished point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRecord {
    /// Slot that ran the job
    pub slot: usize,
    /// Wall-clock time of the job
    pub elapsed_ns: u64,
}

/// Completion artifact that cannot be read back
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed completion artifact: {0}")]
    Malformed(String),
}

impl CompletionRecord {
    /// Artifact text: slot index and elapsed nanoseconds, one per line
    pub fn to_artifact(&self) -> String {
        format!("{}\n{}\n", self.slot, self.elapsed_ns)
    }

    /// Write the artifact into a point directory
    pub fn write_to(&self, point_dir: &Path) -> Result<(), ArtifactError> {
        std::fs::write(point_dir.join(COMPLETION_ARTIFACT), self.to_artifact())?;
        Ok(())
    }

    /// Read the artifact back from a point directory
    pub fn read_from(point_dir: &Path) -> Result<Self, ArtifactError> {
        let text = std::fs::read_to_string(point_dir.join(COMPLETION_ARTIFACT))?;
        text.parse()
    }
}

impl FromStr for CompletionRecord {
    type Err = ArtifactError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut lines = s.lines().map(str::trim).filter(|l| !l.is_empty());
        let mut field = |name: &str| {
            lines
                .next()
                .ok_or_else(|| ArtifactError::Malformed(format!("missing {}", name)))
        };
        let slot = field("slot")?;
        let elapsed = field("elapsed time")?;

        Ok(Self {
            slot: slot
                .parse()
                .map_err(|_| ArtifactError::Malformed(format!("bad slot \"{}\"", slot)))?,
            elapsed_ns: elapsed
                .parse()
                .map_err(|_| ArtifactError::Malformed(format!("bad elapsed time \"{}\"", elapsed)))?,
        })
    }
}

/// One row of results, keyed by design point code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    /// Canonical code of the point
    pub code: String,
    /// Clock period in ns
    pub period: f64,
    /// Total latency in cycles
    pub latency_cycles: u64,
    /// Resource counts present in the report
    pub resources: BTreeMap<ResourceKind, u64>,
    /// Initiation interval, if the point has a pipelined loop
    pub initiation_interval: Option<u64>,
    /// Slot that ran the job
    pub job_id: usize,
    /// Wall-clock time of the job
    pub elapsed_ns: u64,
}

impl MetricsRecord {
    /// Merge extracted metrics with scheduling metadata
    pub fn new(
        code: impl Into<String>,
        period: f64,
        metrics: ReportMetrics,
        completion: CompletionRecord,
    ) -> Self {
        Self {
            code: code.into(),
            period,
            latency_cycles: metrics.latency_cycles,
            resources: metrics.resources,
            initiation_interval: metrics.initiation_interval,
            job_id: completion.slot,
            elapsed_ns: completion.elapsed_ns,
        }
    }

    /// Execution time in ns (period times latency)
    pub fn exec_time(&self) -> f64 {
        self.period * self.latency_cycles as f64
    }

    /// Count of one resource, if reported
    pub fn resource(&self, kind: ResourceKind) -> Option<u64> {
        self.resources.get(&kind).copied()
    }
}
