//! JSON Output

use chrono::{DateTime, Utc};
use hlsdse_core::Census;
use serde::{Deserialize, Serialize};

/// Summary of one explore run over a kernel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Summary format version
    pub schema_version: u32,
    /// Experiment the kernel belongs to
    pub experiment: String,
    /// Kernel name
    pub kernel: String,
    /// When dispatch started
    pub started_at: DateTime<Utc>,
    /// Number of slots
    pub slots: usize,
    /// Points in the design space, bypassed ones included
    pub total: u64,
    /// Jobs submitted
    pub submitted: u64,
    /// Points skipped by the bypass rule
    pub bypassed: u64,
    /// Per-slot timings
    pub slot_timings: Vec<SlotTiming>,
    /// Wall-clock time of the whole dispatch
    pub total_elapsed_ns: u64,
}

/// Work done by one slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotTiming {
    /// Slot index
    pub slot: usize,
    /// Jobs the slot ran
    pub jobs: u64,
    /// Summed job time
    pub elapsed_ns: u64,
}

impl RunSummary {
    /// Start a summary from the counting pass
    pub fn new(
        experiment: impl Into<String>,
        kernel: impl Into<String>,
        started_at: DateTime<Utc>,
        census: Census,
    ) -> Self {
        Self {
            schema_version: 1,
            experiment: experiment.into(),
            kernel: kernel.into(),
            started_at,
            slots: 0,
            total: census.total,
            submitted: 0,
            bypassed: census.bypassed,
            slot_timings: Vec::new(),
            total_elapsed_ns: 0,
        }
    }
}

/// Generate a prettified JSON run summary
pub fn generate_json_summary(summary: &RunSummary) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_json() {
        let mut summary = RunSummary::new(
            "baseline",
            "gemm",
            Utc::now(),
            Census {
                total: 10,
                bypassed: 4,
            },
        );
        summary.slots = 2;
        summary.submitted = 6;
        summary.slot_timings = vec![
            SlotTiming {
                slot: 0,
                jobs: 3,
                elapsed_ns: 30,
            },
            SlotTiming {
                slot: 1,
                jobs: 3,
                elapsed_ns: 40,
            },
        ];

        let json = generate_json_summary(&summary).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["kernel"], "gemm");
        assert_eq!(value["bypassed"], 4);
        assert_eq!(value["slot_timings"][1]["elapsed_ns"], 40);
        assert!(value["started_at"].is_string());
    }
}
