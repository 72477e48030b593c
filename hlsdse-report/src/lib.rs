#![warn(missing_docs)]
//! hlsdse Report - Extraction and Output
//!
//! Turns the free-text summary a synthesis job leaves behind into metrics,
//! and writes the per-kernel outputs:
//! - metrics extraction (two independent line scans)
//! - completion artifacts (`id.file`)
//! - CSV result tables
//! - JSON run summaries

mod csv;
mod extract;
mod json;
mod record;

pub use csv::{CSV_HEADER, MISSING_VALUE, generate_csv_report};
pub use extract::{ParseError, ReportExtractor, ReportGrammar};
pub use json::{RunSummary, SlotTiming, generate_json_summary};
pub use record::{
    ArtifactError, COMPLETION_ARTIFACT, CompletionRecord, MetricsRecord, ReportMetrics,
    ResourceKind,
};
