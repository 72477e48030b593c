//! Report Extraction
//!
//! Two scans over the same lines, each a small state machine:
//!
//! - the table scan enters at the non-perfect-loop-nest marker, reads latency
//!   and resource counts, and leaves at the separator line;
//! - the pipeline scan enters at the pipelining marker and leaves at the first
//!   initiation interval line.
//!
//! Both scans must finish outside their block.

use crate::record::{ReportMetrics, ResourceKind};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Marker lines and value patterns of the tool's summary report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportGrammar {
    /// Line opening the resource/latency table
    pub table_start: String,
    /// Line closing the table
    pub separator: String,
    /// Line opening the pipelined loop block
    pub pipeline_marker: String,
    /// Latency pattern (one capture group)
    pub latency: String,
    /// DSP count pattern
    pub dsp: String,
    /// Flip-flop count pattern
    pub ff: String,
    /// LUT count pattern
    pub lut: String,
    /// BRAM count pattern
    pub bram: String,
    /// Initiation interval pattern
    pub initiation_interval: String,
}

impl Default for ReportGrammar {
    fn default() -> Self {
        Self {
            table_start: "DDDG type: non-perfect loop nest (more than 1 DDDG)".to_string(),
            separator: "=".repeat(71),
            pipeline_marker: "Loop pipelining enabled? yes".to_string(),
            latency: r"^Total cycles: (\d+)".to_string(),
            dsp: r"^DSPs: (\d+)".to_string(),
            ff: r"^FFs: (\d+)".to_string(),
            lut: r"^LUTs: (\d+)".to_string(),
            bram: r"^BRAM18k: (\d+)".to_string(),
            initiation_interval: r"^Initiation interval \(if applicable\): (\d+)".to_string(),
        }
    }
}

/// Report text that does not follow the grammar
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("report has no loop nest table")]
    MissingTable,

    #[error("loop nest table has no latency line")]
    MissingLatency,

    #[error("loop nest table opened at line {line} is never closed")]
    UnterminatedTable { line: usize },

    #[error("pipelined loop block opened at line {line} has no initiation interval")]
    UnterminatedPipelineBlock { line: usize },

    #[error("second pipelined loop at line {second} (first at line {first})")]
    DuplicatePipelineMarker { first: usize, second: usize },

    #[error("{field} value \"{value}\" on line {line} is out of range")]
    InvalidValue {
        field: &'static str,
        value: String,
        line: usize,
    },
}

#[derive(Debug, Clone, Copy)]
enum TableScan {
    Seeking,
    InTable { opened_at: usize },
}

#[derive(Debug, Clone, Copy)]
enum PipelineScan {
    Seeking,
    InBlock { opened_at: usize },
}

/// Compiled `ReportGrammar`
#[derive(Debug, Clone)]
pub struct ReportExtractor {
    table_start: String,
    separator: String,
    pipeline_marker: String,
    latency: Regex,
    resources: Vec<(ResourceKind, Regex)>,
    initiation_interval: Regex,
}

impl ReportExtractor {
    /// Compile a grammar
    pub fn new(grammar: &ReportGrammar) -> Result<Self, regex::Error> {
        Ok(Self {
            table_start: grammar.table_start.clone(),
            separator: grammar.separator.clone(),
            pipeline_marker: grammar.pipeline_marker.clone(),
            latency: Regex::new(&grammar.latency)?,
            resources: vec![
                (ResourceKind::Dsp, Regex::new(&grammar.dsp)?),
                (ResourceKind::Ff, Regex::new(&grammar.ff)?),
                (ResourceKind::Lut, Regex::new(&grammar.lut)?),
                (ResourceKind::Bram, Regex::new(&grammar.bram)?),
            ],
            initiation_interval: Regex::new(&grammar.initiation_interval)?,
        })
    }

    /// Extract metrics from one report
    pub fn extract(&self, text: &str) -> Result<ReportMetrics, ParseError> {
        // `lines()` strips both `\n` and `\r\n`
        let lines: Vec<&str> = text.lines().collect();
        let (latency_cycles, resources) = self.scan_table(&lines)?;
        let initiation_interval = self.scan_pipeline(&lines)?;
        Ok(ReportMetrics {
            latency_cycles,
            resources,
            initiation_interval,
        })
    }

    fn scan_table(&self, lines: &[&str]) -> Result<(u64, BTreeMap<ResourceKind, u64>), ParseError> {
        let mut state = TableScan::Seeking;
        let mut found_table = false;
        let mut latency = None;
        let mut resources = BTreeMap::new();

        for (idx, line) in lines.iter().enumerate() {
            match state {
                TableScan::Seeking => {
                    if *line == self.table_start {
                        state = TableScan::InTable { opened_at: idx + 1 };
                        found_table = true;
                    }
                }
                TableScan::InTable { .. } => {
                    if *line == self.separator {
                        state = TableScan::Seeking;
                        // only the first table is read
                        break;
                    }
                    if let Some(value) = capture(&self.latency, line, "latency", idx)? {
                        latency.get_or_insert(value);
                        continue;
                    }
                    for (kind, pattern) in &self.resources {
                        if let Some(value) = capture(pattern, line, kind.as_str(), idx)? {
                            resources.entry(*kind).or_insert(value);
                            break;
                        }
                    }
                }
            }
        }

        if let TableScan::InTable { opened_at } = state {
            return Err(ParseError::UnterminatedTable { line: opened_at });
        }
        if !found_table {
            return Err(ParseError::MissingTable);
        }
        let latency = latency.ok_or(ParseError::MissingLatency)?;
        Ok((latency, resources))
    }

    fn scan_pipeline(&self, lines: &[&str]) -> Result<Option<u64>, ParseError> {
        let mut state = PipelineScan::Seeking;
        let mut first_marker: Option<usize> = None;
        let mut interval = None;

        for (idx, line) in lines.iter().enumerate() {
            if *line == self.pipeline_marker {
                if let Some(first) = first_marker {
                    return Err(ParseError::DuplicatePipelineMarker {
                        first,
                        second: idx + 1,
                    });
                }
                first_marker = Some(idx + 1);
                state = PipelineScan::InBlock { opened_at: idx + 1 };
                continue;
            }
            if let PipelineScan::InBlock { .. } = state {
                if let Some(value) = capture(&self.initiation_interval, line, "ii", idx)? {
                    interval = Some(value);
                    state = PipelineScan::Seeking;
                }
            }
        }

        match state {
            PipelineScan::InBlock { opened_at } => {
                Err(ParseError::UnterminatedPipelineBlock { line: opened_at })
            }
            PipelineScan::Seeking => Ok(interval),
        }
    }
}

fn capture(
    pattern: &Regex,
    line: &str,
    field: &'static str,
    idx: usize,
) -> Result<Option<u64>, ParseError> {
    let Some(raw) = pattern.captures(line).and_then(|c| c.get(1)) else {
        return Ok(None);
    };
    raw.as_str()
        .parse()
        .map(Some)
        .map_err(|_| ParseError::InvalidValue {
            field,
            value: raw.as_str().to_string(),
            line: idx + 1,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE_START: &str = "DDDG type: non-perfect loop nest (more than 1 DDDG)";

    fn separator() -> String {
        "=".repeat(71)
    }

    fn extractor() -> ReportExtractor {
        ReportExtractor::new(&ReportGrammar::default()).unwrap()
    }

    #[test]
    fn test_scan_isolation() {
        let text = format!(
            "header\n{}\nTotal cycles: 120\nFFs: 340\n{}\ntrailer\n",
            TABLE_START,
            separator()
        );
        let metrics = extractor().extract(&text).unwrap();

        assert_eq!(metrics.latency_cycles, 120);
        assert_eq!(metrics.resources.len(), 1);
        assert_eq!(metrics.resources.get(&ResourceKind::Ff), Some(&340));
        assert_eq!(metrics.initiation_interval, None);
    }

    #[test]
    fn test_full_report_with_pipeline() {
        let text = [
            "Loop pipelining enabled? yes",
            "Initiation interval (if applicable): 2",
            TABLE_START,
            "Total cycles: 4096",
            "DSPs: 5",
            "FFs: 1200",
            "LUTs: 2400",
            "BRAM18k: 4",
            &separator(),
        ]
        .join("\r\n");
        let metrics = extractor().extract(&text).unwrap();

        assert_eq!(metrics.latency_cycles, 4096);
        assert_eq!(metrics.initiation_interval, Some(2));
        assert_eq!(metrics.resources.get(&ResourceKind::Dsp), Some(&5));
        assert_eq!(metrics.resources.get(&ResourceKind::Lut), Some(&2400));
        assert_eq!(metrics.resources.get(&ResourceKind::Bram), Some(&4));
    }

    #[test]
    fn test_first_match_wins_and_first_table_only() {
        let text = format!(
            "{start}\nTotal cycles: 10\nTotal cycles: 20\nDSPs: 1\nDSPs: 9\n{sep}\n\
             {start}\nTotal cycles: 30\n{sep}\n",
            start = TABLE_START,
            sep = separator()
        );
        let metrics = extractor().extract(&text).unwrap();
        assert_eq!(metrics.latency_cycles, 10);
        assert_eq!(metrics.resources.get(&ResourceKind::Dsp), Some(&1));
    }

    #[test]
    fn test_lines_outside_table_are_ignored() {
        let text = format!(
            "Total cycles: 999\nDSPs: 7\n{}\nTotal cycles: 5\n{}\nLUTs: 3\n",
            TABLE_START,
            separator()
        );
        let metrics = extractor().extract(&text).unwrap();
        assert_eq!(metrics.latency_cycles, 5);
        assert!(metrics.resources.is_empty());
    }

    #[test]
    fn test_missing_separator() {
        let text = format!("{}\nTotal cycles: 120\n", TABLE_START);
        assert_eq!(
            extractor().extract(&text),
            Err(ParseError::UnterminatedTable { line: 1 })
        );
    }

    #[test]
    fn test_missing_table_and_latency() {
        assert_eq!(
            extractor().extract("Total cycles: 1\n"),
            Err(ParseError::MissingTable)
        );

        let text = format!("{}\nFFs: 3\n{}\n", TABLE_START, separator());
        assert_eq!(extractor().extract(&text), Err(ParseError::MissingLatency));
    }

    #[test]
    fn test_duplicate_pipeline_marker() {
        let text = format!(
            "Loop pipelining enabled? yes\nInitiation interval (if applicable): 1\n\
             {}\nTotal cycles: 8\n{}\nLoop pipelining enabled? yes\n",
            TABLE_START,
            separator()
        );
        assert_eq!(
            extractor().extract(&text),
            Err(ParseError::DuplicatePipelineMarker {
                first: 1,
                second: 6
            })
        );
    }

    #[test]
    fn test_pipeline_marker_inside_open_block() {
        let text = format!(
            "Loop pipelining enabled? yes\nTrip count: 16\nLoop pipelining enabled? yes\n\
             Initiation interval (if applicable): 1\n{}\nTotal cycles: 8\n{}\n",
            TABLE_START,
            separator()
        );
        assert_eq!(
            extractor().extract(&text),
            Err(ParseError::DuplicatePipelineMarker {
                first: 1,
                second: 3
            })
        );
    }

    #[test]
    fn test_unterminated_pipeline_block() {
        let text = format!(
            "{}\nTotal cycles: 8\n{}\nLoop pipelining enabled? yes\nno interval here\n",
            TABLE_START,
            separator()
        );
        assert_eq!(
            extractor().extract(&text),
            Err(ParseError::UnterminatedPipelineBlock { line: 4 })
        );
    }

    #[test]
    fn test_custom_grammar() {
        let grammar = ReportGrammar {
            table_start: "BEGIN".to_string(),
            separator: "END".to_string(),
            latency: r"^cycles=(\d+)".to_string(),
            ..ReportGrammar::default()
        };
        let extractor = ReportExtractor::new(&grammar).unwrap();
        let metrics = extractor.extract("BEGIN\ncycles=77\nEND\n").unwrap();
        assert_eq!(metrics.latency_cycles, 77);
    }

    #[test]
    fn test_invalid_pattern() {
        let grammar = ReportGrammar {
            dsp: "(".to_string(),
            ..ReportGrammar::default()
        };
        assert!(ReportExtractor::new(&grammar).is_err());
    }
}
