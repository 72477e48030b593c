//! Result Collection
//!
//! Replays a kernel's enumeration and reads back what each job left in its
//! point directory: the report and the completion artifact.

use hlsdse_core::{AcceptedPoints, KernelDescriptor};
use hlsdse_report::{ArtifactError, CompletionRecord, MetricsRecord, ParseError, ReportExtractor};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure while reading back a finished exploration
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("cannot read report of {code} at {path}: {source}")]
    Report {
        code: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("report of {code} is malformed: {source}")]
    Parse {
        code: String,
        #[source]
        source: ParseError,
    },

    #[error("completion artifact of {code}: {source}")]
    Artifact {
        code: String,
        #[source]
        source: ArtifactError,
    },
}

/// Read every schedulable point's results, in enumeration order.
///
/// Points are parsed in parallel; the first failure aborts the pass.
pub fn collect_records(
    descriptor: &KernelDescriptor,
    kernel_dir: &Path,
    report_file: &str,
    extractor: &ReportExtractor,
) -> Result<Vec<MetricsRecord>, CollectError> {
    let points: Vec<_> = AcceptedPoints::new(descriptor).collect();
    tracing::debug!(points = points.len(), "Collecting results");

    points
        .par_iter()
        .map(|point| -> Result<MetricsRecord, CollectError> {
            let dir = kernel_dir.join(&point.code);
            let path = dir.join(report_file);
            let text = std::fs::read_to_string(&path).map_err(|source| CollectError::Report {
                code: point.code.clone(),
                path,
                source,
            })?;
            let metrics = extractor
                .extract(&text)
                .map_err(|source| CollectError::Parse {
                    code: point.code.clone(),
                    source,
                })?;
            let completion =
                CompletionRecord::read_from(&dir).map_err(|source| CollectError::Artifact {
                    code: point.code.clone(),
                    source,
                })?;
            Ok(MetricsRecord::new(
                point.code.clone(),
                point.period(),
                metrics,
                completion,
            ))
        })
        .collect()
}
