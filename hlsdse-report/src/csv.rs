//! CSV Output

use crate::record::{MetricsRecord, ResourceKind};

/// Header row of the per-kernel result table
pub const CSV_HEADER: &str = "code,period,latency,ii,exectime,dsp,ff,lut,bram,job-id,elapsed-ns";

/// Placeholder for values the report did not contain
pub const MISSING_VALUE: &str = "---";

/// Generate the result table for one kernel.
///
/// Rows appear in the order given, which callers keep as enumeration order.
pub fn generate_csv_report(records: &[MetricsRecord]) -> String {
    let mut output = String::new();
    output.push_str(CSV_HEADER);
    output.push('\n');

    for record in records {
        let ii = record
            .initiation_interval
            .map(|ii| ii.to_string())
            .unwrap_or_else(|| MISSING_VALUE.to_string());

        output.push_str(&format!(
            "{},{:?},{},{},{:?}",
            escape_csv(&record.code),
            record.period,
            record.latency_cycles,
            ii,
            record.exec_time()
        ));
        for kind in ResourceKind::ALL {
            match record.resource(kind) {
                Some(count) => output.push_str(&format!(",{}", count)),
                None => output.push_str(&format!(",{}", MISSING_VALUE)),
            }
        }
        output.push_str(&format!(",{},{}\n", record.job_id, record.elapsed_ns));
    }

    output
}

/// Escape a string for CSV (handle commas, quotes, newlines)
fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
