//! Exploration Planner
//!
//! Counts the design space of each kernel before anything is launched.
//! The counts drive progress percentages and the dispatcher's final
//! cross-check; `list` prints them as a dry run.

use hlsdse_core::{AcceptedPoints, Census, KernelDescriptor, census};
use std::fmt::Write;

/// Planned work for one kernel
#[derive(Debug, Clone)]
pub struct KernelPlan {
    /// Kernel name
    pub kernel: String,
    /// Counting pass result
    pub census: Census,
    /// Schedulable codes in enumeration order (only when requested)
    pub codes: Vec<String>,
}

/// Build the plan of one kernel
///
/// With `with_codes`, a second pass records every schedulable code.
pub fn build_plan(kernel: &str, descriptor: &KernelDescriptor, with_codes: bool) -> KernelPlan {
    let counts = census(descriptor);
    let codes = if with_codes {
        AcceptedPoints::new(descriptor).map(|p| p.code).collect()
    } else {
        Vec::new()
    };

    KernelPlan {
        kernel: kernel.to_string(),
        census: counts,
        codes,
    }
}

/// Human-readable listing of a plan
pub fn format_plan(plan: &KernelPlan) -> String {
    let mut output = String::new();
    let _ = writeln!(
        output,
        "{}: {} points, {} bypassed, {} schedulable",
        plan.kernel,
        plan.census.total,
        plan.census.bypassed,
        plan.census.schedulable()
    );
    for code in &plan.codes {
        let _ = writeln!(output, "  {}", code);
    }
    output
}
