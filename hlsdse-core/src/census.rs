//! Counting and filtered iteration over a kernel's design space.

use crate::descriptor::KernelDescriptor;
use crate::enumerator::DesignPointEnumerator;
use crate::point::DesignPoint;
use serde::Serialize;

/// Totals of one full enumeration pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Census {
    /// Points visited, bypassed ones included
    pub total: u64,
    /// Points rejected by the bypass rule
    pub bypassed: u64,
}

impl Census {
    /// Points that will actually be dispatched
    pub fn schedulable(&self) -> u64 {
        self.total - self.bypassed
    }
}

/// Walk the whole space once and count it
pub fn census(descriptor: &KernelDescriptor) -> Census {
    let mut enumerator = DesignPointEnumerator::new(descriptor);
    let mut counts = Census::default();
    while enumerator.advance() {
        counts.total += 1;
        if enumerator.bypass().unwrap_or(false) {
            counts.bypassed += 1;
        }
    }
    tracing::debug!(
        total = counts.total,
        bypassed = counts.bypassed,
        "Counted design space"
    );
    counts
}

/// Iterator over the non-bypassed points of a kernel, in enumeration order
pub struct AcceptedPoints<'a> {
    enumerator: DesignPointEnumerator<'a>,
}

impl<'a> AcceptedPoints<'a> {
    /// Start from a fresh enumerator
    pub fn new(descriptor: &'a KernelDescriptor) -> Self {
        Self {
            enumerator: DesignPointEnumerator::new(descriptor),
        }
    }
}

impl Iterator for AcceptedPoints<'_> {
    type Item = DesignPoint;

    fn next(&mut self) -> Option<DesignPoint> {
        while self.enumerator.advance() {
            if self.enumerator.bypass().ok()? {
                continue;
            }
            return self.enumerator.point().ok();
        }
        None
    }
}
