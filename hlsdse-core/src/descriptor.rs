//! Kernel Descriptor
//!
//! The validated, immutable knob ranges of one kernel. Loop nests are already
//! flattened into a single ordered sequence of levels with an explicit depth,
//! and off-chip arrays are already excluded from partitioning.

use crate::PERIOD_FREQUENCY_SCALE;
use crate::error::DescriptorError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Unit the operating points of a kernel are declared in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingUnit {
    /// Clock period in nanoseconds
    Period,
    /// Clock frequency in MHz
    Frequency,
}

impl OperatingUnit {
    /// Prefix tag used in canonical codes
    pub fn tag(self) -> char {
        match self {
            OperatingUnit::Period => 'p',
            OperatingUnit::Frequency => 'f',
        }
    }

    /// Convert a value declared in this unit to a clock period
    pub fn to_period(self, value: f64) -> f64 {
        match self {
            OperatingUnit::Period => value,
            OperatingUnit::Frequency => PERIOD_FREQUENCY_SCALE / value,
        }
    }

    /// Convert a value declared in this unit to a clock frequency
    pub fn to_frequency(self, value: f64) -> f64 {
        match self {
            OperatingUnit::Period => PERIOD_FREQUENCY_SCALE / value,
            OperatingUnit::Frequency => value,
        }
    }
}

/// Ordered operating points, all in the same unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatingPoints {
    /// Unit the values are declared in
    pub unit: OperatingUnit,
    /// Values in enumeration order
    pub values: Vec<f64>,
}

impl OperatingPoints {
    /// Periods in ns
    pub fn periods(values: Vec<f64>) -> Self {
        Self {
            unit: OperatingUnit::Period,
            values,
        }
    }

    /// Frequencies in MHz
    pub fn frequencies(values: Vec<f64>) -> Self {
        Self {
            unit: OperatingUnit::Frequency,
            values,
        }
    }

    /// Code token for one value (tag plus one decimal)
    pub fn token(&self, value: f64) -> String {
        format!("{}{:.1}", self.unit.tag(), value)
    }

    /// Number of operating points
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether there are no operating points
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// One level of a loop nest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopLevel {
    /// Index of the top-level nest this level belongs to
    pub level_id: usize,
    /// 1-based nesting position (1 = outermost)
    pub depth: u32,
    /// Full trip count, when known
    pub bound: Option<u64>,
    /// Source line of the loop header, when known
    pub line: Option<u32>,
    /// Legal unroll factors in enumeration order
    pub unrolling: Vec<u32>,
    /// Whether this level may be pipelined
    pub pipelining: bool,
}

impl LoopLevel {
    /// A level with no knobs
    pub fn new(level_id: usize, depth: u32) -> Self {
        Self {
            level_id,
            depth,
            bound: None,
            line: None,
            unrolling: Vec::new(),
            pipelining: false,
        }
    }

    /// Set the legal unroll factors
    pub fn with_unrolling(mut self, factors: impl Into<Vec<u32>>) -> Self {
        self.unrolling = factors.into();
        self
    }

    /// Mark the level as pipelining eligible
    pub fn with_pipelining(mut self, pipelining: bool) -> Self {
        self.pipelining = pipelining;
        self
    }

    /// Set the full trip count
    pub fn with_bound(mut self, bound: u64) -> Self {
        self.bound = Some(bound);
        self
    }

    fn label(&self) -> String {
        format!("loop {}.{}", self.level_id, self.depth)
    }
}

/// Partitioning options of one on-chip array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayOptions {
    /// Array name as it appears in the kernel source
    pub name: String,
    /// Block partitioning factors
    pub block: Vec<u32>,
    /// Cyclic partitioning factors
    pub cyclic: Vec<u32>,
    /// Whether complete partitioning is allowed
    pub complete: bool,
}

impl ArrayOptions {
    /// An array with no partitioning options
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            block: Vec::new(),
            cyclic: Vec::new(),
            complete: false,
        }
    }

    /// Set the block factors
    pub fn with_block(mut self, factors: impl Into<Vec<u32>>) -> Self {
        self.block = factors.into();
        self
    }

    /// Set the cyclic factors
    pub fn with_cyclic(mut self, factors: impl Into<Vec<u32>>) -> Self {
        self.cyclic = factors.into();
        self
    }

    /// Allow complete partitioning
    pub fn with_complete(mut self, complete: bool) -> Self {
        self.complete = complete;
        self
    }

    /// Number of non-`none` partitioning choices
    pub fn option_count(&self) -> usize {
        self.block.len() + self.cyclic.len() + usize::from(self.complete)
    }
}

/// Validated knob ranges of one kernel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KernelDescriptor {
    loops: Vec<LoopLevel>,
    arrays: Vec<ArrayOptions>,
    operating_points: OperatingPoints,
}

impl KernelDescriptor {
    /// Build a descriptor, rejecting anything the enumerator cannot walk
    pub fn new(
        loops: Vec<LoopLevel>,
        arrays: Vec<ArrayOptions>,
        operating_points: OperatingPoints,
    ) -> Result<Self, DescriptorError> {
        let descriptor = Self {
            loops,
            arrays,
            operating_points,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Loop levels in enumeration order
    pub fn loops(&self) -> &[LoopLevel] {
        &self.loops
    }

    /// On-chip arrays in enumeration order
    pub fn arrays(&self) -> &[ArrayOptions] {
        &self.arrays
    }

    /// Operating points in enumeration order
    pub fn operating_points(&self) -> &OperatingPoints {
        &self.operating_points
    }

    /// Number of design points a full enumeration visits, bypassed ones included
    pub fn space_size(&self) -> u128 {
        let unroll: u128 = self
            .loops
            .iter()
            .map(|l| l.unrolling.len() as u128 + 1)
            .product();
        let pipelining: u128 = self
            .loops
            .iter()
            .map(|l| if l.pipelining { 2 } else { 1 })
            .product();
        let partitioning: u128 = self
            .arrays
            .iter()
            .map(|a| a.option_count() as u128 + 1)
            .product();
        unroll * pipelining * partitioning * self.operating_points.len() as u128
    }

    fn validate(&self) -> Result<(), DescriptorError> {
        let points = &self.operating_points;
        if points.is_empty() {
            return Err(DescriptorError::EmptyOperatingPoints);
        }
        let mut tokens: Vec<(String, f64)> = Vec::with_capacity(points.len());
        for &value in &points.values {
            if !value.is_finite() || value <= 0.0 {
                return Err(DescriptorError::InvalidOperatingPoint { value });
            }
            let token = points.token(value);
            if let Some((_, first)) = tokens.iter().find(|(t, _)| *t == token) {
                return Err(DescriptorError::AmbiguousOperatingPoint {
                    first: *first,
                    second: value,
                });
            }
            tokens.push((token, value));
        }

        let mut seen_loops = HashSet::new();
        for level in &self.loops {
            if !seen_loops.insert((level.level_id, level.depth)) {
                return Err(DescriptorError::DuplicateLoop {
                    level_id: level.level_id,
                    depth: level.depth,
                });
            }
            check_factors(&level.label(), "unroll", &level.unrolling)?;
        }

        let mut seen_arrays = HashSet::new();
        for array in &self.arrays {
            if !seen_arrays.insert(array.name.as_str()) {
                return Err(DescriptorError::DuplicateArray(array.name.clone()));
            }
            let target = format!("array \"{}\"", array.name);
            check_factors(&target, "block", &array.block)?;
            check_factors(&target, "cyclic", &array.cyclic)?;
        }

        Ok(())
    }
}

// Factors are located by value while enumerating, so zeros and repeats would
// alias other states.
fn check_factors(target: &str, kind: &'static str, factors: &[u32]) -> Result<(), DescriptorError> {
    let mut seen = HashSet::new();
    for &factor in factors {
        if factor == 0 {
            return Err(DescriptorError::ZeroFactor {
                target: target.to_string(),
                kind,
            });
        }
        if !seen.insert(factor) {
            return Err(DescriptorError::DuplicateFactor {
                target: target.to_string(),
                kind,
                factor,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_conversion() {
        assert_eq!(OperatingUnit::Period.to_frequency(10.0), 100.0);
        assert_eq!(OperatingUnit::Frequency.to_period(200.0), 5.0);
        assert_eq!(OperatingUnit::Period.to_period(10.0), 10.0);
    }

    #[test]
    fn test_space_size() {
        let descriptor = KernelDescriptor::new(
            vec![
                LoopLevel::new(0, 1).with_unrolling([2, 4]).with_pipelining(true),
                LoopLevel::new(0, 2).with_pipelining(true),
            ],
            vec![ArrayOptions::new("A").with_block([2]).with_complete(true)],
            OperatingPoints::periods(vec![10.0, 5.0]),
        )
        .unwrap();

        // 3 unroll states, 2 * 2 pipelining states, 3 partition states, 2 periods
        assert_eq!(descriptor.space_size(), 3 * 4 * 3 * 2);
    }

    #[test]
    fn test_rejects_empty_operating_points() {
        let err = KernelDescriptor::new(vec![], vec![], OperatingPoints::periods(vec![]));
        assert!(matches!(err, Err(DescriptorError::EmptyOperatingPoints)));
    }

    #[test]
    fn test_rejects_ambiguous_operating_points() {
        let err = KernelDescriptor::new(vec![], vec![], OperatingPoints::periods(vec![10.01, 10.04]));
        assert!(matches!(
            err,
            Err(DescriptorError::AmbiguousOperatingPoint { .. })
        ));
    }

    #[test]
    fn test_rejects_bad_factors() {
        let zero = KernelDescriptor::new(
            vec![LoopLevel::new(0, 1).with_unrolling([0, 2])],
            vec![],
            OperatingPoints::periods(vec![10.0]),
        );
        assert!(matches!(zero, Err(DescriptorError::ZeroFactor { .. })));

        let duplicate = KernelDescriptor::new(
            vec![],
            vec![ArrayOptions::new("A").with_cyclic([4, 4])],
            OperatingPoints::periods(vec![10.0]),
        );
        assert!(matches!(
            duplicate,
            Err(DescriptorError::DuplicateFactor { factor: 4, .. })
        ));
    }

    #[test]
    fn test_rejects_duplicate_levels() {
        let err = KernelDescriptor::new(
            vec![LoopLevel::new(0, 1), LoopLevel::new(0, 1)],
            vec![],
            OperatingPoints::frequencies(vec![100.0]),
        );
        assert!(matches!(
            err,
            Err(DescriptorError::DuplicateLoop {
                level_id: 0,
                depth: 1
            })
        ));
    }
}
