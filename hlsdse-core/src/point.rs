//! Design Point Snapshots
//!
//! Owned copies of an enumerator's state, handed to launchers and writers so
//! the enumerator itself never leaves its lock.

use crate::descriptor::OperatingUnit;
use serde::Serialize;

/// Partitioning applied to one array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "factor", rename_all = "lowercase")]
pub enum Partitioning {
    /// Not partitioned
    None,
    /// Block partitioning with the given factor
    Block(u32),
    /// Cyclic partitioning with the given factor
    Cyclic(u32),
    /// Complete partitioning
    Complete,
}

impl Partitioning {
    /// Kind name as used in canonical codes
    pub fn kind(&self) -> &'static str {
        match self {
            Partitioning::None => "none",
            Partitioning::Block(_) => "block",
            Partitioning::Cyclic(_) => "cyclic",
            Partitioning::Complete => "complete",
        }
    }

    /// Factor as used in canonical codes (0 when meaningless)
    pub fn factor(&self) -> u32 {
        match self {
            Partitioning::Block(f) | Partitioning::Cyclic(f) => *f,
            Partitioning::None | Partitioning::Complete => 0,
        }
    }
}

/// Knob values of one loop level
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoopSetting {
    /// Top-level nest index
    pub level_id: usize,
    /// 1-based nesting position
    pub depth: u32,
    /// Source line of the loop header
    pub line: Option<u32>,
    /// Unroll factor, if unrolled
    pub unroll: Option<u32>,
    /// Whether the loop is pipelined
    pub pipelined: bool,
}

/// Partitioning of one on-chip array
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArraySetting {
    /// Array name
    pub name: String,
    /// Applied partitioning
    pub partitioning: Partitioning,
}

/// One fully resolved design point
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DesignPoint {
    /// Canonical code (identity of the point)
    pub code: String,
    /// Unit of `operating_point`
    pub unit: OperatingUnit,
    /// Operating point in its declared unit
    pub operating_point: f64,
    /// Loop knobs in descriptor order
    pub loops: Vec<LoopSetting>,
    /// Array knobs in descriptor order
    pub arrays: Vec<ArraySetting>,
}

impl DesignPoint {
    /// Clock period in ns
    pub fn period(&self) -> f64 {
        self.unit.to_period(self.operating_point)
    }

    /// Clock frequency in MHz
    pub fn frequency(&self) -> f64 {
        self.unit.to_frequency(self.operating_point)
    }
}
