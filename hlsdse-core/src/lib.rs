#![warn(missing_docs)]
//! hlsdse Core - Design Space Model
//!
//! This crate holds everything that describes and walks a kernel's design space:
//! - `KernelConfig`: the JSON kernel configuration as written by users
//! - `KernelDescriptor`: the validated, flattened knob ranges of one kernel
//! - `DesignPointEnumerator`: mixed-radix odometer over every knob combination
//! - `census`: one full counting pass over the enumeration
//!
//! Nothing in here touches the filesystem or spawns processes.

mod census;
mod config;
mod descriptor;
mod enumerator;
mod error;
mod point;

pub use census::{AcceptedPoints, Census, census};
pub use config::{ArrayConfig, ArrayTable, KernelConfig, LoopConfig, ToolSettings};
pub use descriptor::{ArrayOptions, KernelDescriptor, LoopLevel, OperatingPoints, OperatingUnit};
pub use enumerator::DesignPointEnumerator;
pub use error::{DescriptorError, EnumerationError};
pub use point::{ArraySetting, DesignPoint, LoopSetting, Partitioning};

/// Conversion constant between clock period (ns) and frequency (MHz)
pub const PERIOD_FREQUENCY_SCALE: f64 = 1000.0;
