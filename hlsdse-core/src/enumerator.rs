//! Design Point Enumerator
//!
//! Walks every knob combination of a `KernelDescriptor` as a mixed-radix
//! counter. Digits, fastest-varying first:
//!
//! ```text
//! unroll(loop 0) .. unroll(loop n) | pipeline(loop 0) .. pipeline(loop n)
//!   | partition(array 0) .. partition(array m) | operating point
//! ```
//!
//! Each knob digit has one state per legal option plus a `none` state. The
//! counter starts at all-`none` with the first operating point (the anchor)
//! and the enumeration ends when an increment carries all the way back to it.

use crate::descriptor::{ArrayOptions, KernelDescriptor, LoopLevel};
use crate::error::EnumerationError;
use crate::point::{ArraySetting, DesignPoint, LoopSetting, Partitioning};

/// Mutable enumeration state over one kernel's design space
///
/// The same descriptor always yields the same sequence, so a counting pass and
/// a scheduling pass can each use their own fresh enumerator.
#[derive(Debug, Clone)]
pub struct DesignPointEnumerator<'a> {
    descriptor: &'a KernelDescriptor,
    loops: Vec<LoopKnob>,
    arrays: Vec<ArrayKnob>,
    operating_index: usize,
    anchor: Option<String>,
    exhausted: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct LoopKnob {
    /// Index into the level's unroll factors
    unroll: Option<usize>,
    pipelined: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum ArrayKnob {
    #[default]
    None,
    Block(usize),
    Cyclic(usize),
    Complete,
}

impl LoopKnob {
    /// Step the unroll digit; returns true on carry
    fn step_unroll(&mut self, level: &LoopLevel) -> bool {
        match self.unroll {
            None if level.unrolling.is_empty() => true,
            None => {
                self.unroll = Some(0);
                false
            }
            Some(i) if i + 1 < level.unrolling.len() => {
                self.unroll = Some(i + 1);
                false
            }
            Some(_) => {
                self.unroll = None;
                true
            }
        }
    }

    /// Step the pipelining digit; returns true on carry
    fn step_pipelining(&mut self, level: &LoopLevel) -> bool {
        if self.pipelined {
            self.pipelined = false;
            true
        } else if level.pipelining {
            self.pipelined = true;
            false
        } else {
            true
        }
    }

    fn unroll_factor(&self, level: &LoopLevel) -> Option<u32> {
        self.unroll.map(|i| level.unrolling[i])
    }

    fn is_transformed(&self) -> bool {
        self.pipelined || self.unroll.is_some()
    }
}

impl ArrayKnob {
    /// Step the partitioning digit; returns true on carry
    fn step(&mut self, options: &ArrayOptions) -> bool {
        let next = match *self {
            ArrayKnob::None => Self::first_block(options),
            ArrayKnob::Block(i) if i + 1 < options.block.len() => Some(ArrayKnob::Block(i + 1)),
            ArrayKnob::Block(_) => Self::first_cyclic(options),
            ArrayKnob::Cyclic(i) if i + 1 < options.cyclic.len() => Some(ArrayKnob::Cyclic(i + 1)),
            ArrayKnob::Cyclic(_) => Self::complete(options),
            ArrayKnob::Complete => None,
        };
        match next {
            Some(knob) => {
                *self = knob;
                false
            }
            None => {
                *self = ArrayKnob::None;
                true
            }
        }
    }

    fn first_block(options: &ArrayOptions) -> Option<ArrayKnob> {
        if options.block.is_empty() {
            Self::first_cyclic(options)
        } else {
            Some(ArrayKnob::Block(0))
        }
    }

    fn first_cyclic(options: &ArrayOptions) -> Option<ArrayKnob> {
        if options.cyclic.is_empty() {
            Self::complete(options)
        } else {
            Some(ArrayKnob::Cyclic(0))
        }
    }

    fn complete(options: &ArrayOptions) -> Option<ArrayKnob> {
        options.complete.then_some(ArrayKnob::Complete)
    }

    fn resolve(&self, options: &ArrayOptions) -> Partitioning {
        match *self {
            ArrayKnob::None => Partitioning::None,
            ArrayKnob::Block(i) => Partitioning::Block(options.block[i]),
            ArrayKnob::Cyclic(i) => Partitioning::Cyclic(options.cyclic[i]),
            ArrayKnob::Complete => Partitioning::Complete,
        }
    }
}

impl<'a> DesignPointEnumerator<'a> {
    /// Fresh enumerator positioned before the first point
    pub fn new(descriptor: &'a KernelDescriptor) -> Self {
        Self {
            descriptor,
            loops: vec![LoopKnob::default(); descriptor.loops().len()],
            arrays: vec![ArrayKnob::default(); descriptor.arrays().len()],
            operating_index: 0,
            anchor: None,
            exhausted: false,
        }
    }

    /// Descriptor being enumerated
    pub fn descriptor(&self) -> &'a KernelDescriptor {
        self.descriptor
    }

    /// Move to the next design point.
    ///
    /// The first call always succeeds and lands on the all-default point.
    /// Returns `false` once the counter wraps back to that point; the state is
    /// then left at the anchor and must not be consumed. Further calls keep
    /// returning `false`.
    pub fn advance(&mut self) -> bool {
        if self.exhausted {
            return false;
        }
        if self.anchor.is_none() {
            self.anchor = Some(self.render_code());
            return true;
        }

        self.increment();
        let code = self.render_code();
        if self.anchor.as_deref() == Some(code.as_str()) {
            self.exhausted = true;
            return false;
        }
        true
    }

    /// Whether `advance()` has reported the end of the enumeration
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Canonical code of the current point
    pub fn code(&self) -> Result<String, EnumerationError> {
        self.ensure_active()?;
        Ok(self.render_code())
    }

    /// Whether the current point is redundant and must not be scheduled.
    ///
    /// A point is redundant when a pipelined loop is also fully unrolled, or
    /// when a pipelined or unrolled loop has a deeper loop of the same nest
    /// that is itself pipelined or unrolled. Shallower loops are not checked.
    pub fn bypass(&self) -> Result<bool, EnumerationError> {
        self.ensure_active()?;
        let levels = self.descriptor.loops();

        for (knob, level) in self.loops.iter().zip(levels) {
            if knob.pipelined {
                if let (Some(factor), Some(bound)) = (knob.unroll_factor(level), level.bound) {
                    if u64::from(factor) == bound {
                        return Ok(true);
                    }
                }
            }

            if knob.is_transformed() {
                let nested_transformed = self.loops.iter().zip(levels).any(|(inner, inner_level)| {
                    inner_level.level_id == level.level_id
                        && inner_level.depth > level.depth
                        && inner.is_transformed()
                });
                if nested_transformed {
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }

    /// Clock period of the current point in ns
    pub fn period(&self) -> Result<f64, EnumerationError> {
        self.ensure_active()?;
        let points = self.descriptor.operating_points();
        Ok(points.unit.to_period(points.values[self.operating_index]))
    }

    /// Clock frequency of the current point in MHz
    pub fn frequency(&self) -> Result<f64, EnumerationError> {
        self.ensure_active()?;
        let points = self.descriptor.operating_points();
        Ok(points.unit.to_frequency(points.values[self.operating_index]))
    }

    /// Owned snapshot of the current point
    pub fn point(&self) -> Result<DesignPoint, EnumerationError> {
        self.ensure_active()?;
        let points = self.descriptor.operating_points();

        let loops = self
            .loops
            .iter()
            .zip(self.descriptor.loops())
            .map(|(knob, level)| LoopSetting {
                level_id: level.level_id,
                depth: level.depth,
                line: level.line,
                unroll: knob.unroll_factor(level),
                pipelined: knob.pipelined,
            })
            .collect();

        let arrays = self
            .arrays
            .iter()
            .zip(self.descriptor.arrays())
            .map(|(knob, options)| ArraySetting {
                name: options.name.clone(),
                partitioning: knob.resolve(options),
            })
            .collect();

        Ok(DesignPoint {
            code: self.render_code(),
            unit: points.unit,
            operating_point: points.values[self.operating_index],
            loops,
            arrays,
        })
    }

    fn ensure_active(&self) -> Result<(), EnumerationError> {
        if self.anchor.is_none() {
            Err(EnumerationError::NotStarted)
        } else if self.exhausted {
            Err(EnumerationError::Exhausted)
        } else {
            Ok(())
        }
    }

    fn increment(&mut self) {
        let levels = self.descriptor.loops();

        for (knob, level) in self.loops.iter_mut().zip(levels) {
            if !knob.step_unroll(level) {
                return;
            }
        }

        for (knob, level) in self.loops.iter_mut().zip(levels) {
            if !knob.step_pipelining(level) {
                return;
            }
        }

        for (knob, options) in self.arrays.iter_mut().zip(self.descriptor.arrays()) {
            if !knob.step(options) {
                return;
            }
        }

        // Terminal digit: wrapping here with every lower digit wrapped is the
        // full cycle detected by `advance()`.
        self.operating_index = (self.operating_index + 1) % self.descriptor.operating_points().len();
    }

    fn render_code(&self) -> String {
        let points = self.descriptor.operating_points();
        let mut code = points.token(points.values[self.operating_index]);

        for (knob, level) in self.loops.iter().zip(self.descriptor.loops()) {
            code.push_str(&format!(
                "_l{}.{}.{}.{}",
                level.level_id,
                level.depth,
                u8::from(knob.pipelined),
                knob.unroll_factor(level).unwrap_or(0)
            ));
        }

        for (knob, options) in self.arrays.iter().zip(self.descriptor.arrays()) {
            let partitioning = knob.resolve(options);
            code.push_str(&format!(
                "_a{}.{}.{}",
                options.name,
                partitioning.kind(),
                partitioning.factor()
            ));
        }

        code
    }
}
