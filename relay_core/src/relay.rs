//! Reference relay state and the two-phase update protocol.
//!
//! One `f64` per axis. A finite value is an active reference; NaN is the
//! sentinel "no active reference, leave the output alone".
//!
//! - **Phase 1** ([`ReferenceRelay::pull`]): take the newest record from the
//!   handoff buffer (or, in chained mode, the upstream reference handles),
//!   validate it, and copy it into the relay state.
//! - **Phase 2** ([`ReferenceRelay::write`]): write every finite entry to its
//!   output handle; sentinel entries are skipped so the handle keeps its
//!   previous value.
//!
//! Between the phases a chaining layer may overwrite entries through
//! [`ReferenceRelay::references_mut`]; phase 2 reads whatever is there.
//!
//! Both phases run on the real-time path: no locks, no allocation.

use crate::handoff::{HandoffConsumer, HandoffStats};
use relay_common::consts::MAX_AXES;
use relay_common::relay::component::CycleError;
use relay_common::relay::handles::InterfaceHandle;
use relay_common::relay::types::RecordValues;

/// Outcome of a successful phase 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayUpdate {
    /// Nothing new; relay state unchanged (latched).
    NoNewRecord,
    /// A valid record was copied into the relay state.
    Applied,
    /// A sentinel record reset the relay state to "no command".
    Reset,
}

/// Per-axis reference values fed from a handoff consumer.
#[derive(Debug)]
pub struct ReferenceRelay {
    references: RecordValues,
    consumer: HandoffConsumer,
    chained_inputs: Vec<InterfaceHandle>,
    chained: bool,
}

impl ReferenceRelay {
    /// Relay of `axis_count` sentinel entries reading from `consumer`.
    ///
    /// `axis_count` is clamped to the record capacity; configuration
    /// validation rejects larger axis lists before this point.
    pub fn new(consumer: HandoffConsumer, axis_count: usize) -> Self {
        let mut references = RecordValues::new();
        for _ in 0..axis_count.min(MAX_AXES) {
            let _ = references.push(f64::NAN);
        }
        Self {
            references,
            consumer,
            chained_inputs: Vec::new(),
            chained: false,
        }
    }

    /// Number of axes.
    #[inline]
    pub fn axis_count(&self) -> usize {
        self.references.len()
    }

    /// Current relay state.
    #[inline]
    pub fn references(&self) -> &[f64] {
        &self.references
    }

    /// Mutable relay state, for a chaining layer writing between phases.
    #[inline]
    pub fn references_mut(&mut self) -> &mut [f64] {
        &mut self.references
    }

    /// Reset every entry to the sentinel, including the upstream handles
    /// read in chained mode.
    pub fn reset(&mut self) {
        self.references.iter_mut().for_each(|r| *r = f64::NAN);
        self.chained_inputs.iter().for_each(|h| h.set(f64::NAN));
    }

    /// `true` if no entry holds an active reference.
    pub fn is_sentinel(&self) -> bool {
        self.references.iter().all(|r| r.is_nan())
    }

    /// Handles an upstream stage writes when this relay runs chained.
    ///
    /// Must be one per axis, in axis order.
    pub fn set_chained_inputs(&mut self, inputs: Vec<InterfaceHandle>) {
        self.chained_inputs = inputs;
    }

    /// Switch chained mode. Refused (`false`) unless one chained input per
    /// axis has been provided.
    pub fn set_chained(&mut self, chained: bool) -> bool {
        if chained && self.chained_inputs.len() != self.references.len() {
            return false;
        }
        self.chained = chained;
        true
    }

    /// `true` if phase 1 reads upstream reference handles.
    #[inline]
    pub fn is_chained(&self) -> bool {
        self.chained
    }

    /// Handoff counters of the attached buffer.
    pub fn handoff_stats(&self) -> HandoffStats {
        self.consumer.stats()
    }

    /// Phase 1: bring the relay state up to date.
    ///
    /// # Errors
    /// - `CycleError::ShapeMismatch` if the record length differs from the
    ///   axis count, sentinel records included.
    /// - `CycleError::NonFiniteValue` if a non-sentinel record carries NaN or
    ///   infinity.
    ///
    /// On error the relay state is unchanged.
    pub fn pull(&mut self) -> Result<RelayUpdate, CycleError> {
        if self.chained {
            return pull_chained(&mut self.references, &self.chained_inputs);
        }
        match self.consumer.try_consume() {
            Some(record) => apply_values(&mut self.references, record.as_slice()),
            None => Ok(RelayUpdate::NoNewRecord),
        }
    }

    /// Validate `values` and copy them into the relay state.
    ///
    /// Same rules as a consumed record in [`pull`](Self::pull).
    pub fn apply(&mut self, values: &[f64]) -> Result<RelayUpdate, CycleError> {
        apply_values(&mut self.references, values)
    }

    /// Phase 2: write finite entries to `outputs`. Returns the count written.
    ///
    /// Never writes NaN. Extra outputs or extra entries are ignored.
    #[inline]
    pub fn write(&self, outputs: &[InterfaceHandle]) -> usize {
        let mut written = 0;
        for (value, output) in self.references.iter().zip(outputs) {
            if value.is_finite() {
                output.set(*value);
                written += 1;
            }
        }
        written
    }
}

fn apply_values(references: &mut RecordValues, values: &[f64]) -> Result<RelayUpdate, CycleError> {
    if values.len() != references.len() {
        return Err(CycleError::ShapeMismatch {
            expected: references.len(),
            received: values.len(),
        });
    }

    if !values.is_empty() && values.iter().all(|v| v.is_nan()) {
        references.iter_mut().for_each(|r| *r = f64::NAN);
        return Ok(RelayUpdate::Reset);
    }

    if let Some(axis) = values.iter().position(|v| !v.is_finite()) {
        return Err(CycleError::NonFiniteValue { axis });
    }

    references.copy_from_slice(values);
    Ok(RelayUpdate::Applied)
}

/// Upstream stages write per-axis references; NaN there is a per-axis
/// sentinel, infinity is rejected.
fn pull_chained(
    references: &mut RecordValues,
    inputs: &[InterfaceHandle],
) -> Result<RelayUpdate, CycleError> {
    if let Some(axis) = inputs.iter().position(|h| h.get().is_infinite()) {
        return Err(CycleError::NonFiniteValue { axis });
    }
    for (reference, input) in references.iter_mut().zip(inputs) {
        *reference = input.get();
    }
    Ok(RelayUpdate::Applied)
}
