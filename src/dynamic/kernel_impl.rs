//! Kernel implementation trait.
//!
//! This module defines the trait that every time-stepping kernel must
//! satisfy. It is used internally for compile-time dispatch via the
//! [`Kernel`](crate::dynamic::Kernel) enum.

use crate::arrays::NodeField;
use crate::dynamic::batch::{BatchResult, StepBatch};
use crate::dynamic::discretizer::DiscretizedFiber;
use crate::{Error, Result};

/// Core trait that all kernel implementations must satisfy.
///
/// A kernel owns the dynamic state of one run: the power of every channel and
/// the excited fraction of every doping ring at every node. It starts from the
/// dark, unexcited fiber at step 0.
///
/// # Implementation Note
/// External code should use the `Kernel` enum, which dispatches to the
/// implementations without trait objects.
pub trait KernelImpl: Sized + Send {
    /// Create a kernel for a discretized fiber.
    fn new(model: &DiscretizedFiber) -> Result<Self>;

    /// Execute a batch of time steps.
    ///
    /// Stops early when the batch's steady-state criterion is met. Returns
    /// `Error::NumericalDivergence` as soon as any state value becomes
    /// non-finite.
    fn run_batch(&mut self, batch: StepBatch) -> Result<BatchResult>;

    /// Number of steps executed since creation or the last reset.
    fn current_step(&self) -> u64;

    /// Read access to (powers, populations).
    ///
    /// Powers are channels × nodes (W), populations rings × nodes (fraction).
    fn read_state(&self) -> (&NodeField, &NodeField);

    /// Write access to (powers, populations).
    fn write_state(&mut self) -> (&mut NodeField, &mut NodeField);

    /// Reset to the initial dark state at step 0.
    fn reset(&mut self);
}

/// Fail with `Error::NumericalDivergence` if any state value is not finite.
pub(crate) fn check_finite(
    model: &DiscretizedFiber,
    step: u64,
    powers: &NodeField,
    populations: &NodeField,
) -> Result<()> {
    if let Some((channel, node)) = powers.first_non_finite() {
        return Err(Error::NumericalDivergence {
            step,
            detail: format!(
                "power of channel '{}' is {} at z = {:.4e} m",
                model.channels()[channel].label,
                powers.get(channel, node),
                model.grid().z()[node]
            ),
        });
    }
    if let Some((ring, node)) = populations.first_non_finite() {
        return Err(Error::NumericalDivergence {
            step,
            detail: format!(
                "population of ring {ring} is {} at z = {:.4e} m",
                populations.get(ring, node),
                model.grid().z()[node]
            ),
        });
    }
    Ok(())
}

/// Reject a batch whose input list does not match the channel list.
pub(crate) fn check_inputs(model: &DiscretizedFiber, batch: &StepBatch) -> Result<()> {
    if batch.inputs.len() != model.num_channels() {
        return Err(Error::Config(format!(
            "Batch has {} input schedules for {} channels",
            batch.inputs.len(),
            model.num_channels()
        )));
    }
    Ok(())
}
