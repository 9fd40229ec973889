//! Time-domain simulation of optical power and ion populations.
//!
//! A run discretizes the fiber once ([`DiscretizedFiber`]), then a
//! [`Kernel`] advances the coupled power and population state in batches of
//! time steps until the step limit or steady state is reached.

pub mod batch;
pub mod discretizer;
mod kernel;
mod kernel_impl;
mod optimized_kernel;
pub mod rate_equations;
mod reference_kernel;
mod result;
mod simulation;

#[cfg(test)]
mod kernel_testing;

pub use batch::{
    BatchResult, MonitorConfig, OutputSample, ScheduledInput, StepBatch, SteadyStateCriterion,
    SteadyStateTracker, TerminationConfig, TerminationReason,
};
pub use discretizer::{DiscretizationInfo, DiscretizedFiber, SpatialGrid};
pub use kernel::Kernel;
pub use kernel_impl::KernelImpl;
pub use optimized_kernel::OptimizedKernel;
pub use reference_kernel::ReferenceKernel;
pub use result::SimulationResult;
pub use simulation::{DynamicSimulation, InitialState, RunConfig, SimulationState};

use serde::{Deserialize, Serialize};

/// Kernel implementation selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Backend {
    /// Single-threaded nested loops
    Reference,
    /// Flat buffers with Rayon data parallelism
    #[default]
    Optimized,
}
