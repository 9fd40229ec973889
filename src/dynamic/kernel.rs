//! Unified time-stepping kernel with enum-based dispatch.
//!
//! This module provides the `Kernel` enum that dispatches to the reference or
//! optimized implementation through a match-generating macro instead of
//! trait objects.

use crate::arrays::NodeField;
use crate::dynamic::{
    Backend, BatchResult, DiscretizedFiber, KernelImpl, OptimizedKernel, ReferenceKernel,
    StepBatch,
};
use crate::Result;

/// Time-stepping kernel with compile-time dispatch.
pub enum Kernel {
    /// Single-threaded nested-loop implementation
    Reference(ReferenceKernel),
    /// Flat-buffer, Rayon-parallel implementation
    Optimized(OptimizedKernel),
}

/// Dispatch a method call to the active kernel variant.
macro_rules! dispatch_kernel {
    ($self:expr, $method:ident($($args:expr),*)) => {
        match $self {
            Kernel::Reference(k) => k.$method($($args),*),
            Kernel::Optimized(k) => k.$method($($args),*),
        }
    };
}

impl Kernel {
    /// Create a kernel for a discretized fiber.
    ///
    /// # Arguments
    /// * `model` - Discretized fiber with all coefficients
    /// * `backend` - Which implementation to use
    pub fn new(model: &DiscretizedFiber, backend: Backend) -> Result<Self> {
        Ok(match backend {
            Backend::Reference => Kernel::Reference(ReferenceKernel::new(model)?),
            Backend::Optimized => Kernel::Optimized(OptimizedKernel::new(model)?),
        })
    }

    /// Execute a batch of time steps.
    pub fn run_batch(&mut self, batch: StepBatch) -> Result<BatchResult> {
        dispatch_kernel!(self, run_batch(batch))
    }

    #[inline]
    pub fn current_step(&self) -> u64 {
        dispatch_kernel!(self, current_step())
    }

    /// Read access to (powers, populations).
    #[inline]
    pub fn read_state(&self) -> (&NodeField, &NodeField) {
        dispatch_kernel!(self, read_state())
    }

    /// Write access to (powers, populations).
    #[inline]
    pub fn write_state(&mut self) -> (&mut NodeField, &mut NodeField) {
        dispatch_kernel!(self, write_state())
    }

    /// Reset to the dark initial state.
    #[inline]
    pub fn reset(&mut self) {
        dispatch_kernel!(self, reset())
    }

    pub fn backend(&self) -> Backend {
        match self {
            Kernel::Reference(_) => Backend::Reference,
            Kernel::Optimized(_) => Backend::Optimized,
        }
    }
}
