//! Batching support for the stepping kernels.
//!
//! The controller hands kernels a fixed number of steps at a time together
//! with pre-sampled input powers, the steady-state criterion and the output
//! sampling settings. Batching keeps progress reporting and logging out of
//! the inner loop.

use crate::arrays::NodeField;
use crate::channels::InputPower;
use instant::Duration;
use serde::{Deserialize, Serialize};

/// Configuration for a batch of time steps.
#[derive(Debug, Clone)]
pub struct StepBatch {
    /// Number of steps to execute
    pub num_steps: u64,

    /// Launch power of every channel, in canonical order
    pub inputs: Vec<ScheduledInput>,

    /// Early termination conditions
    pub termination: TerminationConfig,

    /// Output power sampling settings
    pub monitoring: MonitorConfig,
}

/// Result from executing a batch.
#[derive(Debug, Clone)]
pub struct BatchResult {
    /// Number of steps actually executed
    pub steps_executed: u64,

    /// Reason for termination
    pub termination_reason: TerminationReason,

    /// Output powers collected during execution
    pub output_samples: Vec<OutputSample>,

    /// Wall clock time elapsed
    pub elapsed_time: Duration,
}

/// Reason why a batch terminated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TerminationReason {
    /// Completed requested number of steps
    StepsCompleted,

    /// Power profile stopped changing
    SteadyState {
        /// Step at which convergence was detected
        step: u64,
        /// Largest |ΔP| / (atol + rtol·max|P|) over the last window
        max_normalized_change: f64,
    },
}

/// Launch power of one channel over a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum ScheduledInput {
    /// Same value for every step
    Constant(f64),

    /// One value per step of the batch
    Sampled(Vec<f64>),
}

impl ScheduledInput {
    /// Pre-sample an input schedule for steps `start_step..start_step + num_steps`.
    pub fn from_input(input: &InputPower, start_step: u64, num_steps: u64) -> Self {
        match input {
            InputPower::Constant(p) => ScheduledInput::Constant(*p),
            InputPower::Sampled(_) => ScheduledInput::Sampled(
                (start_step..start_step + num_steps)
                    .map(|step| input.at_step(step))
                    .collect(),
            ),
        }
    }

    /// Value for the `offset`-th step of the batch.
    #[inline]
    pub fn at(&self, offset: usize) -> f64 {
        match self {
            ScheduledInput::Constant(p) => *p,
            ScheduledInput::Sampled(samples) => samples
                .get(offset)
                .or_else(|| samples.last())
                .copied()
                .unwrap_or(0.0),
        }
    }
}

/// Tolerances for detecting steady state.
///
/// The power profile is compared every `window` steps with the profile of the
/// previous comparison. The run has converged when every value satisfies
/// `|P - P_prev| <= atol + rtol * max(|P|, |P_prev|)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SteadyStateCriterion {
    /// Steps between comparisons
    pub window: u64,
    /// Relative tolerance
    pub rtol: f64,
    /// Absolute tolerance (W)
    pub atol: f64,
}

impl Default for SteadyStateCriterion {
    fn default() -> Self {
        Self {
            window: 100,
            rtol: 1e-7,
            atol: 1e-15,
        }
    }
}

/// Configuration for batch termination conditions.
#[derive(Debug, Clone, Default)]
pub struct TerminationConfig {
    /// Stop once the power profile is stationary (None = run every step)
    pub steady_state: Option<SteadyStateCriterion>,
}

/// Configuration for output power sampling.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Record output powers every N steps (0 = disabled)
    pub sample_interval: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self { sample_interval: 1 }
    }
}

/// Output powers at a specific step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSample {
    /// Step after which the sample was taken
    pub step: u64,

    /// Simulated time (s)
    pub time: f64,

    /// Output-end power of every channel in canonical order (W)
    pub output_powers: Vec<f64>,
}

/// Tracks the power profile between steady-state comparisons.
///
/// Kernels own one tracker; it persists across batches so a window may span
/// a batch boundary.
#[derive(Debug, Clone, Default)]
pub struct SteadyStateTracker {
    snapshot: Option<NodeField>,
}

impl SteadyStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the reference snapshot if none exists yet.
    pub fn prime(&mut self, powers: &NodeField) {
        if self.snapshot.is_none() {
            self.snapshot = Some(powers.clone());
        }
    }

    /// Compare `powers` with the snapshot.
    ///
    /// Returns the largest normalized change if it is within tolerance,
    /// otherwise replaces the snapshot and returns `None`.
    pub fn observe(&mut self, powers: &NodeField, criterion: &SteadyStateCriterion) -> Option<f64> {
        let Some(snapshot) = self.snapshot.as_mut() else {
            self.snapshot = Some(powers.clone());
            return None;
        };

        let mut converged = true;
        let mut max_change = 0.0f64;
        for (&p, &prev) in powers.as_slice().iter().zip(snapshot.as_slice()) {
            let tolerance = criterion.atol + criterion.rtol * p.abs().max(prev.abs());
            let diff = (p - prev).abs();
            if diff > tolerance {
                converged = false;
            }
            if tolerance > 0.0 {
                max_change = max_change.max(diff / tolerance);
            } else if diff > 0.0 {
                max_change = f64::INFINITY;
            }
        }

        if converged {
            Some(max_change)
        } else {
            snapshot.as_mut_slice().copy_from_slice(powers.as_slice());
            None
        }
    }

    /// Replace the snapshot with `powers` without comparing.
    ///
    /// Used while channel inputs are still changing, so that the first
    /// comparison only spans steps with settled inputs.
    pub fn rebase(&mut self, powers: &NodeField) {
        match self.snapshot.as_mut() {
            Some(snapshot) => snapshot.as_mut_slice().copy_from_slice(powers.as_slice()),
            None => self.snapshot = Some(powers.clone()),
        }
    }

    /// Forget the snapshot.
    pub fn reset(&mut self) {
        self.snapshot = None;
    }
}
