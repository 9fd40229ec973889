//! Simulation results.

use crate::arrays::NodeField;
use crate::dynamic::batch::OutputSample;
use crate::dynamic::simulation::SimulationState;
use instant::Duration;
use serde::{Deserialize, Serialize};

/// Final state and history of a dynamic simulation run.
///
/// All per-channel data is in canonical channel order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResult {
    pub(crate) z: Vec<f64>,
    pub(crate) channel_labels: Vec<String>,
    pub(crate) wavelengths: Vec<f64>,
    /// Channels × nodes (W)
    pub(crate) powers: NodeField,
    /// Rings × nodes (excited fraction)
    pub(crate) populations: NodeField,
    pub(crate) output_powers: Vec<f64>,
    pub(crate) output_samples: Vec<OutputSample>,
    pub(crate) status: SimulationState,
    pub(crate) steps_executed: u64,
    pub(crate) dt: f64,
    /// Wall clock time of the run
    pub elapsed: Duration,
}

impl SimulationResult {
    /// Output-end power of every channel: z = L for forward channels, z = 0
    /// for backward channels.
    pub fn powers_at_fiber_end(&self) -> &[f64] {
        &self.output_powers
    }

    /// Output-end power of a channel by label.
    pub fn output_power(&self, label: &str) -> Option<f64> {
        self.index_of(label).map(|i| self.output_powers[i])
    }

    /// Power of a channel at every node (W).
    pub fn power_profile(&self, label: &str) -> Option<&[f64]> {
        self.index_of(label).map(|i| self.powers.row(i))
    }

    /// Excited-ion fraction of a doping ring at every node.
    pub fn population_profile(&self, ring: usize) -> Option<&[f64]> {
        (ring < self.num_rings()).then(|| self.populations.row(ring))
    }

    /// Node positions (m).
    pub fn z(&self) -> &[f64] {
        &self.z
    }

    pub fn channel_labels(&self) -> &[String] {
        &self.channel_labels
    }

    /// Channel wavelengths (m).
    pub fn wavelengths(&self) -> &[f64] {
        &self.wavelengths
    }

    /// Full power field (channels × nodes).
    pub fn powers(&self) -> &NodeField {
        &self.powers
    }

    /// Full population field (rings × nodes).
    pub fn populations(&self) -> &NodeField {
        &self.populations
    }

    pub fn num_rings(&self) -> usize {
        self.populations.dimensions().rows
    }

    /// Output powers recorded during the run.
    pub fn output_samples(&self) -> &[OutputSample] {
        &self.output_samples
    }

    /// (time, output power) pairs of one channel.
    pub fn output_power_series(&self, label: &str) -> Option<Vec<(f64, f64)>> {
        let i = self.index_of(label)?;
        Some(
            self.output_samples
                .iter()
                .map(|s| (s.time, s.output_powers[i]))
                .collect(),
        )
    }

    pub fn status(&self) -> SimulationState {
        self.status
    }

    /// True if the run stopped because the power profile became stationary.
    pub fn converged(&self) -> bool {
        self.status == SimulationState::Converged
    }

    pub fn steps_executed(&self) -> u64 {
        self.steps_executed
    }

    /// Time step (s).
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Simulated time covered by the run (s).
    pub fn simulated_time(&self) -> f64 {
        self.steps_executed as f64 * self.dt
    }

    /// Wall clock time of the run.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    fn index_of(&self, label: &str) -> Option<usize> {
        self.channel_labels.iter().position(|l| l == label)
    }
}
